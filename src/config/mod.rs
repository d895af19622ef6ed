pub mod crypto;
mod loader;
mod types;

pub use loader::{
    as_envelope, confirm_live_mode, decrypt_config, load_config, parse_config_bytes,
    resolve_path, CONFIG_PATH_ENV, CONFIRM_LIVE_ENV, DEFAULT_CONFIG_FILES,
};
pub use types::{
    apply_env_overrides, Config, DcaConfig, ExitsConfig, HealthConfig, JupiterConfig,
    RpcConfig, SniperConfig, StorageConfig, StrategiesConfig, TelegramConfig, TradingConfig,
};
