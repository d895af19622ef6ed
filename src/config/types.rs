use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

use crate::error::ConfigError;

const REDACTED: &str = "[REDACTED]";

/// Configuration for the swap bot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    /// Wallet name -> secret key (hex, base58 or JSON byte array)
    pub wallets: BTreeMap<String, String>,
    pub rpc: RpcConfig,
    pub jupiter: JupiterConfig,
    pub trading: TradingConfig,
    pub strategies: StrategiesConfig,
    pub health: HealthConfig,
    pub storage: StorageConfig,
}

/// Telegram bot credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Only this chat may issue commands and receives notifications
    pub chat_id: Option<i64>,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }
}

/// Solana RPC endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub fallback_urls: Vec<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            fallback_urls: Vec::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
            health_check_interval_secs: 60,
        }
    }
}

/// Jupiter aggregator API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JupiterConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Fixed priority fee, `None` lets Jupiter pick ("auto")
    pub priority_fee_lamports: Option<u64>,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://quote-api.jup.ag/v6".to_string(),
            api_key: None,
            timeout_secs: 15,
            max_retries: 4,
            priority_fee_lamports: None,
        }
    }
}

/// Trade limits shared by every strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Broadcast transactions. When false every swap is quoted but not sent.
    pub live_mode: bool,
    pub slippage_bps: u16,
    pub max_price_impact_pct: f64,
    pub trade_amount_sol: f64,
    pub trade_cooldown_secs: u64,
    pub max_session_budget_sol: f64,
    pub profit_target_pct: f64,
    pub stop_loss_pct: f64,
    /// Empty means every token is allowed
    pub allowed_tokens: Vec<String>,
    pub blocked_tokens: Vec<String>,
    pub max_swap_attempts: u32,
    pub confirm_poll_ms: u64,
    pub confirm_timeout_secs: u64,
    /// Wallet used when a strategy does not name one
    pub default_wallet: Option<String>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            live_mode: false,
            slippage_bps: 100,
            max_price_impact_pct: 5.0,
            trade_amount_sol: 0.01,
            trade_cooldown_secs: 30,
            max_session_budget_sol: 1.0,
            profit_target_pct: 10.0,
            stop_loss_pct: -5.0,
            allowed_tokens: Vec::new(),
            blocked_tokens: Vec::new(),
            max_swap_attempts: 3,
            confirm_poll_ms: 2_000,
            confirm_timeout_secs: 90,
            default_wallet: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub dca: DcaConfig,
    pub sniper: SniperConfig,
    pub exits: ExitsConfig,
}

/// Periodic fixed-amount buys of a single mint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DcaConfig {
    pub enabled: bool,
    pub mint: String,
    pub amount_sol: f64,
    pub interval_secs: u64,
    pub wallet: Option<String>,
}

impl Default for DcaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mint: String::new(),
            amount_sol: 0.01,
            interval_secs: 3_600,
            wallet: None,
        }
    }
}

/// Buys newly listed pools from an HTTP pool feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SniperConfig {
    pub enabled: bool,
    pub feed_url: String,
    pub dex: String,
    pub min_liquidity: f64,
    pub amount_sol: Option<f64>,
    pub poll_interval_secs: u64,
    pub max_buys_per_poll: usize,
    pub wallet: Option<String>,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            feed_url: "https://api.raydium.io/v2/sdk/liquidity/mainnet.json".to_string(),
            dex: "raydium".to_string(),
            min_liquidity: 10_000.0,
            amount_sol: None,
            poll_interval_secs: 10,
            max_buys_per_poll: 1,
            wallet: None,
        }
    }
}

/// Take-profit / stop-loss monitor over open positions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitsConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
}

impl Default for ExitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 30,
        }
    }
}

/// Supervisor thresholds and runtime files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
    pub memory_limit_mb: u64,
    pub stale_after_secs: u64,
    pub status_file: String,
    pub heartbeat_file: String,
    pub pid_file: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            memory_limit_mb: 500,
            stale_after_secs: 1_800,
            status_file: "bot_status.json".to_string(),
            heartbeat_file: "bot_heartbeat.json".to_string(),
            pid_file: "swap-bot.pid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://swap-bot.db".to_string(),
        }
    }
}

impl Config {
    /// Check value ranges before anything touches the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trading = &self.trading;
        if trading.slippage_bps == 0 || trading.slippage_bps > 5_000 {
            return Err(ConfigError::Invalid(format!(
                "slippage_bps must be within 1..=5000, got {}",
                trading.slippage_bps
            )));
        }
        if !(trading.trade_amount_sol > 0.0) {
            return Err(ConfigError::Invalid("trade_amount_sol must be positive".into()));
        }
        if !(trading.profit_target_pct > 0.0) {
            return Err(ConfigError::Invalid("profit_target_pct must be positive".into()));
        }
        if !(trading.stop_loss_pct < 0.0) {
            return Err(ConfigError::Invalid("stop_loss_pct must be negative".into()));
        }
        if trading.max_swap_attempts == 0 {
            return Err(ConfigError::Invalid("max_swap_attempts must be at least 1".into()));
        }
        if let Some(name) = &trading.default_wallet {
            if !self.wallets.contains_key(name) {
                return Err(ConfigError::Invalid(format!("default_wallet '{}' is not defined", name)));
            }
        }
        for (strategy, wallet) in [
            ("dca", &self.strategies.dca.wallet),
            ("sniper", &self.strategies.sniper.wallet),
        ] {
            if let Some(name) = wallet {
                if !self.wallets.contains_key(name) {
                    return Err(ConfigError::Invalid(format!(
                        "{} strategy references unknown wallet '{}'",
                        strategy, name
                    )));
                }
            }
        }
        if self.strategies.dca.enabled && self.strategies.dca.mint.trim().is_empty() {
            return Err(ConfigError::Invalid("dca strategy is enabled without a mint".into()));
        }
        Ok(())
    }

    /// Name of the wallet used when none is specified
    pub fn default_wallet_name(&self) -> Option<String> {
        self.trading
            .default_wallet
            .clone()
            .or_else(|| self.wallets.keys().next().cloned())
    }

    /// Copy of the config that is safe to log or show
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        if !copy.telegram.bot_token.is_empty() {
            copy.telegram.bot_token = REDACTED.to_string();
        }
        for secret in copy.wallets.values_mut() {
            *secret = REDACTED.to_string();
        }
        if copy.jupiter.api_key.is_some() {
            copy.jupiter.api_key = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Overlay environment variables on top of the file configuration
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(rpc_url) = env::var("RPC_URL") {
        config.rpc.url = rpc_url;
    }

    if let Ok(jupiter_url) = env::var("JUPITER_URL") {
        config.jupiter.base_url = jupiter_url;
    }

    if let Ok(database_url) = env::var("DATABASE_URL") {
        config.storage.database_url = database_url;
    }

    if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
        config.telegram.bot_token = token;
    }

    if let Ok(chat_id) = env::var("TELEGRAM_CHAT_ID") {
        if let Ok(value) = chat_id.trim().parse::<i64>() {
            config.telegram.chat_id = Some(value);
        }
    }

    if let Ok(slippage) = env::var("SLIPPAGE_BPS") {
        if let Ok(value) = slippage.parse::<u16>() {
            config.trading.slippage_bps = value;
        }
    }

    if let Ok(amount) = env::var("TRADE_AMOUNT_SOL") {
        if let Ok(value) = amount.parse::<f64>() {
            config.trading.trade_amount_sol = value;
        }
    }
}
