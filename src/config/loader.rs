use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::crypto::{self, Envelope, KeySource};
use crate::config::types::{apply_env_overrides, Config};

/// Candidate config files, in lookup order
pub const DEFAULT_CONFIG_FILES: [&str; 3] = ["config.enc", "config.json.encrypted", "config.json"];

pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const CONFIRM_LIVE_ENV: &str = "CONFIRM_LIVE";

/// Pick the config file: explicit path, then `CONFIG_PATH`, then the defaults
pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    DEFAULT_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// Load configuration from disk (decrypting when needed), then apply
/// environment overrides and validate.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match resolve_path(explicit) {
        Some(path) => {
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = parse_config_bytes(&bytes)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Configuration loaded from {}", path.display());
            config
        }
        None => {
            warn!("No configuration file found, using defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

/// Parse either an encrypted envelope or a plaintext config document
pub fn parse_config_bytes(bytes: &[u8]) -> Result<Config> {
    if let Some(envelope) = as_envelope(bytes) {
        let source = KeySource::from_env_for(&envelope)?;
        return decrypt_config(&envelope, &source);
    }

    serde_json::from_slice(bytes).context("Config is neither an encrypted envelope nor valid JSON")
}

/// Decrypt an envelope into a config
pub fn decrypt_config(envelope: &Envelope, source: &KeySource) -> Result<Config> {
    let plaintext = crypto::decrypt(envelope, source)?;
    serde_json::from_slice(&plaintext).context("Decrypted config is not valid JSON")
}

/// Try to read the bytes as an encrypted envelope
pub fn as_envelope(bytes: &[u8]) -> Option<Envelope> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    if value.get("ciphertext").is_none() || value.get("nonce").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Refuse to start in live mode unless the operator explicitly confirmed it
pub fn confirm_live_mode(config: &Config) -> Result<()> {
    if !config.trading.live_mode {
        return Ok(());
    }

    match env::var(CONFIRM_LIVE_ENV) {
        Ok(value) if value == "YES" => {
            warn!("LIVE trading enabled, transactions will be broadcast");
            Ok(())
        }
        _ => Err(anyhow!(
            "live_mode is enabled but {}=YES is not set, refusing to start",
            CONFIRM_LIVE_ENV
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::crypto::encrypt;

    const HEX_KEY: &str = "1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100";

    #[test]
    fn plaintext_config_parses() {
        let config = parse_config_bytes(br#"{"trading": {"trade_amount_sol": 0.5}}"#).unwrap();
        assert_eq!(config.trading.trade_amount_sol, 0.5);
    }

    #[test]
    fn envelope_detection() {
        assert!(as_envelope(br#"{"telegram": {}}"#).is_none());
        assert!(as_envelope(b"not json").is_none());

        let envelope = encrypt(b"{}", &KeySource::HexKey(HEX_KEY.into())).unwrap();
        let bytes = serde_json::to_vec(&envelope).unwrap();
        assert!(as_envelope(&bytes).is_some());
    }

    #[test]
    fn encrypted_config_roundtrip() {
        let mut original = Config::default();
        original.wallets.insert("main".into(), "abcdef".into());
        original.telegram.chat_id = Some(42);

        let plain = serde_json::to_vec(&original).unwrap();
        let source = KeySource::HexKey(HEX_KEY.into());
        let envelope = encrypt(&plain, &source).unwrap();

        let decrypted = decrypt_config(&envelope, &source).unwrap();
        assert_eq!(decrypted.wallets["main"], "abcdef");
        assert_eq!(decrypted.telegram.chat_id, Some(42));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{"rpc": {"url": "http://localhost:8899"}}"#).unwrap();

        assert_eq!(resolve_path(Some(&path)), Some(path.clone()));
        let config: Config = parse_config_bytes(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(config.rpc.url, "http://localhost:8899");
    }

    #[test]
    fn live_mode_without_confirmation_is_refused() {
        let mut config = Config::default();
        assert!(confirm_live_mode(&config).is_ok());

        config.trading.live_mode = true;
        if env::var(CONFIRM_LIVE_ENV).map(|v| v != "YES").unwrap_or(true) {
            assert!(confirm_live_mode(&config).is_err());
        }
    }
}
