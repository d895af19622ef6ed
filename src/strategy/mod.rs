pub mod dca;
pub mod engine;
pub mod exits;
pub mod sniper;

pub use dca::DcaStrategy;
pub use engine::{StrategyEngine, TradeGuards};
pub use exits::ExitStrategy;
pub use sniper::{PoolCriteria, SniperStrategy};

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::execution::{SwapExecutor, SwapOrder};
use crate::monitoring::PoolFeed;
use crate::solana::WalletManager;

/// A trade a strategy wants to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeIntent {
    pub strategy: String,
    pub wallet: String,
    pub order: SwapOrder,
    /// Human readable, used in notifications
    pub reason: String,
}

/// What strategies get to look at when they run
#[derive(Clone)]
pub struct StrategyContext {
    pub db: Database,
    pub wallets: Arc<WalletManager>,
    pub executor: Arc<SwapExecutor>,
}

/// A periodic source of trade intents
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// How often the engine calls [`Strategy::evaluate`]
    fn interval(&self) -> Duration;

    async fn evaluate(&self, ctx: &StrategyContext) -> Result<Vec<TradeIntent>>;
}

/// Build every strategy the config can support, paired with its configured
/// enabled flag. Disabled ones are still built so they can be toggled at runtime.
pub fn build_strategies(config: &Config) -> Result<Vec<(Arc<dyn Strategy>, bool)>> {
    let mut strategies: Vec<(Arc<dyn Strategy>, bool)> = Vec::new();
    let trading = &config.trading;
    let configured = &config.strategies;

    let dca_wallet = configured.dca.wallet.clone().or_else(|| config.default_wallet_name());
    match dca_wallet {
        Some(wallet) if !configured.dca.mint.trim().is_empty() => {
            let dca = DcaStrategy::new(&configured.dca, wallet, trading.slippage_bps);
            strategies.push((Arc::new(dca), configured.dca.enabled));
        }
        _ if configured.dca.enabled => warn!("DCA is enabled but has no mint or wallet, skipping"),
        _ => {}
    }

    match configured.sniper.wallet.clone().or_else(|| config.default_wallet_name()) {
        Some(wallet) => {
            let feed = PoolFeed::new(
                configured.sniper.dex.clone(),
                configured.sniper.feed_url.clone(),
                Duration::from_secs(config.jupiter.timeout_secs.max(1)),
            )?;
            let sniper = SniperStrategy::new(&configured.sniper, trading, wallet, Arc::new(feed));
            strategies.push((Arc::new(sniper), configured.sniper.enabled));
        }
        None if configured.sniper.enabled => warn!("Sniper is enabled but no wallet is configured, skipping"),
        None => {}
    }

    let exits = ExitStrategy::new(&configured.exits, trading);
    strategies.push((Arc::new(exits), configured.exits.enabled));

    Ok(strategies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(built: &[(Arc<dyn Strategy>, bool)]) -> Vec<(String, bool)> {
        built.iter().map(|(s, on)| (s.name().to_string(), *on)).collect()
    }

    #[test]
    fn builds_what_the_config_supports() {
        let mut config = Config::default();
        let built = build_strategies(&config).unwrap();
        assert_eq!(names(&built), vec![("exits".to_string(), true)]);

        config.wallets.insert("main".into(), "secret".into());
        config.strategies.dca.mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into();
        config.strategies.dca.enabled = true;
        let built = build_strategies(&config).unwrap();
        assert_eq!(
            names(&built),
            vec![
                ("dca".to_string(), true),
                ("sniper".to_string(), false),
                ("exits".to_string(), true)
            ]
        );
    }
}
