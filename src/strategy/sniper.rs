use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SniperConfig, TradingConfig};
use crate::execution::SwapOrder;
use crate::models::Pool;
use crate::monitoring::PoolMonitor;
use crate::solana::parse_pubkey;
use crate::strategy::{Strategy, StrategyContext, TradeIntent};
use crate::utils::{format_sol, lamports_to_sol, short_address, sol_to_lamports};

/// Criteria for pool selection
#[derive(Debug, Clone, Default)]
pub struct PoolCriteria {
    pub min_liquidity: f64,
    /// Empty means any token
    pub allowed_tokens: HashSet<String>,
    pub blocked_tokens: HashSet<String>,
}

impl PoolCriteria {
    pub fn from_config(sniper: &SniperConfig, trading: &TradingConfig) -> Self {
        Self {
            min_liquidity: sniper.min_liquidity,
            allowed_tokens: trading.allowed_tokens.iter().cloned().collect(),
            blocked_tokens: trading.blocked_tokens.iter().cloned().collect(),
        }
    }

    pub fn matches(&self, pool: &Pool) -> bool {
        if pool.liquidity < self.min_liquidity {
            return false;
        }
        if self.blocked_tokens.contains(&pool.mint) {
            return false;
        }
        self.allowed_tokens.is_empty() || self.allowed_tokens.contains(&pool.mint)
    }
}

/// Buys tokens of pools that appear in a DEX listing after startup
pub struct SniperStrategy {
    wallet: String,
    lamports: u64,
    slippage_bps: u16,
    interval: Duration,
    max_buys_per_poll: usize,
    criteria: PoolCriteria,
    monitor: Arc<dyn PoolMonitor>,
    seen: Mutex<HashSet<String>>,
    primed: AtomicBool,
}

impl SniperStrategy {
    pub fn new(
        config: &SniperConfig,
        trading: &TradingConfig,
        wallet: String,
        monitor: Arc<dyn PoolMonitor>,
    ) -> Self {
        let amount_sol = config.amount_sol.unwrap_or(trading.trade_amount_sol);
        Self {
            wallet,
            lamports: sol_to_lamports(amount_sol),
            slippage_bps: trading.slippage_bps,
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            max_buys_per_poll: config.max_buys_per_poll,
            criteria: PoolCriteria::from_config(config, trading),
            monitor,
            seen: Mutex::new(HashSet::new()),
            primed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Strategy for SniperStrategy {
    fn name(&self) -> &str {
        "sniper"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn evaluate(&self, ctx: &StrategyContext) -> Result<Vec<TradeIntent>> {
        let pools = self.monitor.fetch_pools().await?;

        // The first listing is the baseline, only pools that show up later are new
        if !self.primed.swap(true, Ordering::SeqCst) {
            self.seen.lock().extend(pools.iter().map(|pool| pool.mint.clone()));
            info!("Sniper baseline: {} pools already listed on {}", pools.len(), self.monitor.name());
            return Ok(Vec::new());
        }

        let mut intents = Vec::new();
        for pool in pools {
            if self.seen.lock().contains(&pool.mint) {
                continue;
            }
            // Pools past the cap stay unseen and are looked at next poll
            if intents.len() >= self.max_buys_per_poll {
                break;
            }

            let skip = if parse_pubkey(&pool.mint).is_err() {
                debug!("Ignoring {} pool with malformed mint {:?}", pool.dex, pool.mint);
                true
            } else if !self.criteria.matches(&pool) {
                debug!("Pool for {} does not match criteria (liquidity {})", pool.mint, pool.liquidity);
                true
            } else if ctx.db.get_position(&self.wallet, &pool.mint).await?.is_some() {
                debug!("Already holding {}", pool.mint);
                true
            } else {
                false
            };

            self.seen.lock().insert(pool.mint.clone());
            if skip {
                continue;
            }

            info!("New {} pool for {} with liquidity {:.0}", pool.dex, pool.mint, pool.liquidity);
            intents.push(TradeIntent {
                strategy: self.name().to_string(),
                wallet: self.wallet.clone(),
                order: SwapOrder::buy(pool.mint.clone(), self.lamports, self.slippage_bps),
                reason: format!(
                    "New {} pool {} (liquidity {:.0}), buying {}",
                    pool.dex,
                    short_address(&pool.mint),
                    pool.liquidity,
                    format_sol(lamports_to_sol(self.lamports))
                ),
            });
        }

        Ok(intents)
    }
}
