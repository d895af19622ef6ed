use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

use crate::config::{ExitsConfig, TradingConfig};
use crate::execution::SwapOrder;
use crate::strategy::{Strategy, StrategyContext, TradeIntent};
use crate::utils::short_address;

/// Sells whole positions once they hit the profit target or the stop loss
pub struct ExitStrategy {
    profit_target_pct: f64,
    stop_loss_pct: f64,
    slippage_bps: u16,
    interval: Duration,
}

impl ExitStrategy {
    pub fn new(config: &ExitsConfig, trading: &TradingConfig) -> Self {
        Self {
            profit_target_pct: trading.profit_target_pct,
            stop_loss_pct: trading.stop_loss_pct,
            slippage_bps: trading.slippage_bps,
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        }
    }
}

#[async_trait]
impl Strategy for ExitStrategy {
    fn name(&self) -> &str {
        "exits"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn evaluate(&self, ctx: &StrategyContext) -> Result<Vec<TradeIntent>> {
        let mut intents = Vec::new();

        for position in ctx.db.positions(None).await? {
            if position.quantity <= 0 || ctx.wallets.get(&position.wallet).is_none() {
                continue;
            }

            let order = SwapOrder::sell(position.mint.clone(), position.quantity as u64, self.slippage_bps);
            let quote = match ctx.executor.quote(&order).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!("Could not price {} for exit check: {}", position.mint, e);
                    continue;
                }
            };

            let pnl_pct = position.pnl_pct(quote.out_amount);
            debug!("{} / {}: PnL {:+.2}%", position.wallet, position.mint, pnl_pct);

            let reason = if pnl_pct >= self.profit_target_pct {
                format!("Take profit on {} at {:+.2}%", short_address(&position.mint), pnl_pct)
            } else if pnl_pct <= self.stop_loss_pct {
                format!("Stop loss on {} at {:+.2}%", short_address(&position.mint), pnl_pct)
            } else {
                continue;
            };

            intents.push(TradeIntent {
                strategy: self.name().to_string(),
                wallet: position.wallet.clone(),
                order,
                reason,
            });
        }

        Ok(intents)
    }
}
