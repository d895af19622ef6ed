use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::DcaConfig;
use crate::execution::SwapOrder;
use crate::strategy::{Strategy, StrategyContext, TradeIntent};
use crate::utils::{format_sol, lamports_to_sol, short_address, sol_to_lamports};

/// Dollar-cost averaging: buy a fixed SOL amount of one token on every tick
pub struct DcaStrategy {
    wallet: String,
    mint: String,
    lamports: u64,
    slippage_bps: u16,
    interval: Duration,
}

impl DcaStrategy {
    pub fn new(config: &DcaConfig, wallet: String, slippage_bps: u16) -> Self {
        Self {
            wallet,
            mint: config.mint.trim().to_string(),
            lamports: sol_to_lamports(config.amount_sol),
            slippage_bps,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }
}

#[async_trait]
impl Strategy for DcaStrategy {
    fn name(&self) -> &str {
        "dca"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn evaluate(&self, _ctx: &StrategyContext) -> Result<Vec<TradeIntent>> {
        if self.lamports == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![TradeIntent {
            strategy: self.name().to_string(),
            wallet: self.wallet.clone(),
            order: SwapOrder::buy(self.mint.clone(), self.lamports, self.slippage_bps),
            reason: format!(
                "DCA buy of {} into {}",
                format_sol(lamports_to_sol(self.lamports)),
                short_address(&self.mint)
            ),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeSide;
    use crate::strategy::engine::testing::context;

    #[tokio::test]
    async fn emits_one_fixed_buy_per_tick() {
        let config = DcaConfig {
            enabled: true,
            mint: " EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v ".into(),
            amount_sol: 0.05,
            interval_secs: 600,
            wallet: None,
        };
        let strategy = DcaStrategy::new(&config, "main".into(), 75);
        let (ctx, _) = context().await;

        assert_eq!(strategy.interval(), Duration::from_secs(600));
        let intents = strategy.evaluate(&ctx).await.unwrap();
        assert_eq!(intents.len(), 1);

        let order = &intents[0].order;
        assert_eq!(order.side, TradeSide::Buy);
        assert_eq!(order.mint, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert_eq!(order.amount, 50_000_000);
        assert_eq!(order.slippage_bps, 75);
        assert_eq!(intents[0].wallet, "main");
    }
}
