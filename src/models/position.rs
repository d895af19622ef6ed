use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens of one mint held by one wallet.
///
/// `quantity` is in the token's raw units and `cost_lamports` is the total
/// SOL paid for them, so the average entry price is `cost / quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub wallet: String,
    pub mint: String,
    pub quantity: i64,
    pub cost_lamports: i64,
    pub source: String,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Average entry price in lamports per raw unit
    pub fn avg_price(&self) -> f64 {
        if self.quantity <= 0 {
            return 0.0;
        }
        self.cost_lamports as f64 / self.quantity as f64
    }

    /// Unrealised PnL in percent if the whole position is worth `value_lamports`
    pub fn pnl_pct(&self, value_lamports: u64) -> f64 {
        if self.cost_lamports <= 0 {
            return 0.0;
        }
        (value_lamports as f64 - self.cost_lamports as f64) / self.cost_lamports as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(quantity: i64, cost: i64) -> Position {
        Position {
            wallet: "main".into(),
            mint: "mint".into(),
            quantity,
            cost_lamports: cost,
            source: "test".into(),
            opened_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pnl_is_relative_to_cost() {
        let p = position(1_000, 100_000_000);
        assert_eq!(p.avg_price(), 100_000.0);
        assert!((p.pnl_pct(110_000_000) - 10.0).abs() < 1e-9);
        assert!((p.pnl_pct(95_000_000) + 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_positions_do_not_divide_by_zero() {
        let p = position(0, 0);
        assert_eq!(p.avg_price(), 0.0);
        assert_eq!(p.pnl_pct(1), 0.0);
    }
}
