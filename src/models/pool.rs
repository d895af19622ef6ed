use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A liquidity pool announced by a DEX listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub dex: String,
    /// Pool account, when the feed reports one
    pub address: Option<String>,
    /// Mint of the non-SOL token traded in the pool
    pub mint: String,
    pub symbol: Option<String>,
    /// Liquidity as reported by the feed (usually USD)
    pub liquidity: f64,
    pub discovered_at: DateTime<Utc>,
}
