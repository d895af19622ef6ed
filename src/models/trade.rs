use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side '{}'", other)),
        }
    }
}

/// Outcome of a trade attempt as stored in the trade log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// Quoted only, nothing was broadcast
    DryRun,
    Confirmed,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::DryRun => "dry_run",
            TradeStatus::Confirmed => "confirmed",
            TradeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry_run" => Ok(TradeStatus::DryRun),
            "confirmed" => Ok(TradeStatus::Confirmed),
            "failed" => Ok(TradeStatus::Failed),
            other => Err(format!("unknown trade status '{}'", other)),
        }
    }
}

/// One row of the append-only trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Assigned by the database
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub wallet: String,
    pub mint: String,
    pub side: TradeSide,
    /// SOL spent (buy) or received (sell)
    pub sol_lamports: i64,
    /// Token raw units received (buy) or spent (sell)
    pub token_units: i64,
    pub signature: Option<String>,
    pub status: TradeStatus,
    /// Strategy name, or "manual"
    pub source: String,
    pub realized_pnl_lamports: Option<i64>,
    pub error: Option<String>,
}

impl TradeRecord {
    pub fn new(wallet: &str, mint: &str, side: TradeSide, source: &str) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            wallet: wallet.to_string(),
            mint: mint.to_string(),
            side,
            sol_lamports: 0,
            token_units: 0,
            signature: None,
            status: TradeStatus::Failed,
            source: source.to_string(),
            realized_pnl_lamports: None,
            error: None,
        }
    }
}
