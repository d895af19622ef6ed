use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::execution::SOL_MINT;
use crate::models::Pool;
use crate::solana::parse_pubkey;

/// Source of newly listed pools
#[async_trait]
pub trait PoolMonitor: Send + Sync {
    fn name(&self) -> &str;

    /// Current pool listing, highest liquidity first
    async fn fetch_pools(&self) -> Result<Vec<Pool>>;
}

/// Polls a DEX HTTP listing endpoint
pub struct PoolFeed {
    dex: String,
    url: String,
    http: Client,
}

impl PoolFeed {
    pub fn new(dex: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            dex: dex.into(),
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl PoolMonitor for PoolFeed {
    fn name(&self) -> &str {
        &self.dex
    }

    async fn fetch_pools(&self) -> Result<Vec<Pool>> {
        let document: Value = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} pools", self.dex))?
            .error_for_status()
            .with_context(|| format!("{} pool listing returned an error", self.dex))?
            .json()
            .await
            .with_context(|| format!("{} pool listing is not JSON", self.dex))?;

        let pools = parse_pools(&self.dex, &document);
        debug!("{} listing returned {} pools", self.dex, pools.len());
        Ok(pools)
    }
}

/// Extract pools from the listing shapes DEX APIs commonly return: a bare
/// array, or an object whose array members (`official`, `data`, ...) hold pools.
pub fn parse_pools(dex: &str, document: &Value) -> Vec<Pool> {
    let entries: Vec<&Value> = match document {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map
            .values()
            .filter_map(Value::as_array)
            .flat_map(|items| items.iter())
            .collect(),
        _ => Vec::new(),
    };

    let mut pools: Vec<Pool> = entries
        .into_iter()
        .filter_map(|entry| parse_pool(dex, entry))
        .collect();

    pools.sort_by(|a, b| b.liquidity.total_cmp(&a.liquidity));
    pools
}

fn parse_pool(dex: &str, entry: &Value) -> Option<Pool> {
    let mint = token_mint(entry)?;
    let liquidity = number(entry.get("liquidity")?)?;

    let address = ["id", "address", "ammId"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    Some(Pool {
        dex: dex.to_string(),
        address,
        mint,
        symbol: entry.get("symbol").and_then(Value::as_str).map(str::to_string),
        liquidity,
        discovered_at: Utc::now(),
    })
}

/// The traded token, skipping the SOL side of a pair and malformed mints
fn token_mint(entry: &Value) -> Option<String> {
    let candidates = [
        entry.get("baseMint"),
        entry.get("mint"),
        entry.pointer("/tokenA/mint"),
        entry.get("inputMint"),
        entry.get("quoteMint"),
        entry.pointer("/tokenB/mint"),
        entry.get("outputMint"),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|mint| *mint != SOL_MINT && parse_pubkey(mint).is_ok())
        .map(str::to_string)
}

/// Liquidity may be a number, a numeric string, or `{ "usd": n }`
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(map) => map.get("usd").and_then(number),
        _ => None,
    }
}
