//! Jupiter v6 request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SwapError;

/// Query parameters for `GET /quote`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Amount of input token in its smallest unit
    pub amount: u64,
    /// Slippage tolerance in basis points (100 = 1%)
    pub slippage_bps: u16,
}

impl QuoteRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("inputMint", self.input_mint.clone()),
            ("outputMint", self.output_mint.clone()),
            ("amount", self.amount.to_string()),
            ("slippageBps", self.slippage_bps.to_string()),
        ]
    }
}

/// A quote from `/quote`.
///
/// The raw document is kept because `/swap` expects it back verbatim.
#[derive(Debug, Clone)]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub other_amount_threshold: u64,
    /// Price impact in percent (Jupiter reports a fraction, 0.01 = 1%)
    pub price_impact_pct: f64,
    /// DEX labels of each route hop
    pub route_labels: Vec<String>,
    pub raw: Value,
}

impl QuoteResponse {
    pub fn from_value(raw: Value) -> Result<Self, SwapError> {
        if let Some(error) = raw.get("error").and_then(Value::as_str) {
            return Err(SwapError::Quote(error.to_string()));
        }

        let text = |field: &str| -> Result<String, SwapError> {
            raw.get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SwapError::Quote(format!("quote is missing {}", field)))
        };
        let amount = |field: &str| -> Result<u64, SwapError> {
            match raw.get(field) {
                Some(Value::String(s)) => s
                    .parse()
                    .map_err(|_| SwapError::Quote(format!("quote {} is not an integer: {}", field, s))),
                Some(Value::Number(n)) => n
                    .as_u64()
                    .ok_or_else(|| SwapError::Quote(format!("quote {} is not an integer", field))),
                _ => Err(SwapError::Quote(format!("quote is missing {}", field))),
            }
        };

        let price_impact_fraction = match raw.get("priceImpactPct") {
            Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        };

        let route_labels = raw
            .get("routePlan")
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|step| step.pointer("/swapInfo/label").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let out_amount = amount("outAmount")?;
        Ok(Self {
            input_mint: text("inputMint")?,
            output_mint: text("outputMint")?,
            in_amount: amount("inAmount")?,
            out_amount,
            other_amount_threshold: amount("otherAmountThreshold").unwrap_or(out_amount),
            price_impact_pct: price_impact_fraction * 100.0,
            route_labels,
            raw,
        })
    }
}

/// Priority fee passed to `/swap`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrioritizationFee {
    Lamports(u64),
    /// Always the string "auto"
    Auto(String),
}

impl PrioritizationFee {
    pub fn from_config(lamports: Option<u64>) -> Self {
        match lamports {
            Some(lamports) => PrioritizationFee::Lamports(lamports),
            None => PrioritizationFee::Auto("auto".to_string()),
        }
    }
}

/// Body of `POST /swap`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub user_public_key: String,
    pub quote_response: Value,
    pub wrap_and_unwrap_sol: bool,
    pub dynamic_compute_unit_limit: bool,
    pub prioritization_fee_lamports: PrioritizationFee,
}

/// Response of `POST /swap`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 unsigned versioned transaction
    pub swap_transaction: String,
    pub last_valid_block_height: u64,
    #[serde(default)]
    pub prioritization_fee_lamports: Option<u64>,
}
