use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::JupiterConfig;
use crate::error::SwapError;
use crate::jupiter::types::{PrioritizationFee, QuoteRequest, QuoteResponse, SwapRequest, SwapResponse};
use crate::jupiter::SwapRouter;

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_MAX_MS: u64 = 16_000;
const BACKOFF_JITTER_MS: u64 = 200;

#[derive(Clone, Copy)]
enum Endpoint {
    Quote,
    Swap,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Quote => "quote",
            Endpoint::Swap => "swap",
        }
    }

    fn error(self, message: String) -> SwapError {
        match self {
            Endpoint::Quote => SwapError::Quote(message),
            Endpoint::Swap => SwapError::SwapBuild(message),
        }
    }
}

/// Delay before retry `attempt` (1-based) after a 429: 1s, 2s, 4s ... capped at 16s, plus jitter
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let jitter = fastrand::u64(0..BACKOFF_JITTER_MS);
    Duration::from_millis(base.saturating_add(jitter).min(BACKOFF_MAX_MS))
}

/// HTTP client for the Jupiter v6 swap API
#[derive(Clone)]
pub struct JupiterClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    priority_fee: PrioritizationFee,
}

impl JupiterClient {
    pub fn new(config: &JupiterConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        info!("Jupiter API at {}", config.base_url);
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            max_retries: config.max_retries,
            priority_fee: PrioritizationFee::from_config(config.priority_fee_lamports),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    async fn execute<F>(&self, endpoint: Endpoint, build: F) -> Result<Value, SwapError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            let mut request = build();
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| endpoint.error(format!("request to /{} failed: {}", endpoint.path(), e)))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                if attempt > self.max_retries {
                    warn!("Jupiter /{} still rate limited after {} retries", endpoint.path(), self.max_retries);
                    return Err(SwapError::RateLimited);
                }
                let delay = backoff_delay(attempt);
                warn!(
                    "Jupiter rate limit hit, backing off for {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    self.max_retries
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(endpoint.error(format!("HTTP {}: {}", status, body)));
            }

            debug!("Jupiter /{} request successful", endpoint.path());
            return response
                .json::<Value>()
                .await
                .map_err(|e| endpoint.error(format!("invalid JSON from /{}: {}", endpoint.path(), e)));
        }
    }
}

#[async_trait]
impl SwapRouter for JupiterClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
        let url = self.url(Endpoint::Quote);
        let query = request.query();

        let raw = self
            .execute(Endpoint::Quote, || self.http.get(&url).query(&query))
            .await?;
        let quote = QuoteResponse::from_value(raw)?;

        debug!(
            "Quote {} {} -> {} {} (impact {:.4}%)",
            quote.in_amount, quote.input_mint, quote.out_amount, quote.output_mint, quote.price_impact_pct
        );
        Ok(quote)
    }

    async fn swap_transaction(&self, quote: &QuoteResponse, user: &Pubkey) -> Result<SwapResponse, SwapError> {
        let url = self.url(Endpoint::Swap);
        let body = SwapRequest {
            user_public_key: user.to_string(),
            quote_response: quote.raw.clone(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: self.priority_fee.clone(),
        };

        let raw = self
            .execute(Endpoint::Swap, || self.http.post(&url).json(&body))
            .await?;

        if raw.get("swapTransaction").is_none() {
            return Err(SwapError::SwapBuild(format!("no swapTransaction in response: {}", raw)));
        }
        serde_json::from_value(raw).map_err(|e| SwapError::SwapBuild(format!("unexpected /swap response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        for attempt in 1..=4u32 {
            let delay = backoff_delay(attempt).as_millis() as u64;
            let base = BACKOFF_BASE_MS << (attempt - 1);
            assert!(delay >= base && delay < base + BACKOFF_JITTER_MS, "attempt {}: {}", attempt, delay);
        }
        assert_eq!(backoff_delay(10), Duration::from_millis(BACKOFF_MAX_MS));
    }

    #[test]
    fn urls_tolerate_trailing_slash() {
        let config = JupiterConfig {
            base_url: "https://quote-api.jup.ag/v6/".into(),
            api_key: Some(String::new()),
            ..JupiterConfig::default()
        };
        let client = JupiterClient::new(&config).unwrap();
        assert_eq!(client.url(Endpoint::Quote), "https://quote-api.jup.ag/v6/quote");
        assert_eq!(client.url(Endpoint::Swap), "https://quote-api.jup.ag/v6/swap");
        assert!(client.api_key.is_none());
    }
}
