use log::{debug, info, warn};
use serde::Serialize;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::config::TradingConfig;
use crate::error::SwapError;
use crate::jupiter::{QuoteRequest, QuoteResponse, SwapRouter};
use crate::models::TradeSide;
use crate::solana::{decode_transaction, RpcApi, SignatureState, Wallet};

/// Wrapped SOL mint, used by Jupiter for native SOL
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// A swap between SOL and one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapOrder {
    pub side: TradeSide,
    /// The non-SOL token
    pub mint: String,
    /// Lamports for a buy, raw token units for a sell
    pub amount: u64,
    pub slippage_bps: u16,
}

impl SwapOrder {
    pub fn buy(mint: impl Into<String>, lamports: u64, slippage_bps: u16) -> Self {
        Self {
            side: TradeSide::Buy,
            mint: mint.into(),
            amount: lamports,
            slippage_bps,
        }
    }

    pub fn sell(mint: impl Into<String>, units: u64, slippage_bps: u16) -> Self {
        Self {
            side: TradeSide::Sell,
            mint: mint.into(),
            amount: units,
            slippage_bps,
        }
    }

    pub fn input_mint(&self) -> &str {
        match self.side {
            TradeSide::Buy => SOL_MINT,
            TradeSide::Sell => &self.mint,
        }
    }

    pub fn output_mint(&self) -> &str {
        match self.side {
            TradeSide::Buy => &self.mint,
            TradeSide::Sell => SOL_MINT,
        }
    }

    pub fn quote_request(&self) -> QuoteRequest {
        QuoteRequest {
            input_mint: self.input_mint().to_string(),
            output_mint: self.output_mint().to_string(),
            amount: self.amount,
            slippage_bps: self.slippage_bps,
        }
    }
}

/// Result of a swap, simulated or on-chain
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub order: SwapOrder,
    /// None for dry runs
    pub signature: Option<Signature>,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub dry_run: bool,
    pub attempts: u32,
}

impl SwapOutcome {
    /// SOL side of the swap
    pub fn sol_lamports(&self) -> u64 {
        match self.order.side {
            TradeSide::Buy => self.in_amount,
            TradeSide::Sell => self.out_amount,
        }
    }

    /// Token side of the swap
    pub fn token_units(&self) -> u64 {
        match self.order.side {
            TradeSide::Buy => self.out_amount,
            TradeSide::Sell => self.in_amount,
        }
    }
}

/// Knobs of the swap pipeline
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub live: bool,
    pub max_price_impact_pct: f64,
    pub max_attempts: u32,
    pub confirm_poll: Duration,
    pub confirm_timeout: Duration,
    /// Pause after a retryable failure, multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl ExecutorConfig {
    pub fn from_trading(trading: &TradingConfig) -> Self {
        Self {
            live: trading.live_mode,
            max_price_impact_pct: trading.max_price_impact_pct,
            max_attempts: trading.max_swap_attempts.max(1),
            confirm_poll: Duration::from_millis(trading.confirm_poll_ms),
            confirm_timeout: Duration::from_secs(trading.confirm_timeout_secs),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Quote, build, sign, submit and confirm Jupiter swaps
pub struct SwapExecutor {
    router: Arc<dyn SwapRouter>,
    rpc: Arc<dyn RpcApi>,
    config: ExecutorConfig,
}

impl SwapExecutor {
    pub fn new(router: Arc<dyn SwapRouter>, rpc: Arc<dyn RpcApi>, config: ExecutorConfig) -> Self {
        if !config.live {
            info!("Swap executor in dry-run mode, nothing will be broadcast");
        }
        Self { router, rpc, config }
    }

    pub fn is_live(&self) -> bool {
        self.config.live
    }

    /// Quote only, without the price impact guard
    pub async fn quote(&self, order: &SwapOrder) -> Result<QuoteResponse, SwapError> {
        self.router.quote(&order.quote_request()).await
    }

    /// Run the order, retrying with a fresh quote after an expired blockhash or rate limit
    pub async fn execute(&self, wallet: &Wallet, order: &SwapOrder) -> Result<SwapOutcome, SwapError> {
        let mut attempt = 1;

        loop {
            match self.attempt(wallet, order, attempt).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.config.retry_backoff.saturating_mul(attempt);
                    warn!(
                        "Swap {} {} attempt {}/{} failed: {}, retrying in {:?}",
                        order.side, order.mint, attempt, self.config.max_attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, wallet: &Wallet, order: &SwapOrder, attempt: u32) -> Result<SwapOutcome, SwapError> {
        let quote = self.quote(order).await?;

        if quote.price_impact_pct > self.config.max_price_impact_pct {
            return Err(SwapError::PriceImpactTooHigh {
                impact_pct: quote.price_impact_pct,
                limit_pct: self.config.max_price_impact_pct,
            });
        }

        let mut outcome = SwapOutcome {
            order: order.clone(),
            signature: None,
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
            price_impact_pct: quote.price_impact_pct,
            dry_run: !self.config.live,
            attempts: attempt,
        };

        if !self.config.live {
            info!(
                "[dry-run] {} {}: {} -> {} (route {})",
                order.side,
                order.mint,
                quote.in_amount,
                quote.out_amount,
                quote.route_labels.join(" > ")
            );
            return Ok(outcome);
        }

        let swap = self.router.swap_transaction(&quote, &wallet.pubkey()).await?;
        let transaction = decode_transaction(&swap.swap_transaction)?;
        let signed = wallet.sign_versioned_transaction(transaction)?;

        let signature = self.rpc.send_transaction(&signed).await?;
        if signature == Signature::default() {
            return Err(SwapError::DummySignature);
        }
        info!("Submitted {} {} as {}", order.side, order.mint, signature);

        self.confirm(&signature, swap.last_valid_block_height).await?;
        outcome.signature = Some(signature);
        Ok(outcome)
    }

    /// Poll the signature until it lands, fails, or its blockhash can no longer land
    pub async fn confirm(&self, signature: &Signature, last_valid_block_height: u64) -> Result<SignatureState, SwapError> {
        let deadline = Instant::now() + self.config.confirm_timeout;

        loop {
            match self.rpc.get_signature_status(signature).await {
                Ok(SignatureState::Failed(e)) => return Err(e),
                Ok(state) if state.is_landed() => {
                    info!("Transaction {} confirmed ({:?})", signature, state);
                    return Ok(state);
                }
                Ok(SignatureState::Pending) => match self.rpc.get_block_height().await {
                    Ok(height) if height > last_valid_block_height => {
                        return Err(SwapError::BlockhashExpired);
                    }
                    Ok(height) => debug!(
                        "{} pending at block height {} (valid until {})",
                        signature, height, last_valid_block_height
                    ),
                    Err(e) => warn!("getBlockHeight failed while confirming {}: {}", signature, e),
                },
                Ok(state) => debug!("{} is {:?}", signature, state),
                Err(e) => warn!("Status lookup for {} failed: {}", signature, e),
            }

            if Instant::now() >= deadline {
                return Err(SwapError::ConfirmationTimeout(signature.to_string()));
            }
            sleep(self.config.confirm_poll).await;
        }
    }
}
