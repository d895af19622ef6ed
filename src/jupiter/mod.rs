pub mod client;
pub mod types;

pub use client::JupiterClient;
pub use types::{PrioritizationFee, QuoteRequest, QuoteResponse, SwapRequest, SwapResponse};

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::SwapError;

/// Anything that can quote a swap and build its unsigned transaction
#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError>;

    async fn swap_transaction(&self, quote: &QuoteResponse, user: &Pubkey) -> Result<SwapResponse, SwapError>;
}
