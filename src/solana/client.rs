use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RpcConfig;
use crate::error::{classify_rpc_failure, classify_transaction_error, SwapError};

/// Retry policy for idempotent RPC reads
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Exponential delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Where a submitted transaction currently stands
#[derive(Debug, Clone)]
pub enum SignatureState {
    /// The node has not seen the signature yet
    Pending,
    Processed,
    Confirmed,
    Finalized,
    Failed(SwapError),
}

impl SignatureState {
    pub fn is_landed(&self) -> bool {
        matches!(self, SignatureState::Confirmed | SignatureState::Finalized)
    }
}

/// The subset of Solana JSON-RPC the bot relies on
#[async_trait]
pub trait RpcApi: Send + Sync {
    /// `getBalance` in lamports
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64>;

    /// `getHealth`
    async fn get_health(&self) -> Result<()>;

    /// `getBlockHeight`
    async fn get_block_height(&self) -> Result<u64>;

    /// `sendTransaction` of an already signed transaction
    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, SwapError>;

    /// `getSignatureStatuses` for a single signature
    async fn get_signature_status(&self, signature: &Signature) -> Result<SignatureState>;

    /// Raw units of `mint` held across all of `owner`'s token accounts
    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64>;
}

/// Wrapper around the Solana RPC client with retry logic and error handling
#[derive(Clone)]
pub struct SolanaClient {
    url: String,
    rpc_client: Arc<RpcClient>,
    retry_config: RetryConfig,
}

impl SolanaClient {
    /// Create a new Solana client with the given RPC URL
    pub fn new(rpc_url: &str) -> Self {
        Self::new_with_config(rpc_url, CommitmentConfig::confirmed(), RetryConfig::default(), Duration::from_secs(30))
    }

    /// Create a client with explicit commitment, retry policy and timeout
    pub fn new_with_config(
        rpc_url: &str,
        commitment: CommitmentConfig,
        retry_config: RetryConfig,
        timeout: Duration,
    ) -> Self {
        let rpc_client = RpcClient::new_with_timeout_and_commitment(rpc_url.to_string(), timeout, commitment);

        Self {
            url: rpc_url.to_string(),
            rpc_client: Arc::new(rpc_client),
            retry_config,
        }
    }

    /// Build a client for `url` using the RPC section of the config
    pub fn from_config(url: &str, config: &RpcConfig) -> Self {
        let retry_config = RetryConfig {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            ..RetryConfig::default()
        };
        Self::new_with_config(
            url,
            CommitmentConfig::confirmed(),
            retry_config,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// The endpoint this client talks to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the node answers `getHealth` with "ok"
    pub async fn is_healthy(&self) -> bool {
        self.rpc_client.get_health().await.is_ok()
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry_config.max_retries => {
                    attempt += 1;
                    let delay = self.retry_config.delay_for(attempt);
                    warn!(
                        "{} against {} failed (attempt {}/{}), retrying in {:?}: {}",
                        op, self.url, attempt, self.retry_config.max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(anyhow!("{} against {} failed: {}", op, self.url, e)),
            }
        }
    }
}

#[async_trait]
impl RpcApi for SolanaClient {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        debug!("getBalance {}", pubkey);
        self.with_retry("getBalance", || self.rpc_client.get_balance(pubkey)).await
    }

    async fn get_health(&self) -> Result<()> {
        self.with_retry("getHealth", || self.rpc_client.get_health()).await
    }

    async fn get_block_height(&self) -> Result<u64> {
        self.with_retry("getBlockHeight", || self.rpc_client.get_block_height()).await
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, SwapError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Processed),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: Some(5),
            min_context_slot: None,
        };

        // Sent once: resubmission is driven by the executor with a fresh blockhash
        self.rpc_client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| classify_send_error(&e))
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<SignatureState> {
        let response = self
            .with_retry("getSignatureStatuses", || {
                self.rpc_client.get_signature_statuses(std::slice::from_ref(signature))
            })
            .await?;

        let state = match response.value.into_iter().next().flatten() {
            None => SignatureState::Pending,
            Some(status) => match (&status.err, &status.confirmation_status) {
                (Some(err), _) => SignatureState::Failed(classify_transaction_error(err)),
                (None, Some(TransactionConfirmationStatus::Finalized)) => SignatureState::Finalized,
                (None, Some(TransactionConfirmationStatus::Confirmed)) => SignatureState::Confirmed,
                (None, Some(TransactionConfirmationStatus::Processed)) => SignatureState::Processed,
                // Nodes that omit confirmationStatus report confirmations instead
                (None, None) if status.confirmations.is_none() => SignatureState::Finalized,
                (None, None) => SignatureState::Confirmed,
            },
        };

        Ok(state)
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        let accounts = self
            .with_retry("getTokenAccountsByOwner", || {
                self.rpc_client
                    .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            })
            .await?;

        let mut total = 0u64;
        for keyed in accounts {
            let data = serde_json::to_value(&keyed.account.data)?;
            match parsed_token_amount(&data) {
                Some(amount) => total = total.saturating_add(amount),
                None => warn!("Token account {} has no parsed balance", keyed.pubkey),
            }
        }
        Ok(total)
    }
}

/// Transport failures never reached the node; everything else is the node's answer
fn classify_send_error(error: &ClientError) -> SwapError {
    match error.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => SwapError::Transport(error.to_string()),
        _ => classify_rpc_failure(error.get_transaction_error().as_ref(), &error.to_string()),
    }
}

/// `tokenAmount.amount` of a jsonParsed SPL token account
fn parsed_token_amount(data: &Value) -> Option<u64> {
    data.pointer("/parsed/info/tokenAmount/amount")?
        .as_str()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_grow_and_cap() {
        let retry = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn only_transport_failures_are_transport_errors() {
        let refused = ClientError::from(ClientErrorKind::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )));
        assert!(matches!(classify_send_error(&refused), SwapError::Transport(_)));

        let rejected = ClientError::from(ClientErrorKind::RpcError(
            solana_client::rpc_request::RpcError::ForUser(
                "Transaction simulation failed: Error processing Instruction 2".into(),
            ),
        ));
        assert!(matches!(classify_send_error(&rejected), SwapError::Rpc(_)));
    }

    #[test]
    fn reads_parsed_token_amounts() {
        let data = serde_json::json!({
            "program": "spl-token",
            "parsed": {
                "type": "account",
                "info": {
                    "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                    "tokenAmount": { "amount": "1523400", "decimals": 6, "uiAmount": 1.5234 }
                }
            },
            "space": 165
        });
        assert_eq!(parsed_token_amount(&data), Some(1_523_400));
        assert_eq!(parsed_token_amount(&serde_json::json!(["AAAA", "base64"])), None);
    }

    #[test]
    fn only_confirmed_states_count_as_landed() {
        assert!(SignatureState::Confirmed.is_landed());
        assert!(SignatureState::Finalized.is_landed());
        assert!(!SignatureState::Processed.is_landed());
        assert!(!SignatureState::Pending.is_landed());
        assert!(!SignatureState::Failed(SwapError::SlippageExceeded).is_landed());
    }
}
