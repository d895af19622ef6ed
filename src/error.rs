use solana_sdk::instruction::InstructionError;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Jupiter aggregator program error raised when the route output falls
/// below `otherAmountThreshold`.
pub const JUPITER_SLIPPAGE_EXCEEDED: u32 = 6001;

/// Everything that can go wrong on the quote -> swap -> submit path
#[derive(Debug, Clone, Error)]
pub enum SwapError {
    #[error("Quote failed: {0}")]
    Quote(String),

    #[error("Swap transaction request failed: {0}")]
    SwapBuild(String),

    #[error("Jupiter API rate limit exceeded")]
    RateLimited,

    #[error("Failed to decode swap transaction: {0}")]
    Decode(String),

    #[error("Failed to sign transaction: {0}")]
    Signing(String),

    #[error("Price impact {impact_pct:.2}% exceeds limit of {limit_pct:.2}%")]
    PriceImpactTooHigh { impact_pct: f64, limit_pct: f64 },

    #[error("Blockhash expired before the transaction landed")]
    BlockhashExpired,

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Slippage tolerance exceeded")]
    SlippageExceeded,

    #[error("RPC returned a dummy signature, transaction was not broadcast")]
    DummySignature,

    #[error("Transaction failed on-chain: {0}")]
    TransactionFailed(String),

    #[error("Transaction {0} not confirmed before timeout")]
    ConfirmationTimeout(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC endpoint unreachable: {0}")]
    Transport(String),
}

impl SwapError {
    /// Whether a fresh quote and transaction may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::BlockhashExpired | SwapError::RateLimited)
    }

    /// Short machine friendly label, stored with failed trades
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::Quote(_) => "quote",
            SwapError::SwapBuild(_) => "swap_build",
            SwapError::RateLimited => "rate_limited",
            SwapError::Decode(_) => "decode",
            SwapError::Signing(_) => "signing",
            SwapError::PriceImpactTooHigh { .. } => "price_impact",
            SwapError::BlockhashExpired => "blockhash_expired",
            SwapError::InsufficientFunds(_) => "insufficient_funds",
            SwapError::SlippageExceeded => "slippage_exceeded",
            SwapError::DummySignature => "dummy_signature",
            SwapError::TransactionFailed(_) => "transaction_failed",
            SwapError::ConfirmationTimeout(_) => "confirmation_timeout",
            SwapError::Rpc(_) => "rpc",
            SwapError::Transport(_) => "transport",
        }
    }
}

/// Map an RPC or on-chain failure to a [`SwapError`].
///
/// Structured transaction errors win. The message is only inspected when the
/// node did not return one (e.g. a plain JSON-RPC error object).
pub fn classify_rpc_failure(tx_error: Option<&TransactionError>, message: &str) -> SwapError {
    if let Some(err) = tx_error {
        return classify_transaction_error(err);
    }

    let lower = message.to_lowercase();
    if lower.contains("blockhash not found") || lower.contains("block height exceeded") {
        SwapError::BlockhashExpired
    } else if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
        SwapError::InsufficientFunds(message.to_string())
    } else if lower.contains("0x1771") || lower.contains("slippage") {
        SwapError::SlippageExceeded
    } else {
        SwapError::Rpc(message.to_string())
    }
}

/// Map a structured on-chain error
pub fn classify_transaction_error(err: &TransactionError) -> SwapError {
    match err {
        TransactionError::BlockhashNotFound => SwapError::BlockhashExpired,
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. } => {
            SwapError::InsufficientFunds(err.to_string())
        }
        TransactionError::InstructionError(_, InstructionError::Custom(code))
            if *code == JUPITER_SLIPPAGE_EXCEEDED =>
        {
            SwapError::SlippageExceeded
        }
        TransactionError::InstructionError(_, InstructionError::InsufficientFunds) => {
            SwapError::InsufficientFunds(err.to_string())
        }
        other => SwapError::TransactionFailed(other.to_string()),
    }
}

/// Errors surfaced while reading or decrypting configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to decrypt configuration (wrong key or password?)")]
    Decrypt,

    #[error("Unsupported config envelope: {0}")]
    UnsupportedEnvelope(String),

    #[error("Missing key material: set {0}")]
    MissingKey(&'static str),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_errors_take_precedence_over_message() {
        let err = TransactionError::BlockhashNotFound;
        assert!(matches!(
            classify_rpc_failure(Some(&err), "insufficient funds"),
            SwapError::BlockhashExpired
        ));
    }

    #[test]
    fn jupiter_slippage_custom_error() {
        let err = TransactionError::InstructionError(3, InstructionError::Custom(6001));
        assert!(matches!(classify_transaction_error(&err), SwapError::SlippageExceeded));

        let other = TransactionError::InstructionError(3, InstructionError::Custom(42));
        assert!(matches!(classify_transaction_error(&other), SwapError::TransactionFailed(_)));
    }

    #[test]
    fn insufficient_funds_variants() {
        assert!(matches!(
            classify_transaction_error(&TransactionError::InsufficientFundsForFee),
            SwapError::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_rpc_failure(None, "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit. insufficient lamports"),
            SwapError::InsufficientFunds(_)
        ));
    }

    #[test]
    fn message_fallbacks() {
        assert!(matches!(
            classify_rpc_failure(None, "Blockhash not found"),
            SwapError::BlockhashExpired
        ));
        assert!(matches!(
            classify_rpc_failure(None, "custom program error: 0x1771"),
            SwapError::SlippageExceeded
        ));
        assert!(matches!(classify_rpc_failure(None, "node is behind"), SwapError::Rpc(_)));
    }

    #[test]
    fn retryable_errors() {
        assert!(SwapError::BlockhashExpired.is_retryable());
        assert!(SwapError::RateLimited.is_retryable());
        assert!(!SwapError::SlippageExceeded.is_retryable());
        assert!(!SwapError::DummySignature.is_retryable());
        assert_eq!(SwapError::DummySignature.kind(), "dummy_signature");
    }
}
