use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;

use crate::error::SwapError;

/// Parse pubkey from string with helpful error message
pub fn parse_pubkey(pubkey_str: &str) -> Result<Pubkey> {
    Pubkey::from_str(pubkey_str.trim())
        .with_context(|| format!("Failed to parse pubkey: {}", pubkey_str))
}

/// Deserialize a base64 wire transaction as returned by Jupiter `/swap`
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, SwapError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| SwapError::Decode(format!("invalid base64: {}", e)))?;

    bincode::deserialize::<VersionedTransaction>(&bytes)
        .map_err(|e| SwapError::Decode(format!("invalid transaction bytes: {}", e)))
}

/// Serialize a transaction into base64 wire format
pub fn encode_transaction(transaction: &VersionedTransaction) -> Result<String, SwapError> {
    let bytes = bincode::serialize(transaction)
        .map_err(|e| SwapError::Decode(format!("failed to serialize transaction: {}", e)))?;
    Ok(BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::signature::{Keypair, Signature, Signer};
    use solana_sdk::system_instruction;

    #[test]
    fn transaction_wire_roundtrip() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let message = VersionedMessage::Legacy(Message::new(&[ix], Some(&payer.pubkey())));
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message,
        };

        let encoded = encode_transaction(&tx).unwrap();
        let decoded = decode_transaction(&encoded).unwrap();
        assert_eq!(decoded.message.static_account_keys()[0], payer.pubkey());
        assert_eq!(decoded.signatures.len(), 1);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode_transaction("!!!"), Err(SwapError::Decode(_))));
        assert!(matches!(decode_transaction("AAAA"), Err(SwapError::Decode(_))));
    }
}
