use anyhow::{anyhow, Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::keypair::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use std::fs;
use std::path::Path;

use crate::error::SwapError;

/// A named signing keypair
pub struct Wallet {
    name: String,
    keypair: Keypair,
}

impl Wallet {
    /// Create a new wallet with a random keypair
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keypair: Keypair::new(),
        }
    }

    /// Load a wallet from a keypair file (JSON byte array or base58)
    pub fn from_file<P: AsRef<Path>>(name: impl Into<String>, path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read keypair file at {:?}", path.as_ref()))?;

        Self::from_secret(name, &contents)
            .with_context(|| format!("Failed to parse keypair file at {:?}", path.as_ref()))
    }

    /// Parse a 64-byte secret key given as a JSON byte array, hex or base58
    pub fn from_secret(name: impl Into<String>, secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let name = name.into();

        if secret.starts_with('[') {
            let bytes: Vec<u8> = serde_json::from_str(secret)
                .context("Secret looks like a JSON array but could not be parsed")?;
            return Self::from_bytes(name, &bytes);
        }

        if secret.len() == 128 && secret.chars().all(|c| c.is_ascii_hexdigit()) {
            let bytes = hex::decode(secret).context("Invalid hex secret key")?;
            return Self::from_bytes(name, &bytes);
        }

        let bytes = bs58::decode(secret)
            .into_vec()
            .map_err(|_| anyhow!("Secret key for wallet '{}' is not hex, base58 or a JSON array", name))?;
        Self::from_bytes(name, &bytes)
    }

    fn from_bytes(name: String, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(anyhow!(
                "Secret key for wallet '{}' must be 64 bytes, got {}",
                name,
                bytes.len()
            ));
        }
        let keypair = Keypair::from_bytes(bytes)
            .map_err(|e| anyhow!("Invalid secret key for wallet '{}': {}", name, e))?;
        Ok(Self { name, keypair })
    }

    /// Wallet name as configured
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the public key of the wallet
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign a transaction built by someone else (e.g. Jupiter).
    ///
    /// The signature goes into the slot matching this wallet's position among
    /// the message's required signers; other signature slots are left alone.
    pub fn sign_versioned_transaction(
        &self,
        mut transaction: VersionedTransaction,
    ) -> Result<VersionedTransaction, SwapError> {
        let pubkey = self.pubkey();
        let required = transaction.message.header().num_required_signatures as usize;

        let index = transaction
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|key| key == &pubkey)
            .ok_or_else(|| {
                SwapError::Signing(format!("{} is not a required signer of the transaction", pubkey))
            })?;

        if transaction.signatures.len() < required {
            transaction
                .signatures
                .resize(required, solana_sdk::signature::Signature::default());
        }

        let message_bytes = transaction.message.serialize();
        transaction.signatures[index] = self.keypair.sign_message(&message_bytes);

        Ok(transaction)
    }

    /// Export keypair as bytes (for backup purposes)
    pub fn export_keypair(&self) -> Vec<u8> {
        self.keypair.to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name)
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::signature::Signature;
    use solana_sdk::system_instruction;

    fn unsigned_transfer(payer: &Pubkey) -> VersionedTransaction {
        let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), 1_000);
        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message::new(&[ix], Some(payer))),
        }
    }

    #[test]
    fn parses_all_secret_formats() {
        let original = Wallet::new("src");
        let bytes = original.export_keypair();

        let json = serde_json::to_string(&bytes).unwrap();
        let hex_secret = hex::encode(&bytes);
        let b58 = bs58::encode(&bytes).into_string();

        for secret in [json, hex_secret, b58] {
            let wallet = Wallet::from_secret("main", &secret).unwrap();
            assert_eq!(wallet.pubkey(), original.pubkey());
            assert_eq!(wallet.name(), "main");
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Wallet::from_secret("w", "[1,2,3]").is_err());
        assert!(Wallet::from_secret("w", "deadbeef").is_err());
    }

    #[test]
    fn loads_keypair_file() {
        let wallet = Wallet::new("file");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        fs::write(&path, serde_json::to_string(&wallet.export_keypair()).unwrap()).unwrap();

        let loaded = Wallet::from_file("file", &path).unwrap();
        assert_eq!(loaded.pubkey(), wallet.pubkey());
    }

    #[test]
    fn signs_in_the_fee_payer_slot() {
        let wallet = Wallet::new("signer");
        let tx = unsigned_transfer(&wallet.pubkey());

        let signed = wallet.sign_versioned_transaction(tx).unwrap();
        assert_ne!(signed.signatures[0], Signature::default());
        assert!(signed.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn refuses_to_sign_for_someone_else() {
        let wallet = Wallet::new("signer");
        let tx = unsigned_transfer(&Pubkey::new_unique());

        assert!(matches!(
            wallet.sign_versioned_transaction(tx),
            Err(SwapError::Signing(_))
        ));
    }
}
