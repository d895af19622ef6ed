use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::solana::client::RpcApi;
use crate::solana::rpc_helpers::parse_pubkey;
use crate::solana::wallet::Wallet;
use crate::utils::lamports_to_sol;

/// Balance that is never spent by trades (0.005 SOL)
pub const MIN_BALANCE_LAMPORTS: u64 = 5_000_000;
/// Rough network fee reserved per transaction
pub const FEE_ESTIMATE_LAMPORTS: u64 = 10_000;

struct CachedBalance {
    lamports: AtomicU64,
    checked_at: Mutex<Option<Instant>>,
}

impl CachedBalance {
    fn new() -> Self {
        Self {
            lamports: AtomicU64::new(0),
            checked_at: Mutex::new(None),
        }
    }

    fn store(&self, lamports: u64) -> u64 {
        let previous = self.lamports.swap(lamports, Ordering::SeqCst);
        *self.checked_at.lock() = Some(Instant::now());
        previous
    }

    fn is_stale(&self, threshold: Duration) -> bool {
        match *self.checked_at.lock() {
            Some(time) => time.elapsed() > threshold,
            None => true,
        }
    }
}

/// Named wallets with cached SOL balances
pub struct WalletManager {
    wallets: BTreeMap<String, Arc<Wallet>>,
    balances: BTreeMap<String, Arc<CachedBalance>>,
    client: Arc<dyn RpcApi>,
}

impl WalletManager {
    pub fn new(wallets: Vec<Wallet>, client: Arc<dyn RpcApi>) -> Self {
        let mut by_name = BTreeMap::new();
        let mut balances = BTreeMap::new();
        for wallet in wallets {
            balances.insert(wallet.name().to_string(), Arc::new(CachedBalance::new()));
            by_name.insert(wallet.name().to_string(), Arc::new(wallet));
        }

        Self {
            wallets: by_name,
            balances,
            client,
        }
    }

    /// Parse every wallet secret in the config
    pub fn from_config(config: &Config, client: Arc<dyn RpcApi>) -> Result<Self> {
        let wallets = config
            .wallets
            .iter()
            .map(|(name, secret)| {
                Wallet::from_secret(name.as_str(), secret)
                    .with_context(|| format!("Failed to load wallet '{}'", name))
            })
            .collect::<Result<Vec<_>>>()?;

        for wallet in &wallets {
            info!("Loaded wallet '{}' ({})", wallet.name(), wallet.pubkey());
        }

        Ok(Self::new(wallets, client))
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Wallet>> {
        self.wallets.get(name).cloned()
    }

    /// Look up a wallet, failing with a readable error
    pub fn wallet(&self, name: &str) -> Result<Arc<Wallet>> {
        self.get(name)
            .ok_or_else(|| anyhow!("Unknown wallet '{}'", name))
    }

    pub fn pubkey(&self, name: &str) -> Result<Pubkey> {
        Ok(self.wallet(name)?.pubkey())
    }

    /// Fetch a wallet balance from the chain and update the cache
    pub async fn get_balance(&self, name: &str) -> Result<u64> {
        let wallet = self.wallet(name)?;
        let balance = self.client.get_balance(&wallet.pubkey()).await?;

        if let Some(cache) = self.balances.get(name) {
            cache.store(balance);
        }
        Ok(balance)
    }

    /// Last known balance without hitting the network
    pub fn cached_balance(&self, name: &str) -> Option<u64> {
        self.balances
            .get(name)
            .map(|cache| cache.lamports.load(Ordering::SeqCst))
    }

    pub fn is_balance_stale(&self, name: &str, threshold: Duration) -> bool {
        self.balances
            .get(name)
            .map(|cache| cache.is_stale(threshold))
            .unwrap_or(true)
    }

    /// Refresh the balance only if the cached one is older than `threshold`
    pub async fn refresh_balance_if_stale(&self, name: &str, threshold: Duration) -> Result<u64> {
        if self.is_balance_stale(name, threshold) {
            self.get_balance(name).await
        } else {
            self.cached_balance(name)
                .ok_or_else(|| anyhow!("Unknown wallet '{}'", name))
        }
    }

    /// Current balances of every wallet; failed lookups are reported per wallet
    pub async fn balances(&self) -> Vec<(String, Pubkey, Result<u64>)> {
        let mut out = Vec::with_capacity(self.wallets.len());
        for (name, wallet) in &self.wallets {
            let balance = self.get_balance(name).await;
            out.push((name.clone(), wallet.pubkey(), balance));
        }
        out
    }

    /// Whether `name` can spend `lamports` and still keep the reserve floor
    pub async fn has_sufficient_balance(&self, name: &str, lamports: u64) -> Result<bool> {
        let balance = self.get_balance(name).await?;
        let required = lamports
            .saturating_add(FEE_ESTIMATE_LAMPORTS)
            .saturating_add(MIN_BALANCE_LAMPORTS);

        if balance < required {
            debug!(
                "Wallet '{}' has {:.6} SOL, needs {:.6} SOL",
                name,
                lamports_to_sol(balance),
                lamports_to_sol(required)
            );
        }
        Ok(balance >= required)
    }

    /// Raw units of `mint` held by wallet `name`
    pub async fn token_balance(&self, name: &str, mint: &str) -> Result<u64> {
        let owner = self.pubkey(name)?;
        let mint = parse_pubkey(mint)?;
        self.client.get_token_balance(&owner, &mint).await
    }

    /// Start a background task to periodically refresh every wallet balance
    pub fn start_balance_monitoring(&self, interval_secs: u64) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let targets: Vec<(String, Pubkey, Arc<CachedBalance>)> = self
            .wallets
            .iter()
            .filter_map(|(name, wallet)| {
                self.balances
                    .get(name)
                    .map(|cache| (name.clone(), wallet.pubkey(), Arc::clone(cache)))
            })
            .collect();

        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

            loop {
                interval.tick().await;

                for (name, pubkey, cache) in &targets {
                    match client.get_balance(pubkey).await {
                        Ok(balance) => {
                            let previous = cache.store(balance);
                            if previous != balance {
                                debug!(
                                    "Wallet '{}' balance updated: {:.6} SOL",
                                    name,
                                    lamports_to_sol(balance)
                                );
                            }
                        }
                        Err(e) => warn!("Failed to refresh balance of wallet '{}': {}", name, e),
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwapError;
    use crate::solana::client::SignatureState;
    use async_trait::async_trait;
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;

    struct FixedBalance(u64);

    #[async_trait]
    impl RpcApi for FixedBalance {
        async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64> {
            Ok(self.0)
        }
        async fn get_health(&self) -> Result<()> {
            Ok(())
        }
        async fn get_block_height(&self) -> Result<u64> {
            Ok(0)
        }
        async fn send_transaction(&self, _tx: &VersionedTransaction) -> Result<Signature, SwapError> {
            Err(SwapError::Rpc("not supported".into()))
        }
        async fn get_signature_status(&self, _sig: &Signature) -> Result<SignatureState> {
            Ok(SignatureState::Pending)
        }
        async fn get_token_balance(&self, _owner: &Pubkey, _mint: &Pubkey) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn manager(balance: u64) -> WalletManager {
        WalletManager::new(vec![Wallet::new("main")], Arc::new(FixedBalance(balance)))
    }

    #[tokio::test]
    async fn keeps_reserve_and_fee_headroom() {
        let manager = manager(MIN_BALANCE_LAMPORTS + FEE_ESTIMATE_LAMPORTS + 1_000);
        assert!(manager.has_sufficient_balance("main", 1_000).await.unwrap());
        assert!(!manager.has_sufficient_balance("main", 1_001).await.unwrap());
    }

    #[tokio::test]
    async fn balance_cache_tracks_staleness() {
        let manager = manager(42);
        assert!(manager.is_balance_stale("main", Duration::from_secs(60)));

        assert_eq!(manager.get_balance("main").await.unwrap(), 42);
        assert_eq!(manager.cached_balance("main"), Some(42));
        assert!(!manager.is_balance_stale("main", Duration::from_secs(60)));
        assert_eq!(
            manager
                .refresh_balance_if_stale("main", Duration::from_secs(60))
                .await
                .unwrap(),
            42
        );
    }

    #[tokio::test]
    async fn token_balance_needs_a_valid_mint() {
        let manager = manager(7);
        let usdc = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        assert_eq!(manager.token_balance("main", usdc).await.unwrap(), 7);
        assert!(manager.token_balance("main", "€€€€€").await.is_err());
        assert!(manager.token_balance("nope", usdc).await.is_err());
    }

    #[tokio::test]
    async fn unknown_wallet_is_an_error() {
        let manager = manager(1);
        assert!(manager.get_balance("nope").await.is_err());
        assert!(manager.wallet("nope").is_err());
    }

    #[test]
    fn loads_wallets_from_config() {
        let source = Wallet::new("x");
        let mut config = Config::default();
        config
            .wallets
            .insert("trader".into(), hex::encode(source.export_keypair()));

        let manager = WalletManager::from_config(&config, Arc::new(FixedBalance(0))).unwrap();
        assert_eq!(manager.names(), vec!["trader".to_string()]);
        assert_eq!(manager.pubkey("trader").unwrap(), source.pubkey());
    }
}
