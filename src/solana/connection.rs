use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::RpcConfig;
use crate::error::SwapError;
use crate::solana::client::{RpcApi, SignatureState, SolanaClient};

/// Status of a connection in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connection is healthy and available
    Healthy,
    /// Connection has failed and is waiting for a successful health check
    Reconnecting,
}

/// Configuration for connection pooling
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// How often to check connection health
    pub health_check_interval_secs: u64,
    /// RPC URLs to use, primary first
    pub rpc_urls: Vec<String>,
}

impl ConnectionPoolConfig {
    pub fn from_rpc_config(config: &RpcConfig) -> Self {
        let mut rpc_urls = vec![config.url.clone()];
        for url in &config.fallback_urls {
            if !rpc_urls.contains(url) {
                rpc_urls.push(url.clone());
            }
        }
        Self {
            health_check_interval_secs: config.health_check_interval_secs.max(1),
            rpc_urls,
        }
    }
}

struct Endpoint {
    client: SolanaClient,
    status: ConnectionStatus,
    last_change: Instant,
}

/// Primary RPC endpoint plus fallbacks, with health-based failover
pub struct ConnectionPool {
    endpoints: Arc<Mutex<Vec<Endpoint>>>,
    config: ConnectionPoolConfig,
}

impl ConnectionPool {
    /// Create a pool from already constructed clients
    pub fn new(config: ConnectionPoolConfig, clients: Vec<SolanaClient>) -> Self {
        let endpoints = clients
            .into_iter()
            .map(|client| {
                info!("Registered Solana RPC endpoint {}", client.url());
                Endpoint {
                    client,
                    status: ConnectionStatus::Healthy,
                    last_change: Instant::now(),
                }
            })
            .collect();

        Self {
            endpoints: Arc::new(Mutex::new(endpoints)),
            config,
        }
    }

    /// Build the pool from the RPC section of the config
    pub fn from_config(rpc: &RpcConfig) -> Self {
        let config = ConnectionPoolConfig::from_rpc_config(rpc);
        let clients = config
            .rpc_urls
            .iter()
            .map(|url| SolanaClient::from_config(url, rpc))
            .collect();
        Self::new(config, clients)
    }

    /// Get the first healthy client, primary preferred
    pub fn client(&self) -> Result<SolanaClient> {
        let endpoints = self.endpoints.lock();

        endpoints
            .iter()
            .find(|endpoint| endpoint.status == ConnectionStatus::Healthy)
            .map(|endpoint| {
                debug!("Using Solana RPC connection to {}", endpoint.client.url());
                endpoint.client.clone()
            })
            .ok_or_else(|| anyhow!("No healthy Solana RPC connections"))
    }

    /// Take an endpoint out of rotation until the health task restores it
    pub fn mark_unhealthy(&self, url: &str) {
        let mut endpoints = self.endpoints.lock();

        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.client.url() == url) {
            if endpoint.status == ConnectionStatus::Healthy {
                warn!("Solana RPC connection to {} is unhealthy, marking for reconnection", url);
                endpoint.status = ConnectionStatus::Reconnecting;
                endpoint.last_change = Instant::now();
            }
        }
    }

    /// Per-endpoint status, primary first
    pub fn statuses(&self) -> Vec<(String, ConnectionStatus)> {
        self.endpoints
            .lock()
            .iter()
            .map(|endpoint| (endpoint.client.url().to_string(), endpoint.status))
            .collect()
    }

    /// Run one health sweep over every endpoint
    pub async fn check_health(&self) {
        let clients: Vec<SolanaClient> = self
            .endpoints
            .lock()
            .iter()
            .map(|endpoint| endpoint.client.clone())
            .collect();

        for client in clients {
            let healthy = client.is_healthy().await;
            let mut endpoints = self.endpoints.lock();
            let Some(endpoint) = endpoints.iter_mut().find(|e| e.client.url() == client.url()) else {
                continue;
            };

            match (endpoint.status, healthy) {
                (ConnectionStatus::Reconnecting, true) => {
                    info!(
                        "Solana RPC connection to {} has been restored after {:?}",
                        client.url(),
                        endpoint.last_change.elapsed()
                    );
                    endpoint.status = ConnectionStatus::Healthy;
                    endpoint.last_change = Instant::now();
                }
                (ConnectionStatus::Healthy, false) => {
                    warn!("Solana RPC connection to {} failed its health check", client.url());
                    endpoint.status = ConnectionStatus::Reconnecting;
                    endpoint.last_change = Instant::now();
                }
                (ConnectionStatus::Reconnecting, false) => {
                    error!("Solana RPC at {} is still unreachable", client.url());
                }
                (ConnectionStatus::Healthy, true) => {}
            }
        }
    }

    /// Start a background task to periodically check connection health
    pub fn start_health_check_task(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let period = Duration::from_secs(self.config.health_check_interval_secs);

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;
                pool.check_health().await;
            }
        })
    }

    async fn with_failover<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(SolanaClient) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let client = self.client()?;
        let url = client.url().to_string();

        match call(client).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.mark_unhealthy(&url);
                // One more try on whatever is healthy now
                let fallback = self.client().map_err(|_| e)?;
                call(fallback).await
            }
        }
    }
}

#[async_trait]
impl RpcApi for ConnectionPool {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        let pubkey = *pubkey;
        self.with_failover(|client| async move { client.get_balance(&pubkey).await })
            .await
    }

    async fn get_health(&self) -> Result<()> {
        self.with_failover(|client| async move { client.get_health().await })
            .await
    }

    async fn get_block_height(&self) -> Result<u64> {
        self.with_failover(|client| async move { client.get_block_height().await })
            .await
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, SwapError> {
        let client = self.client().map_err(|e| SwapError::Transport(e.to_string()))?;
        let result = client.send_transaction(transaction).await;

        // Only an unreachable node takes the endpoint out
        if let Err(SwapError::Transport(_)) = &result {
            self.mark_unhealthy(client.url());
        }
        result
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<SignatureState> {
        let signature = *signature;
        self.with_failover(|client| async move { client.get_signature_status(&signature).await })
            .await
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        let (owner, mint) = (*owner, *mint);
        self.with_failover(|client| async move { client.get_token_balance(&owner, &mint).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(urls: &[&str]) -> ConnectionPool {
        let config = ConnectionPoolConfig {
            health_check_interval_secs: 60,
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
        };
        let clients = urls.iter().map(|url| SolanaClient::new(url)).collect();
        ConnectionPool::new(config, clients)
    }

    #[tokio::test]
    async fn fails_over_to_next_healthy_endpoint() {
        let pool = pool(&["http://primary:8899", "http://backup:8899"]);
        assert_eq!(pool.client().unwrap().url(), "http://primary:8899");

        pool.mark_unhealthy("http://primary:8899");
        assert_eq!(pool.client().unwrap().url(), "http://backup:8899");

        pool.mark_unhealthy("http://backup:8899");
        assert!(pool.client().is_err());
        assert!(pool
            .statuses()
            .iter()
            .all(|(_, status)| *status == ConnectionStatus::Reconnecting));
    }

    #[tokio::test]
    async fn failed_call_is_retried_on_the_backup() {
        let pool = pool(&["http://primary:8899", "http://backup:8899"]);

        let served_by = pool
            .with_failover(|client| async move {
                if client.url() == "http://primary:8899" {
                    Err(anyhow!("connection refused"))
                } else {
                    Ok(client.url().to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(served_by, "http://backup:8899");
        assert_eq!(
            pool.statuses(),
            vec![
                ("http://primary:8899".to_string(), ConnectionStatus::Reconnecting),
                ("http://backup:8899".to_string(), ConnectionStatus::Healthy),
            ]
        );
        assert_eq!(pool.client().unwrap().url(), "http://backup:8899");
    }

    #[tokio::test]
    async fn failure_with_no_backup_keeps_the_original_error() {
        let pool = pool(&["http://primary:8899"]);

        let err = pool
            .with_failover(|_client| async move { Err::<(), _>(anyhow!("connection refused")) })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection refused"));
        assert!(pool.client().is_err());
    }

    #[test]
    fn fallback_urls_are_deduplicated() {
        let rpc = RpcConfig {
            url: "http://a".into(),
            fallback_urls: vec!["http://b".into(), "http://a".into()],
            ..RpcConfig::default()
        };
        let config = ConnectionPoolConfig::from_rpc_config(&rpc);
        assert_eq!(config.rpc_urls, vec!["http://a".to_string(), "http://b".to_string()]);
    }
}
