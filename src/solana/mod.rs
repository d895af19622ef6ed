pub mod client;
pub mod connection;
pub mod rpc_helpers;
pub mod wallet;
pub mod wallet_manager;

pub use client::{RetryConfig, RpcApi, SignatureState, SolanaClient};
pub use connection::{ConnectionPool, ConnectionPoolConfig, ConnectionStatus};
pub use rpc_helpers::*;
pub use wallet::Wallet;
pub use wallet_manager::WalletManager;

use crate::config::Config;
use std::sync::Arc;

/// Create the RPC connection pool from the application configuration
pub fn create_pool_from_config(config: &Config) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::from_config(&config.rpc))
}
