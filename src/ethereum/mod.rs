pub mod chain;
#[cfg(test)]
pub mod mock;
pub mod rpc;

use async_trait::async_trait;
use thiserror::Error;

pub use chain::Chain;
pub use rpc::{EthereumRpcClient, RetryPolicy};

/// A mined transaction as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
    pub block_number: u64,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

/// The node operations the confirmation engine depends on.
#[async_trait]
pub trait ChainClient
where
    Self: Send + Sync + 'static,
{
    /// `None` while the transaction is not mined yet.
    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError>;

    async fn get_current_block(&self) -> Result<u64, ChainError>;

    async fn get_chain_id(&self) -> Result<u64, ChainError>;
}
