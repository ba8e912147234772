use std::{fmt::Debug, str::FromStr, time::Duration};

use async_trait::async_trait;
use ethers::{
    providers::{
        Http, HttpClientError, JsonRpcClient, JsonRpcError, Middleware, Provider, ProviderError,
        RpcError,
    },
    types::{TransactionReceipt, H256, U256},
};
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use super::{ChainClient, ChainError, Receipt};

/// Infura and friends answer rate limiting with this code.
const RATE_LIMITED_CODE: i64 = -32005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` waits `n * base_delay` before the next try.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    [
        "too many requests",
        "rate limit",
        "bad gateway",
        "service unavailable",
        "gateway timeout",
        "connection closed",
        "connection reset",
        "broken pipe",
        "unexpected eof",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

fn is_transient_rpc_error(err: &JsonRpcError) -> bool {
    err.code == RATE_LIMITED_CODE || is_transient_message(&err.message)
}

/// Connect errors, timeouts, rate limiting and proxy error pages are worth retrying.
fn is_transient(err: &HttpClientError) -> bool {
    match err {
        HttpClientError::ReqwestError(e) => {
            e.is_connect()
                || e.is_timeout()
                || e.status()
                    .map_or(false, |s| s.is_server_error() || s.as_u16() == 429)
                || is_transient_message(&e.to_string())
        }
        HttpClientError::JsonRpcError(e) => is_transient_rpc_error(e),
        HttpClientError::SerdeJson { text, .. } => {
            text.trim().is_empty() || is_transient_message(text)
        }
    }
}

/// [`Http`] transport that retries transient failures with linear backoff.
#[derive(Debug, Clone)]
pub struct RetryingHttp {
    inner: Http,
    retry: RetryPolicy,
}

impl RetryingHttp {
    pub fn new(url: Url, client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            inner: Http::new_with_client(url, client),
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
        }
    }
}

#[async_trait]
impl JsonRpcClient for RetryingHttp {
    type Error = HttpClientError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, HttpClientError> {
        let max_attempts = self.retry.max_attempts;
        let mut attempt = 1;

        loop {
            match self.inner.request(method, &params).await {
                Ok(result) => {
                    debug!("[RPC] <<< {}", method);
                    return Ok(result);
                }
                Err(e) if attempt < max_attempts && is_transient(&e) => {
                    let backoff = self.retry.base_delay * attempt;
                    warn!(
                        "[RPC] transport error calling {} (attempt {}/{}): {}, retrying in {:?}",
                        method, attempt, max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "[RPC] {} failed after {} attempts: {}",
                        method, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Ethereum node client over HTTP(S).
#[derive(Debug, Clone)]
pub struct EthereumRpcClient {
    provider: Provider<RetryingHttp>,
    retry: RetryPolicy,
}

impl EthereumRpcClient {
    pub fn new(rpc_url: &str, retry: RetryPolicy) -> Result<Self, ChainError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| ChainError::Malformed(format!("invalid rpc url {}: {}", rpc_url, e)))?;
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::Malformed(format!("failed to build http client: {}", e)))?;

        let transport = RetryingHttp::new(url, http_client, retry);
        let retry = transport.retry;

        Ok(Self {
            provider: Provider::new(transport),
            retry,
        })
    }

    fn chain_error(&self, err: ProviderError) -> ChainError {
        match err {
            ProviderError::JsonRpcClientError(inner) => {
                if let Some(response) = inner.as_error_response() {
                    if !is_transient_rpc_error(response) {
                        return ChainError::Rpc {
                            code: response.code,
                            message: response.message.clone(),
                        };
                    }
                } else if inner.as_serde_error().is_some()
                    && !is_transient_message(&inner.to_string())
                {
                    return ChainError::Malformed(inner.to_string());
                }

                ChainError::Unavailable {
                    attempts: self.retry.max_attempts,
                    message: inner.to_string(),
                }
            }
            other => ChainError::Malformed(other.to_string()),
        }
    }
}

/// `None` until the receipt carries a block number. Receipts without a
/// status field (pre-Byzantium) count as failed.
pub(crate) fn receipt_from(receipt: TransactionReceipt) -> Option<Receipt> {
    let block_number = receipt.block_number?.as_u64();
    let success = receipt.status.map_or(false, |s| s.as_u64() == 1);

    Some(Receipt {
        success,
        block_number,
    })
}

#[async_trait]
impl ChainClient for EthereumRpcClient {
    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        let hash = H256::from_str(tx_hash)
            .map_err(|e| ChainError::Malformed(format!("invalid hash {}: {}", tx_hash, e)))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.chain_error(e))?;

        Ok(receipt.and_then(receipt_from))
    }

    async fn get_current_block(&self) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| self.chain_error(e))?;

        Ok(block.as_u64())
    }

    async fn get_chain_id(&self) -> Result<u64, ChainError> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| self.chain_error(e))?;

        if chain_id > U256::from(u64::MAX) {
            return Err(ChainError::Malformed(format!(
                "chain id out of range: {}",
                chain_id
            )));
        }

        Ok(chain_id.as_u64())
    }
}
