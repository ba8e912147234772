//! Scripted [`ChainClient`] for tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::ethereum::{ChainClient, ChainError, Receipt};

#[derive(Default)]
struct MockChainState {
    receipts: HashMap<String, Receipt>,
    current_block: u64,
    unavailable: bool,
    receipt_calls: usize,
    delay: Duration,
}

#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
}

impl MockChain {
    pub fn mine(&self, hash: &str, success: bool, block_number: u64) {
        self.state.lock().unwrap().receipts.insert(
            hash.to_string(),
            Receipt {
                success,
                block_number,
            },
        );
    }

    pub fn set_current_block(&self, block: u64) {
        self.state.lock().unwrap().current_block = block;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn receipt_calls(&self) -> usize {
        self.state.lock().unwrap().receipt_calls
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        let delay = self.state.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.receipt_calls += 1;
        if state.unavailable {
            return Err(ChainError::Unavailable {
                attempts: 3,
                message: "connection refused".to_string(),
            });
        }
        Ok(state.receipts.get(tx_hash).copied())
    }

    async fn get_current_block(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ChainError::Unavailable {
                attempts: 3,
                message: "connection refused".to_string(),
            });
        }
        Ok(state.current_block)
    }

    async fn get_chain_id(&self) -> Result<u64, ChainError> {
        Ok(1)
    }
}
