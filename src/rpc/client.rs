use std::future::Future;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Transaction handed to the wallet/node for signing and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    /// None while the transaction is still pending
    pub block_number: Option<u64>,
    pub status: bool,
}

/// Chain access used by the session: reads, submission and receipt lookup.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_balance(&self, address: Address) -> Result<U256, AppError>;

    /// Read-only `eth_call` against `latest`.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AppError>;

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, AppError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, AppError>;

    async fn block_number(&self) -> Result<u64, AppError>;
}

/// Bounded retry for read calls. Never used for wallet-approved calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts <= self.retries => {
                    log::warn!(
                        "{} failed: {} (attempt {}/{})",
                        label,
                        e,
                        attempts,
                        self.retries + 1
                    );
                    tokio::time::sleep(self.delay * attempts).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
