use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::rpc::client::{ChainClient, TxReceipt};
use crate::utils::time::now_ms;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: B256,
    pub submitted_at: u64, // millis
    pub confirmations: u32,
}

impl PendingTransaction {
    pub fn new(hash: B256) -> Self {
        Self {
            hash,
            submitted_at: now_ms(),
            confirmations: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub required: u32,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            required: 1,
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// Polls the receipt until `policy.required` confirmations or the timeout.
///
/// A mined receipt with failed status is `TransactionReverted`. Transient
/// receipt lookup errors are logged and polled through.
pub async fn wait_for_confirmation<C>(
    client: &C,
    pending: &mut PendingTransaction,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt, AppError>
where
    C: ChainClient + ?Sized,
{
    let hash = pending.hash;
    match tokio::time::timeout(policy.timeout, poll_receipt(client, pending, policy)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("confirmation of {} timed out after {:?}", hash, policy.timeout);
            Err(AppError::ConfirmationTimeout(hash))
        }
    }
}

async fn poll_receipt<C>(
    client: &C,
    pending: &mut PendingTransaction,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt, AppError>
where
    C: ChainClient + ?Sized,
{
    loop {
        match client.transaction_receipt(pending.hash).await {
            Ok(Some(receipt)) if receipt.block_number.is_some() => {
                if !receipt.status {
                    return Err(AppError::TransactionReverted(pending.hash));
                }
                pending.confirmations = confirmations(client, &receipt, policy.required).await?;
                if pending.confirmations >= policy.required {
                    log::debug!(
                        "{} confirmed ({} confirmations)",
                        pending.hash,
                        pending.confirmations
                    );
                    return Ok(receipt);
                }
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                log::warn!("receipt lookup for {} failed: {}", pending.hash, e);
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

async fn confirmations<C>(client: &C, receipt: &TxReceipt, required: u32) -> Result<u32, AppError>
where
    C: ChainClient + ?Sized,
{
    // being mined is one confirmation, no head lookup needed for the default threshold
    if required <= 1 {
        return Ok(1);
    }
    let mined = receipt.block_number.unwrap_or_default();
    let head = match client.block_number().await {
        Ok(head) => head,
        Err(e) if e.is_transient() => return Ok(1),
        Err(e) => return Err(e),
    };
    Ok(u32::try_from(head.saturating_sub(mined) + 1).unwrap_or(u32::MAX))
}

/// Confirmation wait running on its own task. Dropping the watch stops the
/// local polling; the transaction itself is unaffected.
pub struct ConfirmationWatch {
    hash: B256,
    result: Option<oneshot::Receiver<Result<TxReceipt, AppError>>>,
    task: JoinHandle<()>,
}

impl ConfirmationWatch {
    pub fn spawn<C>(client: Arc<C>, mut pending: PendingTransaction, policy: ConfirmationPolicy) -> Self
    where
        C: ChainClient + ?Sized + 'static,
    {
        let hash = pending.hash;
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let result = wait_for_confirmation(client.as_ref(), &mut pending, &policy).await;
            let _ = tx.send(result);
        });
        Self {
            hash,
            result: Some(rx),
            task,
        }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub async fn wait(&mut self) -> Result<TxReceipt, AppError> {
        let rx = self
            .result
            .take()
            .ok_or_else(|| AppError::InvalidInput("confirmation already awaited".into()))?;
        rx.await
            .map_err(|_| AppError::RpcError(format!("confirmation watch for {} stopped", self.hash)))?
    }

    pub fn cancel(self) {}
}

impl Drop for ConfirmationWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
