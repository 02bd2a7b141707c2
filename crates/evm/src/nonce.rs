//! Per-(chain, account) serialization of transaction submission.
//!
//! A signer's nonce must be fetched and consumed atomically: two submissions
//! that both read the pending nonce before either is sent would collide.
//! Every submitting client takes the lock for its `(chain_id, address)` pair
//! around the nonce fetch and the send.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::Address;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Registry of submission locks shared by every client in the process.
#[derive(Debug, Default)]
pub struct SubmissionLocks {
    locks: Mutex<HashMap<(u64, Address), Arc<AsyncMutex<()>>>>,
}

impl SubmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive submission rights for `account` on `chain_id`.
    ///
    /// The returned guard must be held until the node has accepted the
    /// transaction.
    pub async fn acquire(&self, chain_id: u64, account: Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry((chain_id, account)).or_default())
        };

        trace!(chain_id, %account, "Waiting for submission lock");
        lock.lock_owned().await
    }
}
