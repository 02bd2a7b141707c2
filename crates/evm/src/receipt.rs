//! Bounded waiting for transaction receipts.

use std::time::Duration;

use alloy::primitives::TxHash;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::{EvmError, Ledger, Receipt};

/// Fixed-interval polling against a total deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollingConfig {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("no receipt for {tx_hash} after {attempts} attempts over {elapsed:?}")]
    Timeout {
        tx_hash: TxHash,
        attempts: usize,
        elapsed: Duration,
    },
    #[error(transparent)]
    Evm(#[from] EvmError),
}

/// Polls `ledger` until the receipt for `tx_hash` appears.
///
/// "Not found" keeps polling. A transport failure is returned immediately.
/// Attempts happen at `0, interval, 2 * interval, ...` while still before
/// the deadline, so a 9s timeout with a 3s interval makes exactly three.
pub async fn await_receipt<L>(
    ledger: &L,
    tx_hash: TxHash,
    config: &PollingConfig,
) -> Result<Receipt, WaitError>
where
    L: Ledger + ?Sized,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut attempts = 0;

    loop {
        if Instant::now() >= deadline {
            return Err(WaitError::Timeout {
                tx_hash,
                attempts,
                elapsed: start.elapsed(),
            });
        }

        attempts += 1;

        if let Some(receipt) = ledger.receipt(tx_hash).await? {
            debug!(
                %tx_hash,
                block = receipt.block_number,
                success = receipt.success,
                attempts,
                "Receipt observed"
            );
            return Ok(receipt);
        }

        trace!(%tx_hash, attempts, "Receipt not found yet");
        sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, U256, address};
    use tracing_test::traced_test;

    use super::*;
    use crate::Erc20Token;
    use crate::mock::{MockLedger, SubmissionKind};

    const TOKEN: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");

    fn config(interval_secs: u64, timeout_secs: u64) -> PollingConfig {
        PollingConfig::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn returns_receipt_after_pending_polls() {
        let ledger = MockLedger::new(84532).with_pending_polls(2);
        let tx_hash = ledger
            .approve(TOKEN, Address::ZERO, U256::from(1u64))
            .await
            .unwrap();

        let receipt = await_receipt(&ledger, tx_hash, &config(3, 180)).await.unwrap();

        assert_eq!(receipt.tx_hash, tx_hash);
        assert!(receipt.success);
        assert_eq!(ledger.receipt_queries(), 3);
        assert!(logs_contain("Receipt observed"));
        assert!(logs_contain("attempts=3"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_three_attempts() {
        let ledger = MockLedger::new(84532).never_mined();
        let tx_hash = ledger
            .approve(TOKEN, Address::ZERO, U256::from(1u64))
            .await
            .unwrap();

        let error = await_receipt(&ledger, tx_hash, &config(3, 9)).await.unwrap_err();

        assert!(
            matches!(error, WaitError::Timeout { attempts: 3, .. }),
            "unexpected error: {error:?}"
        );
        assert_eq!(ledger.receipt_queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_timeout_rounds_attempts_up() {
        let ledger = MockLedger::new(84532).never_mined();
        let tx_hash = ledger
            .approve(TOKEN, Address::ZERO, U256::from(1u64))
            .await
            .unwrap();

        let error = await_receipt(&ledger, tx_hash, &config(3, 10)).await.unwrap_err();

        assert!(matches!(error, WaitError::Timeout { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_receipt_is_returned_not_raised() {
        let ledger = MockLedger::new(84532).reverting(SubmissionKind::Approve);
        let tx_hash = ledger
            .approve(TOKEN, Address::ZERO, U256::from(1u64))
            .await
            .unwrap();

        let receipt = await_receipt(&ledger, tx_hash, &config(3, 9)).await.unwrap();

        assert!(!receipt.success);
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_is_not_treated_as_pending() {
        let ledger = MockLedger::new(84532).offline();

        let error = await_receipt(&ledger, TxHash::ZERO, &config(3, 9))
            .await
            .unwrap_err();

        assert!(matches!(error, WaitError::Evm(EvmError::Transport(_))));
        assert_eq!(ledger.receipt_queries(), 1);
    }
}
