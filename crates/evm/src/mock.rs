//! In-memory ledger for tests.
//!
//! `MockLedger` accepts every submission, records it, and mines it into a
//! receipt after a configurable number of "not found" polls. Failure modes
//! (reverts, never-mined transactions, dead endpoints) are opt-in through
//! the builder methods.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, Bytes, Log, TxHash, U256, address, keccak256};
use alloy::sol_types::SolEvent;
use alloy::transports::TransportErrorKind;
use async_trait::async_trait;

use crate::bindings::IMessageTransmitter;
use crate::{
    BurnMessenger, DepositForBurn, Erc20Token, EvmError, Ledger, MintTransmitter, Receipt,
};

/// Signer address used when none is configured.
pub const MOCK_SIGNER: Address = address!("0x00000000000000000000000000000000000000a1");

/// The kind of a recorded submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKind {
    Transfer,
    Approve,
    DepositForBurn,
    ReceiveMessage,
}

/// A transaction the mock accepted, with its decoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Transfer {
        token: Address,
        to: Address,
        amount: U256,
    },
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    DepositForBurn {
        messenger: Address,
        burn: DepositForBurn,
    },
    ReceiveMessage {
        transmitter: Address,
        message: Bytes,
        attestation: Bytes,
    },
}

impl Submission {
    pub const fn kind(&self) -> SubmissionKind {
        match self {
            Self::Transfer { .. } => SubmissionKind::Transfer,
            Self::Approve { .. } => SubmissionKind::Approve,
            Self::DepositForBurn { .. } => SubmissionKind::DepositForBurn,
            Self::ReceiveMessage { .. } => SubmissionKind::ReceiveMessage,
        }
    }
}

/// Builds a `MessageSent(bytes)` log as emitted by `emitter`.
pub fn message_sent_log(emitter: Address, message: Bytes) -> Log {
    let event = IMessageTransmitter::MessageSent { message };
    Log {
        address: emitter,
        data: event.encode_log_data(),
    }
}

#[derive(Debug)]
struct PendingReceipt {
    remaining_polls: usize,
    receipt: Receipt,
}

#[derive(Debug, Default)]
struct MockState {
    balances: HashMap<(Address, Address), U256>,
    block_number: u64,
    receipts: HashMap<TxHash, PendingReceipt>,
    submissions: Vec<Submission>,
}

pub struct MockLedger {
    chain_id: u64,
    address: Address,
    decimals: u8,
    symbol: String,
    pending_polls: usize,
    burn_logs: Vec<Log>,
    reverting: HashSet<SubmissionKind>,
    rejected: HashSet<SubmissionKind>,
    unmined: HashSet<SubmissionKind>,
    never_mined: bool,
    offline: bool,
    receipt_queries: AtomicUsize,
    state: Mutex<MockState>,
}

impl MockLedger {
    /// Creates a mock for `chain_id` holding a 6-decimal "USDC" token.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            address: MOCK_SIGNER,
            decimals: 6,
            symbol: "USDC".to_string(),
            pending_polls: 0,
            burn_logs: Vec::new(),
            reverting: HashSet::new(),
            rejected: HashSet::new(),
            unmined: HashSet::new(),
            never_mined: false,
            offline: false,
            receipt_queries: AtomicUsize::new(0),
            state: Mutex::new(MockState {
                block_number: 1,
                ..MockState::default()
            }),
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    #[must_use]
    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = symbol.to_string();
        self
    }

    #[must_use]
    pub fn with_balance(mut self, token: Address, account: Address, amount: U256) -> Self {
        self.state_mut().balances.insert((token, account), amount);
        self
    }

    #[must_use]
    pub fn with_block_number(mut self, block_number: u64) -> Self {
        self.state_mut().block_number = block_number;
        self
    }

    /// Number of "not found" answers before each submission's receipt shows.
    #[must_use]
    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Attaches one `MessageSent` log, emitted by `emitter`, to every
    /// `depositForBurn` receipt.
    #[must_use]
    pub fn with_message_sent(self, emitter: Address, message: Bytes) -> Self {
        self.with_burn_logs(vec![message_sent_log(emitter, message)])
    }

    /// Replaces the logs attached to every `depositForBurn` receipt.
    #[must_use]
    pub fn with_burn_logs(mut self, logs: Vec<Log>) -> Self {
        self.burn_logs = logs;
        self
    }

    /// Submissions of `kind` are accepted but mined with a failed status.
    #[must_use]
    pub fn reverting(mut self, kind: SubmissionKind) -> Self {
        self.reverting.insert(kind);
        self
    }

    /// Submissions of `kind` fail at the transport before reaching the node.
    #[must_use]
    pub fn rejecting(mut self, kind: SubmissionKind) -> Self {
        self.rejected.insert(kind);
        self
    }

    /// Submissions of `kind` are accepted but no receipt ever appears.
    #[must_use]
    pub fn never_mining(mut self, kind: SubmissionKind) -> Self {
        self.unmined.insert(kind);
        self
    }

    /// Submissions are accepted but no receipt ever appears.
    #[must_use]
    pub fn never_mined(mut self) -> Self {
        self.never_mined = true;
        self
    }

    /// Every call fails with a transport error.
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Registers an already-mined receipt, e.g. for status lookups.
    #[must_use]
    pub fn insert_receipt(mut self, tx_hash: TxHash, block_number: u64, success: bool) -> Self {
        self.state_mut().receipts.insert(
            tx_hash,
            PendingReceipt {
                remaining_polls: 0,
                receipt: Receipt {
                    tx_hash,
                    block_number,
                    success,
                    logs: Vec::new(),
                },
            },
        );
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn submission_kinds(&self) -> Vec<SubmissionKind> {
        self.state()
            .submissions
            .iter()
            .map(Submission::kind)
            .collect()
    }

    pub fn receipt_queries(&self) -> usize {
        self.receipt_queries.load(Ordering::SeqCst)
    }

    pub fn balance(&self, token: Address, account: Address) -> U256 {
        self.state()
            .balances
            .get(&(token, account))
            .copied()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), EvmError> {
        if self.offline {
            return Err(TransportErrorKind::custom_str("mock ledger offline").into());
        }
        Ok(())
    }

    fn submit(&self, submission: Submission) -> Result<TxHash, EvmError> {
        self.check_online()?;

        let kind = submission.kind();
        if self.rejected.contains(&kind) {
            return Err(TransportErrorKind::custom_str("mock submission rejected").into());
        }

        let success = !self.reverting.contains(&kind);
        let mut state = self.state();

        let tx_hash = keccak256(format!("{}:{}", self.chain_id, state.submissions.len()));
        state.block_number += 1;
        let block_number = state.block_number;

        if success {
            if let Submission::Transfer { token, to, amount } = &submission {
                let from = state.balances.entry((*token, self.address)).or_default();
                *from = from.saturating_sub(*amount);
                let dest = state.balances.entry((*token, *to)).or_default();
                *dest = dest.saturating_add(*amount);
            }
        }

        let logs = match (&submission, success) {
            (Submission::DepositForBurn { .. }, true) => self.burn_logs.clone(),
            _ => Vec::new(),
        };

        if !self.never_mined && !self.unmined.contains(&kind) {
            state.receipts.insert(
                tx_hash,
                PendingReceipt {
                    remaining_polls: self.pending_polls,
                    receipt: Receipt {
                        tx_hash,
                        block_number,
                        success,
                        logs,
                    },
                },
            );
        }

        state.submissions.push(submission);
        Ok(tx_hash)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>, EvmError> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let mut state = self.state();
        let Some(pending) = state.receipts.get_mut(&tx_hash) else {
            return Ok(None);
        };

        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            return Ok(None);
        }

        Ok(Some(pending.receipt.clone()))
    }

    async fn block_number(&self) -> Result<u64, EvmError> {
        self.check_online()?;
        Ok(self.state().block_number)
    }
}

#[async_trait]
impl Erc20Token for MockLedger {
    async fn decimals(&self, _token: Address) -> Result<u8, EvmError> {
        self.check_online()?;
        Ok(self.decimals)
    }

    async fn symbol(&self, _token: Address) -> Result<String, EvmError> {
        self.check_online()?;
        Ok(self.symbol.clone())
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256, EvmError> {
        self.check_online()?;
        Ok(self.balance(token, account))
    }

    async fn allowance(
        &self,
        token: Address,
        _owner: Address,
        spender: Address,
    ) -> Result<U256, EvmError> {
        self.check_online()?;

        let state = self.state();
        let approved = state
            .submissions
            .iter()
            .rev()
            .find_map(|submission| match submission {
                Submission::Approve {
                    token: approved_token,
                    spender: approved_spender,
                    amount,
                } if *approved_token == token && *approved_spender == spender => Some(*amount),
                _ => None,
            });

        Ok(approved.unwrap_or_default())
    }

    async fn transfer(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, EvmError> {
        self.submit(Submission::Transfer { token, to, amount })
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, EvmError> {
        self.submit(Submission::Approve {
            token,
            spender,
            amount,
        })
    }
}

#[async_trait]
impl BurnMessenger for MockLedger {
    async fn deposit_for_burn(
        &self,
        messenger: Address,
        burn: DepositForBurn,
    ) -> Result<TxHash, EvmError> {
        self.submit(Submission::DepositForBurn { messenger, burn })
    }
}

#[async_trait]
impl MintTransmitter for MockLedger {
    async fn receive_message(
        &self,
        transmitter: Address,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<TxHash, EvmError> {
        self.submit(Submission::ReceiveMessage {
            transmitter,
            message,
            attestation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
    const OTHER: Address = address!("0x00000000000000000000000000000000000000b2");

    #[tokio::test]
    async fn transfer_moves_balance_and_mines() {
        let ledger = MockLedger::new(84532).with_balance(TOKEN, MOCK_SIGNER, U256::from(10u64));

        let tx_hash = ledger.transfer(TOKEN, OTHER, U256::from(4u64)).await.unwrap();

        assert_eq!(ledger.balance(TOKEN, MOCK_SIGNER), U256::from(6u64));
        assert_eq!(ledger.balance(TOKEN, OTHER), U256::from(4u64));

        let receipt = ledger.receipt(tx_hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 2);
    }

    #[tokio::test]
    async fn tx_hashes_are_distinct_per_submission() {
        let ledger = MockLedger::new(84532);

        let first = ledger.approve(TOKEN, OTHER, U256::from(1u64)).await.unwrap();
        let second = ledger.approve(TOKEN, OTHER, U256::from(1u64)).await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn allowance_reflects_latest_approve() {
        let ledger = MockLedger::new(84532);
        assert_eq!(ledger.allowance(TOKEN, MOCK_SIGNER, OTHER).await.unwrap(), U256::ZERO);

        ledger.approve(TOKEN, OTHER, U256::from(5u64)).await.unwrap();

        assert_eq!(
            ledger.allowance(TOKEN, MOCK_SIGNER, OTHER).await.unwrap(),
            U256::from(5u64)
        );
    }

    #[tokio::test]
    async fn burn_receipt_carries_message_sent() {
        let message = Bytes::from_static(b"cctp message");
        let ledger = MockLedger::new(84532).with_message_sent(OTHER, message.clone());

        let burn = DepositForBurn::new(U256::from(1u64), 3, OTHER, TOKEN);
        let tx_hash = ledger.deposit_for_burn(OTHER, burn).await.unwrap();

        let receipt = ledger.receipt(tx_hash).await.unwrap().unwrap();
        let [log] = receipt.logs.as_slice() else {
            panic!("expected exactly one log, got {:?}", receipt.logs);
        };
        let decoded = IMessageTransmitter::MessageSent::decode_log(log).unwrap();
        assert_eq!(decoded.message, message);
    }

    #[tokio::test]
    async fn rejected_submission_is_not_recorded() {
        let ledger = MockLedger::new(84532).rejecting(SubmissionKind::Approve);

        let error = ledger.approve(TOKEN, OTHER, U256::from(1u64)).await.unwrap_err();

        assert!(matches!(error, EvmError::Transport(_)));
        assert!(ledger.submissions().is_empty());
    }
}
