//! Burn-and-mint USDC bridging over Circle CCTP between testnet chains.
//!
//! A bridge request moves through a fixed sequence of steps:
//!
//! 1. **Validate** the request and resolve both chains (no network access)
//! 2. **Normalize** the amount to base units using the source token decimals
//! 3. **Approve** the source `TokenMessenger` to spend the amount
//! 4. **Burn** with `TokenMessenger.depositForBurn()`
//! 5. **Extract** the `MessageSent` payload from the burn receipt
//! 6. **Attest**: poll the attestation service by the message digest
//! 7. **Mint** with `MessageTransmitter.receiveMessage()` on the destination
//!
//! Every step is terminal on failure. Nothing is rolled back or resubmitted:
//! once funds have moved, the error carries every transaction id obtained so
//! far so that an operator can finish the transfer by hand.

use std::fmt::Display;

use alloy::primitives::{Address, B256, TxHash, U256};
use relay_evm::{EvmError, InvalidAddress, Receipt, WaitError};
use relay_exact_decimal::AmountError;
use serde::Serialize;

pub mod attestation;
pub mod connector;
pub mod orchestrator;
pub mod registry;

pub use attestation::{
    Attestation, AttestationError, AttestationLookup, AttestationPoller, AttestationStatus,
};
pub use connector::{ChainConnector, RpcConnector, StaticConnector};
pub use orchestrator::BridgeOrchestrator;
pub use registry::{ChainDescriptor, ChainRegistry, ChainSettings, RegistryError};

/// A request to move `amount` USDC from chain `from` to chain `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
    /// Destination account. Defaults to the signer's own address.
    pub recipient: Option<String>,
    /// Validate and report without touching any chain.
    pub simulate: bool,
}

/// What a transaction did within a bridge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Approve,
    Burn,
    Mint,
}

impl Display for Role {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(dest, "approve"),
            Self::Burn => write!(dest, "burn"),
            Self::Mint => write!(dest, "mint"),
        }
    }
}

/// One submitted transaction and, once observed, its receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub chain: String,
    pub network_id: u64,
    pub tx_hash: TxHash,
    pub role: Role,
    pub receipt: Option<Receipt>,
}

/// Dry-run result: the request was valid, nothing was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedBridge {
    pub request_id: Option<B256>,
    pub simulated: bool,
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "relay_evm::checksum::serialize_option"
    )]
    pub recipient: Option<Address>,
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeReceipt {
    /// keccak-256 of the CCTP message, also the attestation key.
    pub request_id: B256,
    pub simulated: bool,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub amount_base_units: U256,
    #[serde(serialize_with = "relay_evm::checksum::serialize")]
    pub recipient: Address,
    pub approve_txid: TxHash,
    pub burn_txid: TxHash,
    pub mint_txid: TxHash,
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BridgeOutcome {
    Simulated(SimulatedBridge),
    Completed(BridgeReceipt),
}

/// Everything a failed run obtained before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeProgress {
    pub from: String,
    pub to: String,
    pub amount_base_units: Option<U256>,
    #[serde(serialize_with = "relay_evm::checksum::serialize_option")]
    pub recipient: Option<Address>,
    pub approve_txid: Option<TxHash>,
    pub burn_txid: Option<TxHash>,
    pub mint_txid: Option<TxHash>,
    pub request_id: Option<B256>,
    pub transactions: Vec<TransactionRecord>,
}

impl BridgeProgress {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            ..Self::default()
        }
    }

    /// True once any funds-moving transaction has been submitted.
    pub fn has_submissions(&self) -> bool {
        !self.transactions.is_empty()
    }

    fn record(&mut self, chain: &ChainDescriptor, tx_hash: TxHash, role: Role) {
        match role {
            Role::Approve => self.approve_txid = Some(tx_hash),
            Role::Burn => self.burn_txid = Some(tx_hash),
            Role::Mint => self.mint_txid = Some(tx_hash),
        }

        self.transactions.push(TransactionRecord {
            chain: chain.chain.clone(),
            network_id: chain.network_id,
            tx_hash,
            role,
            receipt: None,
        });
    }

    fn attach_receipt(&mut self, receipt: &Receipt) {
        if let Some(record) = self
            .transactions
            .iter_mut()
            .find(|record| record.tx_hash == receipt.tx_hash)
        {
            record.receipt = Some(receipt.clone());
        }
    }
}

/// The stage a bridge run was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Normalize,
    Approve,
    Burn,
    ExtractProof,
    Attest,
    Mint,
}

impl Display for Step {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normalize => "normalize",
            Self::Approve => "approve",
            Self::Burn => "burn",
            Self::ExtractProof => "extract proof",
            Self::Attest => "attest",
            Self::Mint => "mint",
        };
        write!(dest, "{name}")
    }
}

/// Failure category, for callers deciding whether and how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    Network,
    Timeout,
    Chain,
    Protocol,
}

impl Display for ErrorKind {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Chain => "chain",
            Self::Protocol => "protocol",
        };
        write!(dest, "{name}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("source and destination chain must differ, both are {chain}")]
    SameChain { chain: String },
    #[error("invalid recipient: {0}")]
    Recipient(#[from] InvalidAddress),
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Why a step after validation failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("no MessageSent event in burn transaction {tx_hash}")]
    MissingMessage { tx_hash: TxHash },
    #[error("{count} MessageSent events in burn transaction {tx_hash}, expected exactly one")]
    AmbiguousMessage { tx_hash: TxHash, count: usize },
    #[error(transparent)]
    Attestation(#[from] AttestationError),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Evm(err) | Self::Wait(WaitError::Evm(err)) => evm_kind(err),
            Self::Wait(WaitError::Timeout { .. })
            | Self::Attestation(AttestationError::Timeout { .. }) => ErrorKind::Timeout,
            Self::Reverted { .. } => ErrorKind::Chain,
            Self::Amount(_) => ErrorKind::Validation,
            Self::MissingMessage { .. }
            | Self::AmbiguousMessage { .. }
            | Self::Attestation(AttestationError::InvalidPayload { .. }) => ErrorKind::Protocol,
            Self::Attestation(AttestationError::Http(_)) => ErrorKind::Network,
        }
    }
}

const fn evm_kind(err: &EvmError) -> ErrorKind {
    if err.is_configuration() {
        ErrorKind::Configuration
    } else {
        ErrorKind::Network
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Configuration(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("bridge failed at {step}: {source}")]
    Step {
        step: Step,
        progress: Box<BridgeProgress>,
        #[source]
        source: StepError,
    },
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Step { source, .. } => source.kind(),
        }
    }

    /// Partial progress, present once a run got past validation.
    pub fn progress(&self) -> Option<&BridgeProgress> {
        match self {
            Self::Step { progress, .. } => Some(progress.as_ref()),
            Self::Configuration(_) | Self::Validation(_) => None,
        }
    }
}
