//! EVM ledger access for the CCTP relay.
//!
//! This crate exposes one typed trait per contract the bridge touches:
//!
//! - [`Ledger`]: signer address, receipt lookup and current block height.
//! - [`Erc20Token`]: token views (`decimals`, `symbol`, `balanceOf`,
//!   `allowance`) and submissions (`transfer`, `approve`).
//! - [`BurnMessenger`]: `TokenMessenger.depositForBurn`.
//! - [`MintTransmitter`]: `MessageTransmitter.receiveMessage`.
//!
//! [`CctpChain`] bundles all four so callers can hold an
//! `Arc<dyn CctpChain>` per chain. [`local::LocalLedger`] implements them
//! over JSON-RPC with a local private key. [`mock::MockLedger`] (feature
//! `mock`) implements them in memory.
//!
//! Submissions return as soon as the node accepts the transaction. Use
//! [`receipt::await_receipt`] to wait for finality.

use std::str::FromStr;

use alloy::primitives::{Address, B256, Bytes, Log, TxHash, U256};
use alloy::rpc::types::TransactionReceipt;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

pub mod bindings;
pub mod checksum;
pub mod local;
pub mod nonce;
pub mod receipt;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use nonce::SubmissionLocks;
pub use receipt::{PollingConfig, WaitError, await_receipt};

/// Errors that can occur while talking to an EVM chain.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("endpoint {url} unreachable: {source}")]
    Unreachable {
        url: Url,
        #[source]
        source: RpcError<TransportErrorKind>,
    },
    #[error("endpoint {url} serves chain id {actual}, expected {expected}")]
    ChainIdMismatch { url: Url, expected: u64, actual: u64 },
    #[error("transport error: {0}")]
    Transport(#[from] RpcError<TransportErrorKind>),
    #[error("contract error: {0}")]
    Contract(#[from] alloy::contract::Error),
}

impl EvmError {
    /// True when the failure reflects static misconfiguration rather than a
    /// network condition.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::ChainIdMismatch { .. })
    }
}

/// Settled outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
    #[serde(skip)]
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Converts an RPC receipt. Returns `None` when the receipt has no block
    /// number yet, which callers treat the same as "not found".
    pub fn from_rpc(receipt: &TransactionReceipt) -> Option<Self> {
        Some(Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number?,
            success: receipt.status(),
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        })
    }
}

/// Arguments to `TokenMessenger.depositForBurn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositForBurn {
    pub amount: U256,
    pub destination_domain: u32,
    /// Recipient on the destination chain, left-padded to 32 bytes.
    pub mint_recipient: B256,
    pub burn_token: Address,
}

impl DepositForBurn {
    pub fn new(
        amount: U256,
        destination_domain: u32,
        recipient: Address,
        burn_token: Address,
    ) -> Self {
        Self {
            amount,
            destination_domain,
            mint_recipient: B256::left_padding_from(recipient.as_slice()),
            burn_token,
        }
    }
}

/// Chain-level access shared by every contract client.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Native network id (EIP-155 chain id).
    fn chain_id(&self) -> u64;

    /// Address that signs this client's submissions.
    fn address(&self) -> Address;

    /// Looks up a receipt. `Ok(None)` means the transaction is not mined (or
    /// not known) yet, which is not an error.
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>, EvmError>;

    async fn block_number(&self) -> Result<u64, EvmError>;
}

/// ERC-20 token contract.
#[async_trait]
pub trait Erc20Token: Ledger {
    async fn decimals(&self, token: Address) -> Result<u8, EvmError>;

    async fn symbol(&self, token: Address) -> Result<String, EvmError>;

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256, EvmError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, EvmError>;

    async fn transfer(&self, token: Address, to: Address, amount: U256)
    -> Result<TxHash, EvmError>;

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, EvmError>;
}

/// CCTP `TokenMessenger` contract on the source chain.
#[async_trait]
pub trait BurnMessenger: Ledger {
    async fn deposit_for_burn(
        &self,
        messenger: Address,
        burn: DepositForBurn,
    ) -> Result<TxHash, EvmError>;
}

/// CCTP `MessageTransmitter` contract on the destination chain.
#[async_trait]
pub trait MintTransmitter: Ledger {
    async fn receive_message(
        &self,
        transmitter: Address,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<TxHash, EvmError>;
}

/// Everything the bridge needs from one chain.
pub trait CctpChain: Erc20Token + BurnMessenger + MintTransmitter {}

impl<T> CctpChain for T where T: Erc20Token + BurnMessenger + MintTransmitter {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {value:?}")]
pub struct InvalidAddress {
    pub value: String,
}

/// Parses an EVM address.
///
/// All-lowercase and all-uppercase hex is accepted as is. Mixed case must be
/// a valid EIP-55 checksum.
pub fn parse_address(value: &str) -> Result<Address, InvalidAddress> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());

    let parsed = if has_upper && has_lower {
        Address::parse_checksummed(trimmed, None).ok()
    } else {
        Address::from_str(trimmed).ok()
    };

    parsed.ok_or_else(|| InvalidAddress {
        value: value.to_string(),
    })
}
