//! Single-chain USDC operations that sit beside the bridge: balance queries,
//! direct transfers, payment status lookups and payment links.

use alloy::primitives::{Address, TxHash};
use relay_bridge::ChainDescriptor;
use relay_evm::{Erc20Token, EvmError, InvalidAddress, Ledger, parse_address};
use relay_exact_decimal::{AmountError, NormalizedAmount, PositiveDecimal};
use serde::Serialize;
use tracing::{info, instrument};
use url::Url;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid recipient: {0}")]
    Recipient(#[from] InvalidAddress),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Evm(#[from] EvmError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatus {
    pub status: PaymentState,
    /// Absent while the transaction is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    pub txid: TxHash,
    pub chain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub chain: String,
    #[serde(serialize_with = "relay_evm::checksum::serialize")]
    pub account: Address,
    pub token: String,
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub txid: Option<TxHash>,
    pub simulated: bool,
    pub chain: String,
    #[serde(serialize_with = "relay_evm::checksum::serialize")]
    pub to: Address,
    pub amount: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "relay_evm::checksum::serialize_option"
    )]
    pub from: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paylink {
    pub id: String,
    pub amount: String,
    pub memo: String,
    pub currency: &'static str,
    pub network: &'static str,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaylinkRecord {
    pub paylink: Paylink,
}

/// Depth of a receipt mined at `receipt_block` when the chain head is at
/// `current_block`. The block a transaction lands in counts as one.
pub const fn confirmations(current_block: u64, receipt_block: u64) -> u64 {
    current_block.saturating_add(1).saturating_sub(receipt_block)
}

/// Looks up `tx_hash` once. A missing receipt is reported as pending.
#[instrument(skip(ledger), err)]
pub async fn payment_status<L: Ledger + ?Sized>(
    ledger: &L,
    chain: &str,
    tx_hash: TxHash,
) -> Result<PaymentStatus, PaymentError> {
    let Some(receipt) = ledger.receipt(tx_hash).await? else {
        return Ok(PaymentStatus {
            status: PaymentState::Pending,
            confirmations: None,
            txid: tx_hash,
            chain: chain.to_string(),
        });
    };

    let current_block = ledger.block_number().await?;

    Ok(PaymentStatus {
        status: if receipt.success {
            PaymentState::Confirmed
        } else {
            PaymentState::Failed
        },
        confirmations: Some(confirmations(current_block, receipt.block_number)),
        txid: tx_hash,
        chain: chain.to_string(),
    })
}

pub async fn balance<L: Erc20Token + ?Sized>(
    ledger: &L,
    descriptor: &ChainDescriptor,
    account: Address,
) -> Result<BalanceReport, PaymentError> {
    let decimals = ledger.decimals(descriptor.usdc).await?;
    let symbol = ledger.symbol(descriptor.usdc).await?;
    let raw = ledger.balance_of(descriptor.usdc, account).await?;

    Ok(BalanceReport {
        chain: descriptor.chain.clone(),
        account,
        token: symbol,
        balance: NormalizedAmount::from_base_units(raw, decimals)
            .decimal()
            .to_string(),
    })
}

/// Sends `amount` of the chain's USDC to `to`. Returns once the node accepts
/// the transaction; use [`payment_status`] to follow it.
#[instrument(skip(ledger, descriptor), fields(chain = %descriptor.chain), err)]
pub async fn transfer<L: Erc20Token + ?Sized>(
    ledger: &L,
    descriptor: &ChainDescriptor,
    to: &str,
    amount: &str,
    simulate: bool,
) -> Result<TransferOutcome, PaymentError> {
    let to = parse_address(to)?;
    let requested: PositiveDecimal = amount.parse()?;

    if simulate {
        return Ok(TransferOutcome {
            txid: None,
            simulated: true,
            chain: descriptor.chain.clone(),
            to,
            amount: requested.to_string(),
            from: None,
        });
    }

    let decimals = ledger.decimals(descriptor.usdc).await?;
    let normalized = requested.scale_to(decimals)?;

    let txid = ledger
        .transfer(descriptor.usdc, to, normalized.base_units())
        .await?;

    info!(%txid, %to, amount = %normalized, "USDC transfer submitted");

    Ok(TransferOutcome {
        txid: Some(txid),
        simulated: false,
        chain: descriptor.chain.clone(),
        to,
        amount: normalized.decimal().to_string(),
        from: Some(ledger.address()),
    })
}

/// Creates a payment link record. Nothing is stored or sent anywhere.
pub fn paylink(
    base_url: &Url,
    amount: &str,
    memo: Option<&str>,
) -> Result<PaylinkRecord, PaymentError> {
    let amount: PositiveDecimal = amount.parse()?;
    let id = Uuid::new_v4().simple().to_string();
    let url = format!("{}/{id}", base_url.as_str().trim_end_matches('/'));

    Ok(PaylinkRecord {
        paylink: Paylink {
            id,
            amount: amount.to_string(),
            memo: memo.unwrap_or_default().to_string(),
            currency: "USDC",
            network: "testnet",
            url,
        },
    })
}
