//! JSON-RPC ledger client signing with a local private key.
//!
//! `LocalLedger` wraps an alloy provider with an embedded `EthereumWallet`.
//! Submissions are serialized per `(chain_id, address)` through
//! [`SubmissionLocks`] and carry an explicit pending-state nonce, so several
//! clients sharing one key never race each other for a nonce.

use std::sync::Arc;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::bindings::{IERC20, IMessageTransmitter, ITokenMessenger};
use crate::{
    BurnMessenger, DepositForBurn, Erc20Token, EvmError, Ledger, MintTransmitter, Receipt,
    SubmissionLocks,
};

/// Ledger client bound to one chain and one signing key.
pub struct LocalLedger {
    provider: DynProvider,
    rpc_url: Url,
    chain_id: u64,
    address: Address,
    locks: Arc<SubmissionLocks>,
}

impl std::fmt::Debug for LocalLedger {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        dest.debug_struct("LocalLedger")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("chain_id", &self.chain_id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalLedger {
    /// Connects to `rpc_url` and checks that it serves `expected_chain_id`.
    ///
    /// Fails with [`EvmError::Unreachable`] when the endpoint does not answer
    /// and [`EvmError::ChainIdMismatch`] when it answers for another chain.
    pub async fn connect(
        rpc_url: Url,
        expected_chain_id: u64,
        signer: PrivateKeySigner,
        locks: Arc<SubmissionLocks>,
    ) -> Result<Self, EvmError> {
        let address = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url.clone())
            .erased();

        let actual = provider
            .get_chain_id()
            .await
            .map_err(|source| EvmError::Unreachable {
                url: rpc_url.clone(),
                source,
            })?;

        if actual != expected_chain_id {
            return Err(EvmError::ChainIdMismatch {
                url: rpc_url,
                expected: expected_chain_id,
                actual,
            });
        }

        debug!(%rpc_url, chain_id = actual, %address, "Connected to chain");

        Ok(Self {
            provider,
            rpc_url,
            chain_id: actual,
            address,
            locks,
        })
    }

    async fn submit(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError> {
        let _guard = self.locks.acquire(self.chain_id, self.address).await;

        let nonce = self
            .provider
            .get_transaction_count(self.address)
            .pending()
            .await?;

        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(contract)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);

        let pending = self.provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();

        info!(
            %tx_hash,
            %contract,
            nonce,
            chain_id = self.chain_id,
            note,
            "Transaction submitted"
        );

        Ok(tx_hash)
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>, EvmError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.as_ref().and_then(Receipt::from_rpc))
    }

    async fn block_number(&self) -> Result<u64, EvmError> {
        Ok(self.provider.get_block_number().await?)
    }
}

#[async_trait]
impl Erc20Token for LocalLedger {
    async fn decimals(&self, token: Address) -> Result<u8, EvmError> {
        Ok(IERC20::new(token, &self.provider).decimals().call().await?)
    }

    async fn symbol(&self, token: Address) -> Result<String, EvmError> {
        Ok(IERC20::new(token, &self.provider).symbol().call().await?)
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256, EvmError> {
        Ok(IERC20::new(token, &self.provider)
            .balanceOf(account)
            .call()
            .await?)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, EvmError> {
        Ok(IERC20::new(token, &self.provider)
            .allowance(owner, spender)
            .call()
            .await?)
    }

    async fn transfer(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, EvmError> {
        let calldata = IERC20::transferCall { to, amount }.abi_encode();
        self.submit(token, calldata.into(), "ERC20 transfer").await
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, EvmError> {
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        self.submit(token, calldata.into(), "ERC20 approve").await
    }
}

#[async_trait]
impl BurnMessenger for LocalLedger {
    async fn deposit_for_burn(
        &self,
        messenger: Address,
        burn: DepositForBurn,
    ) -> Result<TxHash, EvmError> {
        let calldata = ITokenMessenger::depositForBurnCall {
            amount: burn.amount,
            destinationDomain: burn.destination_domain,
            mintRecipient: burn.mint_recipient,
            burnToken: burn.burn_token,
        }
        .abi_encode();

        self.submit(messenger, calldata.into(), "CCTP depositForBurn")
            .await
    }
}

#[async_trait]
impl MintTransmitter for LocalLedger {
    async fn receive_message(
        &self,
        transmitter: Address,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<TxHash, EvmError> {
        let calldata = IMessageTransmitter::receiveMessageCall {
            message,
            attestation,
        }
        .abi_encode();

        self.submit(transmitter, calldata.into(), "CCTP receiveMessage")
            .await
    }
}
