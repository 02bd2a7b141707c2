//! Turning a resolved [`ChainDescriptor`] into a live ledger client.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use relay_evm::local::LocalLedger;
use relay_evm::{CctpChain, EvmError, Ledger, SubmissionLocks};

use crate::registry::ChainDescriptor;

/// Opens a ledger client for a chain.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, descriptor: &ChainDescriptor) -> Result<Arc<dyn CctpChain>, EvmError>;
}

/// Connects over JSON-RPC, signing with one local key.
///
/// Every client it creates shares the same [`SubmissionLocks`], so
/// concurrent bridge requests from this key stay nonce-safe.
pub struct RpcConnector {
    signer: PrivateKeySigner,
    locks: Arc<SubmissionLocks>,
}

impl RpcConnector {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            locks: Arc::default(),
        }
    }

    pub fn with_locks(signer: PrivateKeySigner, locks: Arc<SubmissionLocks>) -> Self {
        Self { signer, locks }
    }

    pub const fn locks(&self) -> &Arc<SubmissionLocks> {
        &self.locks
    }
}

impl std::fmt::Debug for RpcConnector {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        dest.debug_struct("RpcConnector")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainConnector for RpcConnector {
    async fn connect(&self, descriptor: &ChainDescriptor) -> Result<Arc<dyn CctpChain>, EvmError> {
        let ledger = LocalLedger::connect(
            descriptor.rpc_url.clone(),
            descriptor.network_id,
            self.signer.clone(),
            Arc::clone(&self.locks),
        )
        .await?;

        Ok(Arc::new(ledger))
    }
}

/// Hands out pre-built clients keyed by network id.
#[derive(Default)]
pub struct StaticConnector {
    chains: HashMap<u64, Arc<dyn CctpChain>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chain(mut self, chain: Arc<dyn CctpChain>) -> Self {
        self.chains.insert(chain.chain_id(), chain);
        self
    }
}

#[async_trait]
impl ChainConnector for StaticConnector {
    async fn connect(&self, descriptor: &ChainDescriptor) -> Result<Arc<dyn CctpChain>, EvmError> {
        self.chains
            .get(&descriptor.network_id)
            .cloned()
            .ok_or_else(|| {
                alloy::transports::TransportErrorKind::custom_str(&format!(
                    "no client registered for network {}",
                    descriptor.network_id
                ))
                .into()
            })
    }
}
