//! The bridge state machine.

use alloy::primitives::{Address, Bytes, TxHash, keccak256};
use alloy::sol_types::SolEvent;
use relay_evm::bindings::IMessageTransmitter;
use relay_evm::{CctpChain, DepositForBurn, PollingConfig, Receipt, await_receipt, parse_address};
use relay_exact_decimal::PositiveDecimal;
use tracing::{info, instrument, warn};

use crate::attestation::AttestationPoller;
use crate::connector::ChainConnector;
use crate::registry::{ChainDescriptor, ChainRegistry};
use crate::{
    BridgeError, BridgeOutcome, BridgeProgress, BridgeReceipt, BridgeRequest, Role,
    SimulatedBridge, Step, StepError, ValidationError,
};

/// A request that passed validation. No network call has happened yet.
#[derive(Debug, Clone)]
struct ValidatedRequest {
    source: ChainDescriptor,
    destination: ChainDescriptor,
    amount: PositiveDecimal,
    recipient: Option<Address>,
}

struct Failed {
    step: Step,
    source: StepError,
}

trait AtStep<T> {
    fn at(self, step: Step) -> Result<T, Failed>;
}

impl<T, E> AtStep<T> for Result<T, E>
where
    E: Into<StepError>,
{
    fn at(self, step: Step) -> Result<T, Failed> {
        self.map_err(|err| Failed {
            step,
            source: err.into(),
        })
    }
}

pub struct BridgeOrchestrator<C> {
    registry: ChainRegistry,
    connector: C,
    attestations: AttestationPoller,
    receipts: PollingConfig,
}

impl<C> BridgeOrchestrator<C>
where
    C: ChainConnector,
{
    pub fn new(
        registry: ChainRegistry,
        connector: C,
        attestations: AttestationPoller,
        receipts: PollingConfig,
    ) -> Self {
        Self {
            registry,
            connector,
            attestations,
            receipts,
        }
    }

    /// Runs one bridge request end to end.
    ///
    /// Validation and configuration failures are returned before any network
    /// call. A simulated request stops after validation.
    #[instrument(
        skip(self, request),
        fields(from = %request.from, to = %request.to, amount = %request.amount),
        err
    )]
    pub async fn bridge(&self, request: &BridgeRequest) -> Result<BridgeOutcome, BridgeError> {
        let validated = self.validate(request)?;

        if request.simulate {
            info!("Simulated bridge request, nothing submitted");

            return Ok(BridgeOutcome::Simulated(SimulatedBridge {
                request_id: None,
                simulated: true,
                from: validated.source.chain,
                to: validated.destination.chain,
                amount: validated.amount.to_string(),
                recipient: validated.recipient,
            }));
        }

        let mut progress = BridgeProgress::new(&validated.source.chain, &validated.destination.chain);

        match self.execute(&validated, &mut progress).await {
            Ok(receipt) => Ok(BridgeOutcome::Completed(receipt)),
            Err(Failed { step, source }) => {
                warn!(
                    %step,
                    kind = %source.kind(),
                    approve_txid = ?progress.approve_txid,
                    burn_txid = ?progress.burn_txid,
                    mint_txid = ?progress.mint_txid,
                    request_id = ?progress.request_id,
                    "Bridge stopped before completion"
                );

                Err(BridgeError::Step {
                    step,
                    progress: Box::new(progress),
                    source,
                })
            }
        }
    }

    fn validate(&self, request: &BridgeRequest) -> Result<ValidatedRequest, BridgeError> {
        if request.from.trim() == request.to.trim() {
            return Err(ValidationError::SameChain {
                chain: request.from.trim().to_string(),
            }
            .into());
        }

        let source = self.registry.resolve(request.from.trim())?;
        let destination = self.registry.resolve(request.to.trim())?;

        let recipient = request
            .recipient
            .as_deref()
            .map(parse_address)
            .transpose()
            .map_err(ValidationError::from)?;

        let amount: PositiveDecimal = request.amount.parse().map_err(ValidationError::from)?;

        Ok(ValidatedRequest {
            source,
            destination,
            amount,
            recipient,
        })
    }

    async fn execute(
        &self,
        request: &ValidatedRequest,
        progress: &mut BridgeProgress,
    ) -> Result<BridgeReceipt, Failed> {
        let ValidatedRequest {
            source: source_chain,
            destination: destination_chain,
            ..
        } = request;

        let source = self
            .connector
            .connect(source_chain)
            .await
            .at(Step::Normalize)?;
        let destination = self
            .connector
            .connect(destination_chain)
            .await
            .at(Step::Normalize)?;

        let decimals = source
            .decimals(source_chain.usdc)
            .await
            .at(Step::Normalize)?;
        let amount = request.amount.scale_to(decimals).at(Step::Normalize)?;
        let recipient = request.recipient.unwrap_or_else(|| source.address());

        progress.amount_base_units = Some(amount.base_units());
        progress.recipient = Some(recipient);

        info!(
            amount = %amount,
            base_units = %amount.base_units(),
            decimals,
            %recipient,
            "Amount normalized"
        );

        let approve_tx = source
            .approve(
                source_chain.usdc,
                source_chain.token_messenger,
                amount.base_units(),
            )
            .await
            .at(Step::Approve)?;
        progress.record(source_chain, approve_tx, Role::Approve);
        self.settle(source.as_ref(), approve_tx, progress)
            .await
            .at(Step::Approve)?;

        let burn = DepositForBurn::new(
            amount.base_units(),
            destination_chain.domain,
            recipient,
            source_chain.usdc,
        );
        let burn_tx = source
            .deposit_for_burn(source_chain.token_messenger, burn)
            .await
            .at(Step::Burn)?;
        progress.record(source_chain, burn_tx, Role::Burn);
        let burn_receipt = self
            .settle(source.as_ref(), burn_tx, progress)
            .await
            .at(Step::Burn)?;

        let message = extract_message(&burn_receipt).at(Step::ExtractProof)?;
        let request_id = keccak256(&message);
        progress.request_id = Some(request_id);

        info!(%request_id, %burn_tx, message_len = message.len(), "Burn message extracted");

        let attestation = self
            .attestations
            .await_attestation(request_id)
            .await
            .at(Step::Attest)?;

        let mint_tx = destination
            .receive_message(
                destination_chain.message_transmitter,
                message,
                attestation.attestation,
            )
            .await
            .at(Step::Mint)?;
        progress.record(destination_chain, mint_tx, Role::Mint);
        self.settle(destination.as_ref(), mint_tx, progress)
            .await
            .at(Step::Mint)?;

        info!(%request_id, %approve_tx, %burn_tx, %mint_tx, "Bridge complete");

        Ok(BridgeReceipt {
            request_id,
            simulated: false,
            from: source_chain.chain.clone(),
            to: destination_chain.chain.clone(),
            amount: amount.decimal().to_string(),
            amount_base_units: amount.base_units(),
            recipient,
            approve_txid: approve_tx,
            burn_txid: burn_tx,
            mint_txid: mint_tx,
            transactions: progress.transactions.clone(),
        })
    }

    /// Waits for `tx_hash` and records its receipt. A revert is an error.
    async fn settle(
        &self,
        ledger: &dyn CctpChain,
        tx_hash: TxHash,
        progress: &mut BridgeProgress,
    ) -> Result<Receipt, StepError> {
        let receipt = await_receipt(ledger, tx_hash, &self.receipts).await?;
        progress.attach_receipt(&receipt);

        if !receipt.success {
            return Err(StepError::Reverted { tx_hash });
        }

        Ok(receipt)
    }
}

/// Finds the single `MessageSent` payload in a burn receipt.
fn extract_message(receipt: &Receipt) -> Result<Bytes, StepError> {
    let mut messages: Vec<Bytes> = receipt
        .logs
        .iter()
        .filter_map(|log| IMessageTransmitter::MessageSent::decode_log(log).ok())
        .map(|event| event.data.message)
        .collect();

    match messages.len() {
        0 => Err(StepError::MissingMessage {
            tx_hash: receipt.tx_hash,
        }),
        1 => Ok(messages.remove(0)),
        count => Err(StepError::AmbiguousMessage {
            tx_hash: receipt.tx_hash,
            count,
        }),
    }
}
