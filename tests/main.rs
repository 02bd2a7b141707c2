mod services;

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256, address, keccak256};
use cctp_relay::Ctx;
use cctp_relay::payment::{self, PaymentState};
use relay_bridge::{
    BridgeError, BridgeOrchestrator, BridgeOutcome, BridgeRequest, ErrorKind, StaticConnector,
    Step,
};
use relay_evm::mock::{MockLedger, Submission, SubmissionKind};

use services::attestation_service::AttestationServiceMock;

const SECRETS: &str =
    "evm_private_key = \"0x0000000000000000000000000000000000000000000000000000000000000001\"\n";

const BASE_USDC: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
const ARBITRUM_USDC: Address = address!("0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d");

fn config(attestation_base_url: &str) -> String {
    format!(
        r#"
        testnet = true
        log_level = "debug"

        [attestation]
        base_url = "{attestation_base_url}"
        poll_interval_secs = 1
        timeout_secs = 2

        [receipts]
        poll_interval_secs = 1
        timeout_secs = 5

        [chains.base-sepolia]
        rpc_url = "http://127.0.0.1:1"

        [chains.arbitrum-sepolia]
        rpc_url = "http://127.0.0.1:2"
        "#
    )
}

fn burn_message() -> Bytes {
    Bytes::from_static(b"burn message: 2 USDC from domain 6 to domain 3")
}

struct Chains {
    source: Arc<MockLedger>,
    destination: Arc<MockLedger>,
}

impl Chains {
    fn new(ctx: &Ctx) -> Self {
        let messenger = ctx.resolve("base-sepolia").unwrap().token_messenger;

        Self {
            source: Arc::new(
                MockLedger::new(84532)
                    .with_address(ctx.signer_address())
                    .with_balance(BASE_USDC, ctx.signer_address(), U256::from(10_000_000u64))
                    .with_pending_polls(1)
                    .with_message_sent(messenger, burn_message()),
            ),
            destination: Arc::new(
                MockLedger::new(421_614).with_address(ctx.signer_address()),
            ),
        }
    }

    fn orchestrator(&self, ctx: &Ctx) -> BridgeOrchestrator<StaticConnector> {
        let connector = StaticConnector::new()
            .with_chain(self.source.clone())
            .with_chain(self.destination.clone());

        BridgeOrchestrator::new(
            ctx.registry.clone(),
            connector,
            ctx.attestation_poller().unwrap(),
            ctx.receipt_polling,
        )
    }
}

fn request(recipient: Option<Address>) -> BridgeRequest {
    BridgeRequest {
        from: "base-sepolia".to_string(),
        to: "arbitrum-sepolia".to_string(),
        amount: "2".to_string(),
        recipient: recipient.map(|address| address.to_string()),
        simulate: false,
    }
}

#[tokio::test]
async fn bridges_from_configuration_end_to_end() {
    let service = AttestationServiceMock::start().await;
    let digest = keccak256(burn_message());
    let attestation = service.complete(digest, "0x0102030405");

    let ctx = Ctx::from_toml(&config(&service.base_url()), SECRETS).unwrap();
    let chains = Chains::new(&ctx);

    let outcome = chains
        .orchestrator(&ctx)
        .bridge(&request(None))
        .await
        .unwrap();

    let BridgeOutcome::Completed(receipt) = outcome else {
        panic!("expected a completed bridge, got {outcome:?}");
    };

    attestation.assert_hits(1);
    assert_eq!(receipt.request_id, digest);
    assert_eq!(receipt.recipient, ctx.signer_address());
    assert_eq!(receipt.amount_base_units, U256::from(2_000_000u64));
    assert_eq!(
        chains.source.submission_kinds(),
        vec![SubmissionKind::Approve, SubmissionKind::DepositForBurn]
    );

    let transmitter = ctx.resolve("arbitrum-sepolia").unwrap().message_transmitter;
    assert_eq!(
        chains.destination.submissions(),
        vec![Submission::ReceiveMessage {
            transmitter,
            message: burn_message(),
            attestation: Bytes::from_static(&[1, 2, 3, 4, 5]),
        }]
    );

    let status = payment::payment_status(
        chains.destination.as_ref(),
        "arbitrum-sepolia",
        receipt.mint_txid,
    )
    .await
    .unwrap();
    assert_eq!(status.status, PaymentState::Confirmed);
    assert_eq!(status.confirmations, Some(1));
}

#[tokio::test]
async fn attestation_timeout_reports_burned_funds() {
    let service = AttestationServiceMock::start().await;
    let digest = keccak256(burn_message());
    let pending = service.pending(digest);

    let ctx = Ctx::from_toml(&config(&service.base_url()), SECRETS).unwrap();
    let chains = Chains::new(&ctx);

    let error = chains
        .orchestrator(&ctx)
        .bridge(&request(Some(address!("0x000000000000000000000000000000000000dEaD"))))
        .await
        .unwrap_err();

    assert!(pending.hits() >= 2);
    assert_eq!(error.kind(), ErrorKind::Timeout);

    let BridgeError::Step { step, progress, .. } = error else {
        panic!("expected a step failure");
    };
    assert_eq!(step, Step::Attest);
    assert!(progress.approve_txid.is_some());
    assert!(progress.burn_txid.is_some());
    assert_eq!(progress.mint_txid, None);
    assert_eq!(progress.request_id, Some(digest));
    assert!(chains.destination.submissions().is_empty());
}

#[tokio::test]
async fn transfers_on_a_single_chain() {
    let ctx = Ctx::from_toml(&config("http://127.0.0.1:3"), SECRETS).unwrap();
    let descriptor = ctx.resolve("arbitrum-sepolia").unwrap();
    let payee = address!("0x000000000000000000000000000000000000dEaD");

    let ledger = MockLedger::new(421_614)
        .with_address(ctx.signer_address())
        .with_balance(ARBITRUM_USDC, ctx.signer_address(), U256::from(3_000_000u64));

    let outcome = payment::transfer(&ledger, &descriptor, &payee.to_string(), "0.75", false)
        .await
        .unwrap();
    assert_eq!(outcome.from, Some(ctx.signer_address()));

    let payer = payment::balance(&ledger, &descriptor, ctx.signer_address())
        .await
        .unwrap();
    let received = payment::balance(&ledger, &descriptor, payee).await.unwrap();

    assert_eq!(payer.balance, "2.25");
    assert_eq!(received.balance, "0.75");
}
