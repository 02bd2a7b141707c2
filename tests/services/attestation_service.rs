//! Mock CCTP attestation service.
//!
//! Answers `GET /attestations/{digest}` the way the testnet service does.

use alloy::primitives::B256;
use httpmock::Mock;
use httpmock::prelude::*;
use serde_json::json;

pub struct AttestationServiceMock {
    server: MockServer,
}

impl AttestationServiceMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start_async().await,
        }
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// Every lookup of `digest` returns a completed attestation.
    pub fn complete(&self, digest: B256, attestation_hex: &str) -> Mock<'_> {
        let attestation_hex = attestation_hex.to_string();

        self.server.mock(|when, then| {
            when.method(GET).path(format!("/attestations/{digest}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "status": "complete",
                    "attestation": attestation_hex,
                }));
        })
    }

    /// Every lookup of `digest` reports the attestation as still pending.
    pub fn pending(&self, digest: B256) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET).path(format!("/attestations/{digest}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "status": "pending_confirmations",
                    "attestation": null,
                }));
        })
    }
}
