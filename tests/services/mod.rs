pub mod attestation_service;
