//! Testnet USDC bridging over Circle CCTP.
//!
//! The heavy lifting lives in the workspace crates: `relay-evm` talks to
//! chains, `relay-bridge` runs the burn, attest and mint sequence, and
//! `relay-exact-decimal` turns user amounts into base units. This crate
//! wires them to configuration files and a command line, and adds the
//! single-chain payment helpers in [`payment`].

pub mod cli;
pub mod config;
pub mod payment;

pub use config::{ConfigError, Ctx, Env, LogLevel, setup_tracing};
