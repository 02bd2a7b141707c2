//! Command-line surface. Every command prints one pretty JSON document.

use std::io::Write;

use alloy::primitives::TxHash;
use clap::{Parser, Subcommand};
use relay_bridge::{BridgeError, BridgeProgress, BridgeRequest, ChainConnector, ErrorKind, Step};
use relay_evm::parse_address;
use serde::Serialize;
use tracing::info;

use crate::config::{Ctx, Env};
use crate::payment;

#[derive(Debug, Parser)]
#[command(name = "cctp-relay")]
#[command(about = "Move testnet USDC between chains over Circle CCTP")]
#[command(version)]
pub struct CliEnv {
    #[clap(flatten)]
    env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

impl CliEnv {
    /// Parses the command line and loads the files it points at.
    pub fn parse_and_convert() -> anyhow::Result<(Ctx, Commands)> {
        let cli = Self::parse();
        let ctx = Ctx::load_files(&cli.env.config, &cli.env.secrets)?;
        Ok((ctx, cli.command))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Burn USDC on one chain and mint it on another
    Bridge {
        /// Source chain (e.g. base-sepolia)
        #[arg(long)]
        from: String,
        /// Destination chain (e.g. arbitrum-sepolia)
        #[arg(long)]
        to: String,
        /// Amount in USDC (e.g. 1.5)
        #[arg(long)]
        amount: String,
        /// Destination account, defaults to the signer
        #[arg(long)]
        recipient: Option<String>,
        /// Validate and print without submitting anything
        #[arg(long)]
        simulate: bool,
    },
    /// Show the USDC balance of an account
    Balance {
        #[arg(long)]
        chain: String,
        /// Account to query, defaults to the signer
        #[arg(long)]
        account: Option<String>,
    },
    /// Send USDC to another account on the same chain
    Transfer {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        simulate: bool,
    },
    /// Show whether a transaction is pending, confirmed or failed
    Status {
        #[arg(long = "tx-hash")]
        tx_hash: TxHash,
        #[arg(long, default_value = "base-sepolia")]
        chain: String,
    },
    /// Look up a CCTP attestation by request id
    Attestation {
        /// Message digest, with or without 0x prefix
        #[arg(long = "request-id")]
        request_id: String,
    },
    /// Create a payment link
    Paylink {
        #[arg(long)]
        amount: String,
        #[arg(long)]
        memo: Option<String>,
    },
}

/// Printed in place of a receipt when a bridge run fails.
#[derive(Debug, Serialize)]
struct BridgeFailure<'a> {
    error: String,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<&'a BridgeProgress>,
}

impl<'a> From<&'a BridgeError> for BridgeFailure<'a> {
    fn from(error: &'a BridgeError) -> Self {
        let step = match error {
            BridgeError::Step { step, .. } => Some(*step),
            BridgeError::Configuration(_) | BridgeError::Validation(_) => None,
        };

        Self {
            error: error.to_string(),
            kind: error.kind(),
            step,
            progress: error.progress(),
        }
    }
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    run_command_with_writers(&ctx, command, &mut std::io::stdout()).await
}

pub(crate) async fn run_command_with_writers<W: Write>(
    ctx: &Ctx,
    command: Commands,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Bridge {
            from,
            to,
            amount,
            recipient,
            simulate,
        } => {
            let request = BridgeRequest {
                from,
                to,
                amount,
                recipient,
                simulate,
            };
            bridge_command(ctx, &request, stdout).await?;
        }
        Commands::Balance { chain, account } => {
            let descriptor = ctx.resolve(&chain)?;
            let account = match account {
                Some(account) => parse_address(&account)?,
                None => ctx.signer_address(),
            };
            let ledger = ctx.connector().connect(&descriptor).await?;
            let report = payment::balance(ledger.as_ref(), &descriptor, account).await?;
            print_json(stdout, &report)?;
        }
        Commands::Transfer {
            chain,
            to,
            amount,
            simulate,
        } => {
            let descriptor = ctx.resolve(&chain)?;
            let ledger = ctx.connector().connect(&descriptor).await?;
            let outcome =
                payment::transfer(ledger.as_ref(), &descriptor, &to, &amount, simulate).await?;
            print_json(stdout, &outcome)?;
        }
        Commands::Status { tx_hash, chain } => {
            let descriptor = ctx.resolve(&chain)?;
            let ledger = ctx.connector().connect(&descriptor).await?;
            let status = payment::payment_status(ledger.as_ref(), &chain, tx_hash).await?;
            print_json(stdout, &status)?;
        }
        Commands::Attestation { request_id } => {
            let lookup = ctx.attestation_poller()?.status(&request_id).await?;
            print_json(stdout, &lookup)?;
        }
        Commands::Paylink { amount, memo } => {
            let record = payment::paylink(&ctx.paylink_base_url, &amount, memo.as_deref())?;
            print_json(stdout, &record)?;
        }
    }

    info!("CLI operation completed successfully");
    Ok(())
}

async fn bridge_command<W: Write>(
    ctx: &Ctx,
    request: &BridgeRequest,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let orchestrator = ctx.orchestrator()?;

    match orchestrator.bridge(request).await {
        Ok(outcome) => print_json(stdout, &outcome),
        Err(error) => {
            print_json(stdout, &BridgeFailure::from(&error))?;
            Err(error.into())
        }
    }
}

fn print_json<W: Write, T: Serialize>(stdout: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
