//! Command-line entry point for testnet USDC bridging and payments.

use cctp_relay::cli;
use cctp_relay::setup_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (ctx, command) = cli::CliEnv::parse_and_convert()?;
    setup_tracing(&ctx.log_level);

    cli::run_command(ctx, command).await?;
    Ok(())
}
