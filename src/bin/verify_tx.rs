//! Check a single `recordPayment` transaction against an expected invoice
//! reference and amount, without touching any database.
//!
//! Usage:
//!   trustpay-verify-tx --contract 0x... --tx-hash 0x... --reference TP-... --amount 2500
//!
//! Prints the verification outcome as JSON and exits non-zero when the
//! transaction does not prove the payment.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trustpay_node::chain::{ChainVerifier, RECORD_PAYMENT_SIGNATURE};
use trustpay_node::config::ChainConfig;
use trustpay_node::types::{Amount, TxHash};

/// Verify a payment-proof transaction on chain.
#[derive(Parser, Debug)]
#[command(name = "trustpay-verify-tx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-RPC endpoint of the chain node.
    #[arg(long, default_value = "http://127.0.0.1:8545", env = "TRUSTPAY_RPC_URL")]
    rpc_url: String,

    /// Address of the payment-proof contract.
    #[arg(long, env = "TRUSTPAY_CONTRACT_ADDRESS")]
    contract: String,

    /// Transaction hash to check.
    #[arg(long)]
    tx_hash: String,

    /// Expected invoice reference.
    #[arg(long)]
    reference: String,

    /// Expected minimum amount.
    #[arg(long)]
    amount: String,

    /// Per-call timeout in seconds.
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args = Args::parse();
    let tx_hash = TxHash::parse(&args.tx_hash)?;
    let amount = Amount::parse(&args.amount)?;

    let verifier = ChainVerifier::from_config(&ChainConfig {
        rpc_url: args.rpc_url,
        contract_address: args.contract,
        function_signature: RECORD_PAYMENT_SIGNATURE.to_string(),
        timeout_secs: args.timeout_secs,
    })?;

    let outcome = verifier.verify(&tx_hash, &args.reference, &amount).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.to_json()?)?);

    Ok(if outcome.is_verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
