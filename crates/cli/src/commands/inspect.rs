use std::fs;

use anyhow::{Context, Result};
use clap::Args;
use harvest_sdk::{BundleDocument, ProposalClient};
use safe_service::SafeServiceClient;

use super::common::{parse_b256, GlobalArgs};

#[derive(Clone, Debug, Args)]
pub struct InspectArgs {
    /// Saved bundle to summarize.
    #[arg(long, value_name = "FILE", required_unless_present = "safe_tx_hash")]
    pub bundle: Option<String>,
    /// Look up a proposal on the Safe Transaction Service instead.
    #[arg(long, value_name = "HEX64", conflicts_with = "bundle")]
    pub safe_tx_hash: Option<String>,
}

pub fn run(global: &GlobalArgs, args: InspectArgs) -> Result<()> {
    if let Some(path) = &args.bundle {
        return inspect_bundle(path);
    }
    let config = global.load_config()?;
    let hash = parse_b256(args.safe_tx_hash.as_deref().unwrap_or_default(), "safe-tx-hash")?;
    let service = SafeServiceClient::new(&config.safe_service_url, config.http_timeout())?;
    let status = ProposalClient::new(service, &config).status(hash)?;

    println!("safe: {}", status.safe);
    println!("nonce: {}", status.nonce);
    println!("safeTxHash: {}", status.safe_tx_hash);
    match status.confirmations_required {
        Some(required) => println!("confirmations: {}/{required}", status.confirmations.len()),
        None => println!("confirmations: {}", status.confirmations.len()),
    }
    for owner in &status.confirmations {
        println!("  signed: {owner}");
    }
    println!("executed: {}", status.is_executed);
    Ok(())
}

fn inspect_bundle(path: &str) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let document = BundleDocument::parse(&raw)?;
    println!("kind: {}", document.kind());
    match document.chain_id() {
        Some(chain_id) => println!("chainId: {chain_id}"),
        None => println!("chainId: unknown"),
    }
    println!("transactions: {}", document.transaction_count());
    for (index, call) in document.calls()?.iter().enumerate() {
        println!(
            "  {index}: op={} to={} value={} data={} bytes",
            call.operation as u8,
            call.to,
            call.value,
            call.data.len()
        );
    }
    if let BundleDocument::MultisigUI(ui) = &document {
        println!("description: {}", ui.meta.description);
    }
    Ok(())
}
