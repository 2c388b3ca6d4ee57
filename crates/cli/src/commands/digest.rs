use std::fs;

use anyhow::{bail, Context, Result};
use clap::Args;
use harvest_sdk::{multisend, BundleDocument, SafeTransaction};

use super::common::{format_hex, parse_address, GlobalArgs};

/// Offline: recomputes the Safe digest a proposal of `bundle` would carry.
#[derive(Clone, Debug, Args)]
pub struct DigestArgs {
    #[arg(long, value_name = "FILE")]
    pub bundle: String,
    #[arg(long, value_name = "HEX40")]
    pub safe: String,
    #[arg(long)]
    pub nonce: u64,
}

pub fn run(global: &GlobalArgs, args: DigestArgs) -> Result<()> {
    let config = global.load_config()?;
    let safe = parse_address(&args.safe, "safe")?;
    let raw = fs::read_to_string(&args.bundle)
        .with_context(|| format!("reading {}", args.bundle))?;
    let document = BundleDocument::parse(&raw)?;
    if !document.kind().is_multisig() {
        bail!("{} is a direct bundle; only multisig bundles have a Safe digest", args.bundle);
    }
    let chain_id = document.chain_id().unwrap_or(config.chain_id);

    let call = multisend::batch(config.multisend_address, &document.calls()?)?;
    let tx = SafeTransaction::from_call(&call, args.nonce);
    let digest = tx.digest(chain_id, safe);

    println!("chainId: {chain_id}");
    println!("to: {}", tx.to);
    println!("operation: {}", tx.operation as u8);
    println!("data: {}", format_hex(&tx.data));
    println!("nonce: {}", args.nonce);
    println!("domainSeparator: {}", digest.domain_separator);
    println!("structHash: {}", digest.struct_hash);
    println!("safeTxHash: {}", digest.hash);
    Ok(())
}
