use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use harvest_sdk::{
    BundleStore, Bundler, DigestSigner, FsBundleStore, LocalKeySigner, ProposalClient,
    ProposalResult, SafeServiceApi,
};
use safe_service::SafeServiceClient;

use super::common::{parse_address, require, DryRunProvider, DryRunService, GlobalArgs};

#[derive(Clone, Debug, Args)]
pub struct ProposeArgs {
    /// Saved multisig bundle (UI or CLI flavor).
    #[arg(long, value_name = "FILE")]
    pub bundle: String,
    #[arg(long, value_name = "HEX40")]
    pub safe: String,
    /// Owner private key.
    #[arg(long, value_name = "HEX64", env = "HARVEST_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    /// Nonce reported by the offline service during a dry run.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,
    /// Print the request instead of posting it.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

pub fn run(global: &GlobalArgs, args: ProposeArgs) -> Result<()> {
    let config = global.load_config()?;
    let safe = parse_address(&args.safe, "safe")?;
    let store = Arc::new(FsBundleStore::new(config.output_dir.clone()));
    let document = store
        .load(&args.bundle)
        .with_context(|| format!("loading bundle {}", args.bundle))?;
    let signer = LocalKeySigner::from_hex(require(&args.private_key, "--private-key")?)?;

    // Proposing never touches the provider.
    let bundler = Bundler::new(
        Arc::new(DryRunProvider::new(config.chain_id)),
        store,
        config.clone(),
    );

    if args.dry_run {
        let service = DryRunService::new(args.nonce);
        let client = ProposalClient::new(service.clone(), &config);
        let outcome = submit(&bundler, safe, &document, &client, &signer);
        for proposal in service.proposals() {
            println!("dry-run request: {}", serde_json::to_string(&proposal)?);
        }
        outcome
    } else {
        let service = SafeServiceClient::new(&config.safe_service_url, config.http_timeout())?;
        let client = ProposalClient::new(service, &config);
        submit(&bundler, safe, &document, &client, &signer)
    }
}

fn submit<S: SafeServiceApi>(
    bundler: &Bundler,
    safe: alloy_primitives::Address,
    document: &harvest_sdk::BundleDocument,
    client: &ProposalClient<S>,
    signer: &dyn DigestSigner,
) -> Result<()> {
    let result = bundler.propose(safe, document, client, signer)?;
    print_result(&result)
}

pub fn print_result(result: &ProposalResult) -> Result<()> {
    println!("safeTxHash: {}", result.safe_tx_hash);
    println!("nonce: {}", result.nonce);
    println!("accepted: {}", result.accepted);
    if result.used_fallback {
        println!("fallback digest: used");
    }
    println!("url: {}", result.tracking_url);
    match &result.error {
        Some(err) if !result.accepted => bail!("proposal rejected ({}): {err}", err.code()),
        _ => Ok(()),
    }
}
