use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Args;
use harvest_sdk::{
    describe, AlloyHttpTransport, BundleTarget, Bundler, ClaimInput, DigestSigner,
    FsBundleStore, LocalKeySigner, OutputKind, ProposalClient, ReadProvider,
    RunRequest, SafeServiceApi,
};
use safe_service::SafeServiceClient;

use super::common::{parse_address, require, DryRunProvider, DryRunService, GlobalArgs};

#[derive(Clone, Debug, Args)]
pub struct BuildArgs {
    /// Claim input JSON (`rewards`, `boosts`, `swaps`).
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,
    /// Wallet label used in the bundle name and file name.
    #[arg(long)]
    pub wallet_name: String,
    /// Executing account: the EOA for direct bundles, the Safe for multisig ones.
    #[arg(long, value_name = "HEX40")]
    pub address: String,
    /// Claim recipient; defaults to `--address`.
    #[arg(long, value_name = "HEX40")]
    pub recipient: Option<String>,
    /// Owner shown as the bundle creator in the Safe UI file.
    #[arg(long, value_name = "HEX40")]
    pub owner: Option<String>,
    #[arg(long, default_value = "direct", value_parser = parse_output)]
    pub output: OutputKind,
    /// Propose the bundle to the Safe Transaction Service after saving it.
    #[arg(long, default_value_t = false)]
    pub propose: bool,
    /// Owner private key used with `--propose`.
    #[arg(long, value_name = "HEX64", env = "HARVEST_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    /// Nonce reported by the offline service during a dry run.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,
    /// Skip RPC and the service: gas uses fallbacks, proposals are printed.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

pub fn parse_output(value: &str) -> std::result::Result<OutputKind, String> {
    value.parse().map_err(|err: harvest_sdk::BundleError| err.to_string())
}

pub fn run(global: &GlobalArgs, args: BuildArgs) -> Result<()> {
    let config = global.load_config()?;
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let input: ClaimInput = serde_json::from_str(&raw).context("parsing claim input")?;

    let address = parse_address(&args.address, "address")?;
    let recipient = args
        .recipient
        .as_deref()
        .map(|value| parse_address(value, "recipient"))
        .transpose()?;
    let owner = args
        .owner
        .as_deref()
        .map(|value| parse_address(value, "owner"))
        .transpose()?;
    if args.propose && !args.output.is_multisig() {
        bail!("--propose needs a multisig output kind");
    }

    let provider: Arc<dyn ReadProvider> = if args.dry_run {
        Arc::new(DryRunProvider::new(config.chain_id))
    } else {
        let rpc = config
            .rpc_url
            .as_deref()
            .context("--rpc-url is required unless --dry-run")?;
        Arc::new(AlloyHttpTransport::new(rpc, config.http_timeout())?)
    };
    let store = Arc::new(FsBundleStore::new(config.output_dir.clone()));
    let bundler = Bundler::new(provider, store, config.clone());

    let request = RunRequest {
        target: BundleTarget {
            wallet_name: args.wallet_name.clone(),
            address,
            owner,
        },
        recipient,
        input,
        output: args.output,
    };

    if !args.propose {
        let payloads = bundler.prepare(address, recipient, &request.input)?;
        if payloads.is_empty() {
            println!("nothing to claim for {}", args.wallet_name);
            return Ok(());
        }
        let saved = bundler.format_and_save(payloads, args.output, &request.target)?;
        print_saved(&saved.location, saved.bundle.payloads());
        return Ok(());
    }

    let signer = LocalKeySigner::from_hex(require(&args.private_key, "--private-key")?)?;
    if args.dry_run {
        let service = DryRunService::new(args.nonce);
        let client = ProposalClient::new(service.clone(), &config);
        let outcome = run_with_proposal(&bundler, &request, &client, &signer);
        for proposal in service.proposals() {
            println!("dry-run request: {}", serde_json::to_string(&proposal)?);
        }
        outcome
    } else {
        let service = SafeServiceClient::new(&config.safe_service_url, config.http_timeout())?;
        let client = ProposalClient::new(service, &config);
        run_with_proposal(&bundler, &request, &client, &signer)
    }
}

fn run_with_proposal<S: SafeServiceApi>(
    bundler: &Bundler,
    request: &RunRequest,
    client: &ProposalClient<S>,
    signer: &LocalKeySigner,
) -> Result<()> {
    let report = bundler.run(request, Some((client, signer as &dyn DigestSigner)))?;
    print_saved(&report.saved.location, report.saved.bundle.payloads());
    match report.proposal {
        Some(Ok(result)) => super::propose::print_result(&result),
        Some(Err(err)) => Err(anyhow::Error::new(err).context(format!(
            "proposal failed; bundle kept at {}",
            report.saved.location
        ))),
        None => bail!("no proposal was attempted"),
    }
}

fn print_saved(location: &str, payloads: &[harvest_sdk::Payload]) {
    println!("saved: {location}");
    println!("transactions: {}", payloads.len());
    println!("summary: {}", describe(payloads));
}
