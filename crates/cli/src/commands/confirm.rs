use anyhow::Result;
use clap::Args;
use harvest_sdk::{LocalKeySigner, ProposalClient};
use safe_service::SafeServiceClient;

use super::common::{parse_b256, require, GlobalArgs};

#[derive(Clone, Debug, Args)]
pub struct ConfirmArgs {
    /// Hash of a proposal already known to the service.
    #[arg(long, value_name = "HEX64")]
    pub safe_tx_hash: String,
    #[arg(long, value_name = "HEX64", env = "HARVEST_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

pub fn run(global: &GlobalArgs, args: ConfirmArgs) -> Result<()> {
    let config = global.load_config()?;
    let hash = parse_b256(&args.safe_tx_hash, "safe-tx-hash")?;
    let signer = LocalKeySigner::from_hex(require(&args.private_key, "--private-key")?)?;
    let service = SafeServiceClient::new(&config.safe_service_url, config.http_timeout())?;
    let client = ProposalClient::new(service, &config);
    let result = client.confirm(hash, &signer)?;
    println!("confirmed by: {}", harvest_sdk::DigestSigner::address(&signer));
    super::propose::print_result(&result)
}
