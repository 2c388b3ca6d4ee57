use std::fs;

use alloy_primitives::U256;
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use harvest_sdk::{
    parse_quantity, AlloyHttpTransport, BundleDocument, EvmCall, EvmTransport, FeeData,
};
use log::info;

use super::common::{parse_address, parse_hex_vec, require, DryRunTransport, GlobalArgs};

/// Broadcasts a saved direct bundle from its EOA, one transaction at a time.
#[derive(Clone, Debug, Args)]
pub struct SendArgs {
    #[arg(long, value_name = "FILE")]
    pub bundle: String,
    #[arg(long, value_name = "HEX64", env = "HARVEST_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    /// Print the calls instead of broadcasting them.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

pub fn run(global: &GlobalArgs, args: SendArgs) -> Result<()> {
    let config = global.load_config()?;
    let raw = fs::read_to_string(&args.bundle)
        .with_context(|| format!("reading {}", args.bundle))?;
    let BundleDocument::Direct(txs) = BundleDocument::parse(&raw)? else {
        bail!("{} is a multisig bundle; use `propose`", args.bundle);
    };

    let calls = txs
        .iter()
        .map(|tx| {
            if tx.chain_id != config.chain_id {
                bail!("bundle targets chain {}, config expects {}", tx.chain_id, config.chain_id);
            }
            let gas = narrow::<u64>(parse_quantity(&tx.gas_limit)?, "gasLimit")?;
            let fees = FeeData {
                max_fee_per_gas: narrow(parse_quantity(&tx.max_fee_per_gas)?, "maxFeePerGas")?,
                max_priority_fee_per_gas: narrow(
                    parse_quantity(&tx.max_priority_fee_per_gas)?,
                    "maxPriorityFeePerGas",
                )?,
            };
            Ok(EvmCall::new(
                parse_address(&tx.to, "to")?,
                parse_hex_vec(&tx.data, "data")?,
                parse_quantity(&tx.value)?,
            )
            .with_gas_limit(gas)
            .with_fees(fees))
        })
        .collect::<Result<Vec<_>>>()?;
    let from = txs
        .first()
        .map(|tx| parse_address(&tx.from, "from"))
        .transpose()?;

    if args.dry_run {
        let transport = DryRunTransport::default();
        dispatch(&transport, calls)?;
        for call in transport.sent() {
            println!(
                "dry-run call: to={} value={} gas={:?} data=0x{}",
                call.to,
                call.value,
                call.gas_limit,
                hex::encode(&call.data)
            );
        }
        return Ok(());
    }

    let rpc = config
        .rpc_url
        .as_deref()
        .context("--rpc-url is required unless --dry-run")?;
    let transport = AlloyHttpTransport::with_signer(
        rpc,
        require(&args.private_key, "--private-key")?,
        config.http_timeout(),
    )?;
    if let (Some(from), Some(sender)) = (from, transport.sender()) {
        if from != sender {
            bail!("bundle was built for {from}, key belongs to {sender}");
        }
    }
    dispatch(&transport, calls)
}

fn dispatch(transport: &dyn EvmTransport, calls: Vec<EvmCall>) -> Result<()> {
    let total = calls.len();
    for (index, call) in calls.into_iter().enumerate() {
        let to = call.to;
        let hash = transport
            .send(call)
            .with_context(|| format!("transaction {} of {total} to {to} failed", index + 1))?;
        info!(target: "harvest::transport", "sent {}/{total}: {hash}", index + 1);
        println!("tx {}/{total}: {hash}", index + 1);
    }
    Ok(())
}

fn narrow<T: TryFrom<U256>>(value: U256, field: &str) -> Result<T> {
    T::try_from(value).map_err(|_| anyhow!("{field} {value} is out of range"))
}
