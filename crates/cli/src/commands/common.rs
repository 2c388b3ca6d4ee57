use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use alloy_primitives::{keccak256, Address, B256};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use harvest_sdk::{
    BundleError, BundlerConfig, EvmCall, EvmTransport, FeeData, GasRequest, PackedSignature,
    ReadProvider, SafeServiceApi,
};
use safe_service::{MultisigTransaction, ProposeTransactionRequest, SafeInfo, ServiceError};

use harvest_sdk::Result as SdkResult;

/// Flags shared by every subcommand; each overrides the config file.
#[derive(Clone, Debug, Default, Args)]
pub struct GlobalArgs {
    /// JSON config file (camelCase keys, every field optional).
    #[arg(long, global = true, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,
    /// EVM JSON-RPC endpoint.
    #[arg(long, global = true, env = "HARVEST_RPC_URL")]
    pub rpc_url: Option<String>,
    /// Safe Transaction Service base URL including `/api/v1/`.
    #[arg(long, global = true)]
    pub safe_service_url: Option<String>,
    /// Directory saved bundles are written to.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<BundlerConfig> {
        let mut config = match &self.config {
            Some(path) => BundlerConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => BundlerConfig::default(),
        };
        if let Some(chain_id) = self.chain_id {
            config.chain_id = chain_id;
        }
        if let Some(rpc) = &self.rpc_url {
            config.rpc_url = Some(rpc.clone());
        }
        if let Some(url) = &self.safe_service_url {
            config.safe_service_url = url.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Offline provider: every estimate fails so the configured fallbacks apply.
pub struct DryRunProvider {
    chain_id: u64,
}

impl DryRunProvider {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }
}

impl ReadProvider for DryRunProvider {
    fn chain_id(&self) -> SdkResult<u64> {
        Ok(self.chain_id)
    }

    fn estimate_gas(&self, _request: &GasRequest) -> SdkResult<u64> {
        Err(BundleError::Estimation("dry run".into()))
    }

    fn fee_data(&self) -> SdkResult<FeeData> {
        Err(BundleError::Network("dry run".into()))
    }
}

#[derive(Clone, Default)]
pub struct DryRunTransport {
    sent: Arc<Mutex<Vec<EvmCall>>>,
}

impl DryRunTransport {
    pub fn sent(&self) -> Vec<EvmCall> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl EvmTransport for DryRunTransport {
    fn send(&self, call: EvmCall) -> SdkResult<B256> {
        let hash = keccak256(&call.data);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(call);
        }
        Ok(hash)
    }

    fn sender(&self) -> Option<Address> {
        None
    }
}

/// Stands in for the Safe Transaction Service: reports a fixed nonce and
/// records proposals instead of posting them.
#[derive(Clone, Default)]
pub struct DryRunService {
    nonce: u64,
    proposals: Arc<Mutex<Vec<ProposeTransactionRequest>>>,
}

impl DryRunService {
    pub fn new(nonce: u64) -> Self {
        Self {
            nonce,
            ..Self::default()
        }
    }

    pub fn proposals(&self) -> Vec<ProposeTransactionRequest> {
        self.proposals
            .lock()
            .map(|proposals| proposals.clone())
            .unwrap_or_default()
    }
}

impl SafeServiceApi for DryRunService {
    fn safe_info(&self, safe: Address) -> std::result::Result<SafeInfo, ServiceError> {
        Ok(SafeInfo {
            address: safe.to_checksum(None),
            nonce: self.nonce,
            threshold: 1,
            owners: Vec::new(),
            version: None,
        })
    }

    fn propose(
        &self,
        _safe: Address,
        request: &ProposeTransactionRequest,
    ) -> std::result::Result<(), ServiceError> {
        if let Ok(mut proposals) = self.proposals.lock() {
            proposals.push(request.clone());
        }
        Ok(())
    }

    fn transaction(&self, safe_tx_hash: B256) -> std::result::Result<MultisigTransaction, ServiceError> {
        Err(ServiceError::Decode(format!(
            "dry run has no record of {safe_tx_hash}"
        )))
    }

    fn confirm(
        &self,
        _safe_tx_hash: B256,
        _signature: &PackedSignature,
    ) -> std::result::Result<(), ServiceError> {
        Ok(())
    }
}

pub fn parse_address(value: &str, label: &str) -> Result<Address> {
    Ok(harvest_sdk::records::parse_address(value, label)?)
}

pub fn parse_b256(value: &str, label: &str) -> Result<B256> {
    let bytes = parse_hex_vec(value, label)?;
    if bytes.len() != 32 {
        return Err(anyhow!("{label} must be 32 bytes, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

pub fn parse_hex_vec(value: &str, label: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim().trim_start_matches("0x");
    hex::decode(trimmed).map_err(|e| anyhow!("decode {label}: {e}"))
}

pub fn format_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn require<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str> {
    value
        .as_deref()
        .with_context(|| format!("{flag} is required"))
}
