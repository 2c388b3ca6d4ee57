//! Bundler configuration: JSON file shape, defaults and validation.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use alloy_primitives::{address, Address, B256};
use serde::{Deserialize, Serialize};

use crate::{
    error::{BundleError, Result},
    retry::RetryPolicy,
};

/// MultiSendCallOnly v1.3.0, deployed at the same address on every supported chain.
pub const MULTISEND_CALL_ONLY: Address = address!("0x40A2aCCbd92BCA938b02010E17A5b8929b49130D");

/// Top-level configuration, read from a camelCase JSON file. Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundlerConfig {
    pub chain_id: u64,
    pub rpc_url: Option<String>,
    /// Must include the API version prefix.
    pub safe_service_url: String,
    pub safe_ui_url: String,
    /// EIP-3770 short name used in Safe UI deep links (`eth`, `base`, ...).
    pub chain_short_name: String,
    pub multisend_address: Address,
    pub output_dir: PathBuf,
    pub gas: GasConfig,
    pub fees: FeeConfig,
    pub retry: RetryPolicy,
    pub http_timeout_secs: u64,
    /// Free-text `origin` attached to proposals.
    pub origin: String,
    /// Known-good digest for the mismatch workaround; unset disables it.
    pub fallback_digest: Option<B256>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            rpc_url: None,
            safe_service_url: "https://safe-transaction-mainnet.safe.global/api/v1/".into(),
            safe_ui_url: "https://app.safe.global".into(),
            chain_short_name: "eth".into(),
            multisend_address: MULTISEND_CALL_ONLY,
            output_dir: PathBuf::from("bundles"),
            gas: GasConfig::default(),
            fees: FeeConfig::default(),
            retry: RetryPolicy::default(),
            http_timeout_secs: 10,
            origin: "harvest".into(),
            fallback_digest: None,
        }
    }
}

impl BundlerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            BundleError::Validation(format!("read config {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(BundleError::Validation("chainId must be non-zero".into()));
        }
        if self.gas.default_fallback == 0 || self.gas.boost_fallback == 0 {
            return Err(BundleError::Validation(
                "gas fallbacks must be non-zero".into(),
            ));
        }
        if self.gas.concurrency == 0 {
            return Err(BundleError::Validation(
                "gas.concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GasConfig {
    /// Limit applied when estimation fails for anything but a validator boost.
    pub default_fallback: u64,
    /// Validator boosts have volatile gas use, so they get a larger fallback.
    pub boost_fallback: u64,
    pub buffer_percent: u64,
    /// Estimates issued in parallel per batch.
    pub concurrency: usize,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            default_fallback: 500_000,
            boost_fallback: 0x100000,
            buffer_percent: 20,
            concurrency: 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeeConfig {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        }
    }
}
