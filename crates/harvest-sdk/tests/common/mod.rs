use std::sync::{Arc, Mutex};

use alloy_primitives::{address, Address};
use harvest_sdk::{
    BundleError, BundlerConfig, Clock, FeeData, GasRequest, ReadProvider, Result, RetryPolicy,
};
use serde_json::json;

pub const USER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const VAULT: &str = "0x2222222222222222222222222222222222222222";
pub const STAKER: &str = "0x3333333333333333333333333333333333333333";
pub const BOOST_TARGET: &str = "0x4444444444444444444444444444444444444444";

/// Provider that answers every estimate with a fixed value, except for
/// targets listed in `failing`.
#[derive(Clone)]
pub struct MockProvider {
    pub chain_id: u64,
    pub estimate: u64,
    pub failing: Vec<Address>,
    pub calls: Arc<Mutex<Vec<GasRequest>>>,
}

impl MockProvider {
    pub fn new(estimate: u64) -> Self {
        Self {
            chain_id: 1,
            estimate,
            failing: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_for(mut self, target: Address) -> Self {
        self.failing.push(target);
        self
    }
}

impl ReadProvider for MockProvider {
    fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn estimate_gas(&self, request: &GasRequest) -> Result<u64> {
        self.calls.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.to) {
            return Err(BundleError::Estimation("execution reverted".into()));
        }
        Ok(self.estimate)
    }

    fn fee_data(&self) -> Result<FeeData> {
        Ok(FeeData {
            max_fee_per_gas: 20_000_000_000,
            max_priority_fee_per_gas: 1_500_000_000,
        })
    }
}

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

pub fn quiet_config() -> BundlerConfig {
    BundlerConfig {
        retry: RetryPolicy::NONE,
        ..BundlerConfig::default()
    }
}

pub fn vault_reward(earned: &str) -> serde_json::Value {
    json!({
        "earned": earned,
        "rewardToken": { "symbol": "REWARD", "decimals": 18 },
        "vaultAddress": VAULT,
        "kind": "vault",
        "name": "WETH Vault"
    })
}

pub fn staker_reward(earned: &str) -> serde_json::Value {
    json!({
        "earned": earned,
        "rewardToken": { "symbol": "REWARD", "decimals": 18 },
        "contractAddress": STAKER,
        "kind": "staker",
        "name": "REWARD Staking Pool"
    })
}
