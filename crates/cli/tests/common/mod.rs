#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::json;

pub const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const OWNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const SAFE: &str = "0x5afe00000000000000000000000000000000c0de";

pub fn write_input(dir: &Path, rewards: serde_json::Value) -> PathBuf {
    let path = dir.join("input.json");
    let body = json!({ "rewards": rewards, "boosts": [], "swaps": [] });
    std::fs::write(&path, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
    path
}

pub fn two_rewards() -> serde_json::Value {
    json!([
        {
            "earned": "12",
            "rewardToken": { "symbol": "REWARD", "decimals": 18 },
            "vaultAddress": "0x2222222222222222222222222222222222222222",
            "kind": "vault",
            "name": "WETH Vault"
        },
        {
            "earned": "1.5",
            "rewardToken": { "symbol": "REWARD", "decimals": 18 },
            "contractAddress": "0x3333333333333333333333333333333333333333",
            "kind": "staker",
            "name": "REWARD Staking Pool"
        }
    ])
}

/// Value printed after `label: ` on stdout.
pub fn field<'a>(stdout: &'a str, label: &str) -> &'a str {
    let prefix = format!("{label}: ");
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .unwrap_or_else(|| panic!("stdout missing {label}: {stdout}"))
        .trim()
}
