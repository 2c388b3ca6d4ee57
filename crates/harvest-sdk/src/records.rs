//! Input records supplied by the reward/stake discovery collaborators.

use std::str::FromStr;

use alloy_primitives::{
    utils::{format_units, parse_units, ParseUnits},
    Address, Bytes, U256,
};
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Everything one bundle request may claim, boost or swap.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClaimInput {
    pub rewards: Vec<RewardRecord>,
    pub boosts: Vec<BoostCall>,
    pub swaps: Vec<SwapRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardToken {
    pub symbol: String,
    #[serde(default)]
    pub address: Option<Address>,
    pub decimals: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Vault,
    Staker,
    Delegation,
}

/// One claimable position as reported by discovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    /// Decimal amount in whole tokens, e.g. `"12.5"`.
    pub earned: String,
    pub reward_token: RewardToken,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub vault_address: Option<String>,
    pub kind: RewardKind,
    #[serde(default)]
    pub always_attempt_claim: bool,
    /// Human label (vault or pool name) used in bundle descriptions.
    #[serde(default)]
    pub name: Option<String>,
}

impl RewardRecord {
    /// Contract the claim call targets, preferring the kind-specific field.
    pub fn target_address(&self) -> Option<&str> {
        let (primary, secondary) = match self.kind {
            RewardKind::Vault => (&self.vault_address, &self.contract_address),
            RewardKind::Staker | RewardKind::Delegation => {
                (&self.contract_address, &self.vault_address)
            }
        };
        primary
            .as_deref()
            .or(secondary.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn earned_amount(&self) -> Result<U256> {
        parse_amount(&self.earned, self.reward_token.decimals)
    }

    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.reward_token.symbol.clone())
    }
}

/// A validator boost call prepared elsewhere and passed through untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostCall {
    pub target: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    pub validator: String,
    /// Share of the boost going to this validator, in basis points.
    pub allocation_bps: u16,
}

/// A swap whose router calldata was produced by an external quote.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub token_in: RewardToken,
    pub amount_in: String,
    pub spender: Address,
    pub router: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    pub token_out_symbol: String,
    #[serde(default)]
    pub skip_approval: bool,
}

/// Parses an address, enforcing EIP-55 when the input is mixed-case.
pub fn parse_address(value: &str, label: &str) -> Result<Address> {
    let trimmed = value.trim();
    let hex_part = trimmed.trim_start_matches("0x");
    let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
        && hex_part.chars().any(|c| c.is_ascii_lowercase());
    let parsed = if mixed_case {
        Address::parse_checksummed(trimmed, None).map_err(|e| e.to_string())
    } else {
        Address::from_str(trimmed).map_err(|e| e.to_string())
    };
    parsed.map_err(|err| BundleError::Validation(format!("{label} {trimmed:?}: {err}")))
}

/// Converts a decimal token amount into base units. Negative amounts are rejected.
pub fn parse_amount(value: &str, decimals: u8) -> Result<U256> {
    let parsed = parse_units(value.trim(), decimals)
        .map_err(|err| BundleError::Validation(format!("amount {value:?}: {err}")))?;
    match parsed {
        ParseUnits::U256(amount) => Ok(amount),
        ParseUnits::I256(_) => Err(BundleError::Validation(format!(
            "amount {value:?} is negative"
        ))),
    }
}

/// Renders base units as a decimal string without trailing zeros.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    let Ok(rendered) = format_units(amount, decimals) else {
        return amount.to_string();
    };
    if !rendered.contains('.') {
        return rendered;
    }
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
