//! Renders payloads into the three persisted bundle shapes and parses them back.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::{hex, Address, U256};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{BundleError, Result},
    multisend::{Operation, SafeCall},
    payload::{Payload, PayloadKind, PayloadMeta},
    records::{format_amount, parse_address},
    safe_tx::canonical_data,
    transport::FeeData,
};

/// Version string of the Safe Transaction Builder file format we emit.
pub const TX_BUILDER_VERSION: &str = "1.16.5";
const UI_FILE_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Direct,
    #[serde(rename = "multisig-ui")]
    MultisigUI,
    #[serde(rename = "multisig-cli")]
    MultisigCLI,
}

impl OutputKind {
    pub fn slug(self) -> &'static str {
        match self {
            OutputKind::Direct => "direct",
            OutputKind::MultisigUI => "multisig-ui",
            OutputKind::MultisigCLI => "multisig-cli",
        }
    }

    pub fn is_multisig(self) -> bool {
        !matches!(self, OutputKind::Direct)
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for OutputKind {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(OutputKind::Direct),
            "multisig-ui" | "ui" => Ok(OutputKind::MultisigUI),
            "multisig-cli" | "cli" => Ok(OutputKind::MultisigCLI),
            other => Err(BundleError::Validation(format!(
                "unknown output kind {other:?}"
            ))),
        }
    }
}

/// Aggregates derived from a bundle's payloads. Display cache only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleSummary {
    pub counts: BTreeMap<PayloadKind, usize>,
    /// Claimed amounts per token symbol, formatted in whole tokens.
    pub reward_totals: BTreeMap<String, String>,
    pub transaction_count: usize,
    pub estimated_gas_total: u64,
}

impl BundleSummary {
    pub fn from_payloads(payloads: &[Payload]) -> Self {
        let mut counts = BTreeMap::new();
        let mut totals: BTreeMap<String, (U256, u8)> = BTreeMap::new();
        let mut gas = 0u64;
        for payload in payloads {
            *counts.entry(payload.kind).or_insert(0) += 1;
            gas = gas.saturating_add(payload.gas_limit.unwrap_or(0));
            if let PayloadMeta::Claim { token, amount, .. } = &payload.meta {
                let entry = totals
                    .entry(token.symbol.clone())
                    .or_insert((U256::ZERO, token.decimals));
                entry.0 = entry.0.saturating_add(*amount);
            }
        }
        Self {
            counts,
            reward_totals: totals
                .into_iter()
                .map(|(symbol, (amount, decimals))| (symbol, format_amount(amount, decimals)))
                .collect(),
            transaction_count: payloads.len(),
            estimated_gas_total: gas,
        }
    }

    pub fn count(&self, kind: PayloadKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn vault_count(&self) -> usize {
        self.count(PayloadKind::ClaimVault)
    }
}

/// An ordered payload list fixed to one output shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    payloads: Vec<Payload>,
    output_kind: OutputKind,
    created_at_ms: u64,
    summary: BundleSummary,
}

impl Bundle {
    pub fn new(payloads: Vec<Payload>, output_kind: OutputKind, created_at_ms: u64) -> Self {
        let summary = BundleSummary::from_payloads(&payloads);
        Self {
            payloads,
            output_kind,
            created_at_ms,
            summary,
        }
    }

    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    pub fn output_kind(&self) -> OutputKind {
        self.output_kind
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn summary(&self) -> &BundleSummary {
        &self.summary
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

/// Who the bundle is for. `address` is the executing account (EOA or Safe).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleTarget {
    pub wallet_name: String,
    pub address: Address,
    pub owner: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectTransaction {
    pub from: String,
    pub to: String,
    pub data: String,
    pub value: String,
    pub gas_limit: String,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub chain_id: u64,
    #[serde(rename = "type")]
    pub tx_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTransaction {
    pub to: String,
    /// Decimal wei.
    pub value: String,
    pub data: String,
    #[serde(default)]
    pub operation: u8,
    /// Always `"0x0"` when written by this crate.
    #[serde(default = "zero_quantity")]
    pub safe_tx_gas: String,
    #[serde(default)]
    pub estimated_gas: Option<String>,
    #[serde(default)]
    pub kind: Option<PayloadKind>,
    #[serde(default)]
    pub contract_method: Option<Value>,
    #[serde(default)]
    pub contract_inputs_values: Option<Value>,
}

fn zero_quantity() -> String {
    "0x0".into()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMeta {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tx_builder_version: Option<String>,
    #[serde(default)]
    pub created_from_safe_address: Option<String>,
    #[serde(default)]
    pub created_from_owner_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiBundle {
    pub version: String,
    pub chain_id: String,
    pub created_at: u64,
    pub meta: UiMeta,
    pub transactions: Vec<BatchTransaction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliMeta {
    pub chain_id: u64,
    pub safe_address: String,
    pub wallet_name: String,
    pub created_at: u64,
    pub output_kind: OutputKind,
    pub counts: BTreeMap<PayloadKind, usize>,
    pub transaction_count: usize,
    #[serde(default)]
    pub reward_totals: BTreeMap<String, String>,
    #[serde(default)]
    pub estimated_gas_total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliBundle {
    pub transactions: Vec<BatchTransaction>,
    pub meta: CliMeta,
}

/// A persisted bundle in any of its three shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleDocument {
    Direct(Vec<DirectTransaction>),
    MultisigUI(UiBundle),
    MultisigCLI(CliBundle),
}

impl BundleDocument {
    /// Shape-sniffs `json`: an array is Direct, an object with `version`,
    /// `transactions` and `meta` is MultisigUI, one with only `transactions`
    /// and `meta` is MultisigCLI.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let (is_array, has_body, has_version) = match &value {
            Value::Array(_) => (true, false, false),
            Value::Object(map) => (
                false,
                map.contains_key("transactions") && map.contains_key("meta"),
                map.contains_key("version"),
            ),
            _ => (false, false, false),
        };
        match (is_array, has_body, has_version) {
            (true, _, _) => Ok(BundleDocument::Direct(serde_json::from_value(value)?)),
            (false, true, true) => Ok(BundleDocument::MultisigUI(serde_json::from_value(value)?)),
            (false, true, false) => Ok(BundleDocument::MultisigCLI(serde_json::from_value(value)?)),
            _ => Err(BundleError::Validation(
                "unrecognised bundle shape: expected an array or an object with transactions and meta"
                    .into(),
            )),
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            BundleDocument::Direct(_) => OutputKind::Direct,
            BundleDocument::MultisigUI(_) => OutputKind::MultisigUI,
            BundleDocument::MultisigCLI(_) => OutputKind::MultisigCLI,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let rendered = match self {
            BundleDocument::Direct(txs) => serde_json::to_string_pretty(txs)?,
            BundleDocument::MultisigUI(ui) => serde_json::to_string_pretty(ui)?,
            BundleDocument::MultisigCLI(cli) => serde_json::to_string_pretty(cli)?,
        };
        Ok(rendered)
    }

    pub fn transaction_count(&self) -> usize {
        match self {
            BundleDocument::Direct(txs) => txs.len(),
            BundleDocument::MultisigUI(ui) => ui.transactions.len(),
            BundleDocument::MultisigCLI(cli) => cli.transactions.len(),
        }
    }

    /// Chain id recorded in the file, if it states one.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            BundleDocument::Direct(txs) => txs.first().map(|tx| tx.chain_id),
            BundleDocument::MultisigUI(ui) => ui.chain_id.parse().ok(),
            BundleDocument::MultisigCLI(cli) => Some(cli.meta.chain_id),
        }
    }

    /// The calls in execution order.
    pub fn calls(&self) -> Result<Vec<SafeCall>> {
        match self {
            BundleDocument::Direct(txs) => txs
                .iter()
                .map(|tx| {
                    Ok(SafeCall::call(
                        parse_address(&tx.to, "to")?,
                        parse_quantity(&tx.value)?,
                        canonical_data(&tx.data)?,
                    ))
                })
                .collect(),
            BundleDocument::MultisigUI(UiBundle { transactions, .. })
            | BundleDocument::MultisigCLI(CliBundle { transactions, .. }) => transactions
                .iter()
                .map(|tx| {
                    Ok(SafeCall {
                        operation: Operation::try_from(tx.operation)?,
                        to: parse_address(&tx.to, "to")?,
                        value: parse_quantity(&tx.value)?,
                        data: canonical_data(&tx.data)?,
                    })
                })
                .collect(),
        }
    }
}

/// Accepts `0x`-prefixed hex or decimal; empty means zero.
pub fn parse_quantity(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    let parsed = if trimmed.is_empty() {
        Ok(U256::ZERO)
    } else if let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        U256::from_str_radix(digits, 16)
    } else {
        U256::from_str_radix(trimmed, 10)
    };
    parsed.map_err(|err| BundleError::Validation(format!("quantity {raw:?}: {err}")))
}

fn hex_quantity<T: fmt::LowerHex>(value: T) -> String {
    format!("0x{value:x}")
}

fn percent(bps: u16) -> String {
    format!("{}%", f64::from(bps) / 100.0)
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Human-readable summary of what the bundle does, stable for a given payload list.
pub fn describe(payloads: &[Payload]) -> String {
    let mut parts = Vec::new();
    for kind in PayloadKind::ALL {
        let matching: Vec<&Payload> = payloads.iter().filter(|p| p.kind == kind).collect();
        if matching.is_empty() {
            continue;
        }
        let details: Vec<String> = matching
            .iter()
            .filter_map(|p| match &p.meta {
                PayloadMeta::Claim { label, .. } => Some(label.clone()),
                PayloadMeta::Boost {
                    validator,
                    allocation_bps,
                } => Some(format!("{validator} {}", percent(*allocation_bps))),
                PayloadMeta::Approval { token, .. } => Some(token.symbol.clone()),
                PayloadMeta::Swap {
                    token_in,
                    amount_in,
                    token_out,
                } => Some(format!(
                    "{} {} to {token_out}",
                    format_amount(*amount_in, token_in.decimals),
                    token_in.symbol
                )),
            })
            .collect();
        let mut part = plural(matching.len(), kind.noun());
        if !details.is_empty() {
            part.push_str(&format!(" ({})", details.join(", ")));
        }
        parts.push(part);
    }
    if parts.is_empty() {
        return "Empty bundle".into();
    }

    let summary = BundleSummary::from_payloads(payloads);
    let mut text = parts.join(", ");
    if !summary.reward_totals.is_empty() {
        let totals: Vec<String> = summary
            .reward_totals
            .iter()
            .map(|(symbol, amount)| format!("{amount} {symbol}"))
            .collect();
        text.push_str(&format!(". Rewards: {}", totals.join(", ")));
    }
    text
}

/// Renders bundles for one chain.
#[derive(Clone, Copy, Debug)]
pub struct BundleFormatter {
    chain_id: u64,
    fees: FeeData,
}

impl BundleFormatter {
    pub fn new(chain_id: u64, fees: FeeData) -> Self {
        Self { chain_id, fees }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn render(&self, bundle: &Bundle, target: &BundleTarget) -> Result<BundleDocument> {
        let document = match bundle.output_kind() {
            OutputKind::Direct => BundleDocument::Direct(self.direct(bundle, target)?),
            OutputKind::MultisigUI => BundleDocument::MultisigUI(self.ui(bundle, target)),
            OutputKind::MultisigCLI => BundleDocument::MultisigCLI(self.cli(bundle, target)),
        };
        info!(
            target: "harvest::format",
            "rendered {} bundle for {} with {} transaction(s)",
            bundle.output_kind(),
            target.wallet_name,
            bundle.payloads().len()
        );
        Ok(document)
    }

    fn direct(&self, bundle: &Bundle, target: &BundleTarget) -> Result<Vec<DirectTransaction>> {
        let from = target.address.to_checksum(None);
        bundle
            .payloads()
            .iter()
            .map(|payload| {
                let gas = payload.gas_limit.ok_or_else(|| {
                    BundleError::Validation(format!(
                        "{} to {} has no gas limit",
                        payload.kind, payload.target
                    ))
                })?;
                Ok(DirectTransaction {
                    from: from.clone(),
                    to: payload.target.to_checksum(None),
                    data: hex::encode_prefixed(&payload.data),
                    value: hex_quantity(payload.value),
                    gas_limit: hex_quantity(gas),
                    max_fee_per_gas: hex_quantity(self.fees.max_fee_per_gas),
                    max_priority_fee_per_gas: hex_quantity(self.fees.max_priority_fee_per_gas),
                    chain_id: self.chain_id,
                    tx_type: "0x2".into(),
                })
            })
            .collect()
    }

    fn multisig_transactions(bundle: &Bundle) -> Vec<BatchTransaction> {
        bundle
            .payloads()
            .iter()
            .map(|payload| BatchTransaction {
                to: payload.target.to_checksum(None),
                value: payload.value.to_string(),
                data: hex::encode_prefixed(&payload.data),
                operation: Operation::Call.as_u8(),
                // The Safe UI rejects non-zero safeTxGas for v1.3+ Safes.
                safe_tx_gas: zero_quantity(),
                estimated_gas: payload.gas_limit.map(hex_quantity),
                kind: Some(payload.kind),
                contract_method: None,
                contract_inputs_values: None,
            })
            .collect()
    }

    fn ui(&self, bundle: &Bundle, target: &BundleTarget) -> UiBundle {
        UiBundle {
            version: UI_FILE_VERSION.into(),
            chain_id: self.chain_id.to_string(),
            created_at: bundle.created_at_ms(),
            meta: UiMeta {
                name: format!("Harvest {}", target.wallet_name),
                description: describe(bundle.payloads()),
                tx_builder_version: Some(TX_BUILDER_VERSION.into()),
                created_from_safe_address: Some(target.address.to_checksum(None)),
                created_from_owner_address: target.owner.map(|owner| owner.to_checksum(None)),
            },
            transactions: Self::multisig_transactions(bundle),
        }
    }

    fn cli(&self, bundle: &Bundle, target: &BundleTarget) -> CliBundle {
        let summary = bundle.summary();
        CliBundle {
            transactions: Self::multisig_transactions(bundle),
            meta: CliMeta {
                chain_id: self.chain_id,
                safe_address: target.address.to_checksum(None),
                wallet_name: target.wallet_name.clone(),
                created_at: bundle.created_at_ms(),
                output_kind: OutputKind::MultisigCLI,
                counts: summary.counts.clone(),
                transaction_count: summary.transaction_count,
                reward_totals: summary.reward_totals.clone(),
                estimated_gas_total: summary.estimated_gas_total,
            },
        }
    }
}
