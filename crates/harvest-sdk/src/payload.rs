//! Turns reward, boost and swap records into raw call payloads.

use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    contracts::{IDelegationHandler, IRewardVault, IStakerPool, IERC20},
    error::{BundleError, Result},
    records::{
        parse_address, parse_amount, BoostCall, ClaimInput, RewardKind, RewardRecord,
        RewardToken, SwapRequest,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PayloadKind {
    ClaimVault,
    ClaimStaker,
    ClaimDelegation,
    ValidatorBoost,
    Approval,
    Swap,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 6] = [
        PayloadKind::ClaimVault,
        PayloadKind::ClaimStaker,
        PayloadKind::ClaimDelegation,
        PayloadKind::ValidatorBoost,
        PayloadKind::Approval,
        PayloadKind::Swap,
    ];

    /// Singular human noun used in bundle descriptions.
    pub fn noun(self) -> &'static str {
        match self {
            PayloadKind::ClaimVault => "vault claim",
            PayloadKind::ClaimStaker => "staker claim",
            PayloadKind::ClaimDelegation => "delegation claim",
            PayloadKind::ValidatorBoost => "validator boost",
            PayloadKind::Approval => "token approval",
            PayloadKind::Swap => "swap",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Kind-specific details kept alongside the call for summaries and descriptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadMeta {
    Claim {
        label: String,
        token: RewardToken,
        amount: U256,
    },
    Boost {
        validator: String,
        allocation_bps: u16,
    },
    Approval {
        token: RewardToken,
        spender: Address,
        amount: U256,
    },
    Swap {
        token_in: RewardToken,
        amount_in: U256,
        token_out: String,
    },
}

/// One intended on-chain call. Only the gas limit is filled in after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub target: Address,
    pub data: Bytes,
    pub value: U256,
    pub kind: PayloadKind,
    pub gas_limit: Option<u64>,
    pub meta: PayloadMeta,
}

impl Payload {
    pub fn new(
        target: Address,
        data: impl Into<Bytes>,
        value: U256,
        kind: PayloadKind,
        meta: PayloadMeta,
    ) -> Self {
        Self {
            target,
            data: data.into(),
            value,
            kind,
            gas_limit: None,
            meta,
        }
    }

    pub fn with_gas_limit(mut self, gas: u64) -> Self {
        self.gas_limit = Some(gas);
        self
    }
}

/// Encodes claim, boost and swap payloads on behalf of one wallet.
#[derive(Clone, Copy, Debug)]
pub struct PayloadBuilder {
    source: Address,
    recipient: Address,
}

impl PayloadBuilder {
    /// Claims pay out to `recipient`, or back to `source` when unset.
    pub fn new(source: Address, recipient: Option<Address>) -> Self {
        Self {
            source,
            recipient: recipient.unwrap_or(source),
        }
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    /// Builds claims, then boosts, then swaps. Nothing claimable yields an empty list.
    pub fn build_all(&self, input: &ClaimInput) -> Result<Vec<Payload>> {
        let mut payloads = self.build_claims(&input.rewards)?;
        payloads.extend(input.boosts.iter().map(Self::boost));
        for swap in &input.swaps {
            payloads.extend(self.build_swap(swap)?);
        }
        info!(
            target: "harvest::payload",
            "built {} payload(s) from {} reward record(s), {} boost(s), {} swap(s)",
            payloads.len(),
            input.rewards.len(),
            input.boosts.len(),
            input.swaps.len()
        );
        Ok(payloads)
    }

    pub fn build_claims(&self, records: &[RewardRecord]) -> Result<Vec<Payload>> {
        let mut payloads = Vec::with_capacity(records.len());
        for record in records {
            if let Some(payload) = self.build_claim(record)? {
                payloads.push(payload);
            }
        }
        Ok(payloads)
    }

    /// Returns `None` for records with nothing to claim or no target address.
    pub fn build_claim(&self, record: &RewardRecord) -> Result<Option<Payload>> {
        let amount = record.earned_amount()?;
        if amount.is_zero() && !record.always_attempt_claim {
            return Ok(None);
        }
        let Some(raw_target) = record.target_address() else {
            warn!(
                target: "harvest::payload",
                "skipping {:?} claim for {}: no contract address",
                record.kind,
                record.label()
            );
            return Ok(None);
        };
        let target = parse_address(raw_target, "claim target")?;

        let (kind, data) = match record.kind {
            RewardKind::Vault => (
                PayloadKind::ClaimVault,
                IRewardVault::getRewardCall {
                    account: self.source,
                    recipient: self.recipient,
                }
                .abi_encode(),
            ),
            RewardKind::Staker => (
                PayloadKind::ClaimStaker,
                IStakerPool::getRewardCall {}.abi_encode(),
            ),
            RewardKind::Delegation => (
                PayloadKind::ClaimDelegation,
                IDelegationHandler::claimCall {}.abi_encode(),
            ),
        };
        let meta = PayloadMeta::Claim {
            label: record.label(),
            token: record.reward_token.clone(),
            amount,
        };
        Ok(Some(Payload::new(target, data, U256::ZERO, kind, meta)))
    }

    /// Validator boosts arrive fully encoded.
    pub fn boost(call: &BoostCall) -> Payload {
        Payload::new(
            call.target,
            call.data.clone(),
            call.value,
            PayloadKind::ValidatorBoost,
            PayloadMeta::Boost {
                validator: call.validator.clone(),
                allocation_bps: call.allocation_bps,
            },
        )
    }

    /// An approval for the router's spender (unless skipped) followed by the swap itself.
    pub fn build_swap(&self, request: &SwapRequest) -> Result<Vec<Payload>> {
        let amount_in = parse_amount(&request.amount_in, request.token_in.decimals)?;
        if amount_in.is_zero() {
            return Err(BundleError::Validation(format!(
                "swap of {} has zero input amount",
                request.token_in.symbol
            )));
        }
        let mut payloads = Vec::with_capacity(2);
        if !request.skip_approval {
            let token = request.token_in.address.ok_or_else(|| {
                BundleError::Validation(format!(
                    "swap input token {} has no address to approve",
                    request.token_in.symbol
                ))
            })?;
            let data = IERC20::approveCall {
                spender: request.spender,
                amount: amount_in,
            }
            .abi_encode();
            payloads.push(Payload::new(
                token,
                data,
                U256::ZERO,
                PayloadKind::Approval,
                PayloadMeta::Approval {
                    token: request.token_in.clone(),
                    spender: request.spender,
                    amount: amount_in,
                },
            ));
        }
        payloads.push(Payload::new(
            request.router,
            request.data.clone(),
            request.value,
            PayloadKind::Swap,
            PayloadMeta::Swap {
                token_in: request.token_in.clone(),
                amount_in,
                token_out: request.token_out_symbol.clone(),
            },
        ));
        Ok(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, keccak256};

    const USER: Address = address!("0x1111111111111111111111111111111111111111");
    const VAULT: &str = "0x2222222222222222222222222222222222222222";

    fn reward(kind: RewardKind, earned: &str, target: Option<&str>) -> RewardRecord {
        RewardRecord {
            earned: earned.into(),
            reward_token: RewardToken {
                symbol: "REWARD".into(),
                address: None,
                decimals: 18,
            },
            contract_address: target.map(Into::into),
            vault_address: None,
            kind,
            always_attempt_claim: false,
            name: Some("Pool".into()),
        }
    }

    fn selector(signature: &str) -> [u8; 4] {
        let hash = keccak256(signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    #[test]
    fn vault_claim_encodes_owner_and_recipient() {
        let recipient = address!("0x3333333333333333333333333333333333333333");
        let builder = PayloadBuilder::new(USER, Some(recipient));
        let payload = builder
            .build_claim(&reward(RewardKind::Vault, "12.5", Some(VAULT)))
            .unwrap()
            .expect("claimable");
        assert_eq!(payload.kind, PayloadKind::ClaimVault);
        assert_eq!(&payload.data[..4], &selector("getReward(address,address)"));
        assert_eq!(payload.data.len(), 4 + 64);
        assert_eq!(&payload.data[16..36], USER.as_slice());
        assert_eq!(&payload.data[48..68], recipient.as_slice());
        assert_eq!(payload.value, U256::ZERO);
        assert_eq!(payload.gas_limit, None);
    }

    #[test]
    fn zero_argument_claims_have_bare_selectors() {
        let builder = PayloadBuilder::new(USER, None);
        let staker = builder
            .build_claim(&reward(RewardKind::Staker, "1", Some(VAULT)))
            .unwrap()
            .unwrap();
        assert_eq!(staker.data.as_ref(), &selector("getReward()"));
        let delegation = builder
            .build_claim(&reward(RewardKind::Delegation, "1", Some(VAULT)))
            .unwrap()
            .unwrap();
        assert_eq!(delegation.data.as_ref(), &selector("claim()"));
        assert_eq!(delegation.kind, PayloadKind::ClaimDelegation);
    }

    #[test]
    fn nothing_claimable_is_empty_not_error() {
        let builder = PayloadBuilder::new(USER, None);
        let records = vec![
            reward(RewardKind::Vault, "0", Some(VAULT)),
            reward(RewardKind::Staker, "0.0", Some(VAULT)),
        ];
        assert!(builder.build_claims(&records).unwrap().is_empty());
    }

    #[test]
    fn always_attempt_claims_zero_balances() {
        let builder = PayloadBuilder::new(USER, None);
        let mut record = reward(RewardKind::Staker, "0", Some(VAULT));
        record.always_attempt_claim = true;
        assert!(builder.build_claim(&record).unwrap().is_some());
    }

    #[test]
    fn missing_address_skips_but_malformed_address_fails() {
        let builder = PayloadBuilder::new(USER, None);
        let records = vec![
            reward(RewardKind::Vault, "5", None),
            reward(RewardKind::Vault, "5", Some(VAULT)),
        ];
        let payloads = builder.build_claims(&records).unwrap();
        assert_eq!(payloads.len(), 1);

        let err = builder
            .build_claim(&reward(RewardKind::Vault, "5", Some("0xnot-an-address")))
            .unwrap_err();
        assert!(matches!(err, BundleError::Validation(_)));
    }

    #[test]
    fn swap_emits_approval_before_swap() {
        let builder = PayloadBuilder::new(USER, None);
        let token = address!("0x4444444444444444444444444444444444444444");
        let router = address!("0x5555555555555555555555555555555555555555");
        let request = SwapRequest {
            token_in: RewardToken {
                symbol: "REWARD".into(),
                address: Some(token),
                decimals: 18,
            },
            amount_in: "2".into(),
            spender: router,
            router,
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            value: U256::ZERO,
            token_out_symbol: "USDC".into(),
            skip_approval: false,
        };
        let payloads = builder.build_swap(&request).unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].kind, PayloadKind::Approval);
        assert_eq!(payloads[0].target, token);
        assert_eq!(&payloads[0].data[..4], &selector("approve(address,uint256)"));
        assert_eq!(payloads[1].kind, PayloadKind::Swap);
        assert_eq!(payloads[1].target, router);
        assert_eq!(payloads[1].data, request.data);
    }

    #[test]
    fn boosts_pass_through_untouched() {
        let call = BoostCall {
            target: address!("0x6666666666666666666666666666666666666666"),
            data: Bytes::from(vec![1, 2, 3]),
            value: U256::from(9u64),
            validator: "Validator A".into(),
            allocation_bps: 6_000,
        };
        let payload = PayloadBuilder::boost(&call);
        assert_eq!(payload.kind, PayloadKind::ValidatorBoost);
        assert_eq!(payload.data, call.data);
        assert_eq!(payload.value, call.value);
        assert_eq!(payload.target, call.target);
    }
}
