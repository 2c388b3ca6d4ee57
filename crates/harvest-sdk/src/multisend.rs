//! Packs several calls into one atomic `multiSend(bytes)` call.
//!
//! Each entry is encoded as
//! `operation (1) | to (20) | value (32, big-endian) | data length (32) | data`
//! and entries are concatenated in order.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::{
    contracts::IMultiSend,
    error::{BundleError, Result},
    payload::Payload,
};

/// Fixed header size of one packed entry, before its data.
pub const ENTRY_HEADER_LEN: usize = 1 + 20 + 32 + 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

impl Operation {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        op.as_u8()
    }
}

impl TryFrom<u8> for Operation {
    type Error = BundleError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            other => Err(BundleError::Validation(format!(
                "unknown operation {other}"
            ))),
        }
    }
}

/// One call as a multisig account executes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeCall {
    pub operation: Operation,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl SafeCall {
    pub fn call(to: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self {
            operation: Operation::Call,
            to,
            value,
            data: data.into(),
        }
    }

    pub fn delegate_call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            operation: Operation::DelegateCall,
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_LEN + self.data.len()
    }
}

impl From<&Payload> for SafeCall {
    fn from(payload: &Payload) -> Self {
        SafeCall::call(payload.target, payload.value, payload.data.clone())
    }
}

fn encode_entry(call: &SafeCall, out: &mut Vec<u8>) {
    out.push(call.operation.as_u8());
    out.extend_from_slice(call.to.as_slice());
    out.extend_from_slice(&call.value.to_be_bytes::<32>());
    out.extend_from_slice(&U256::from(call.data.len()).to_be_bytes::<32>());
    out.extend_from_slice(&call.data);
}

/// Packs `calls` in order. No entry is reordered or dropped.
pub fn encode(calls: &[SafeCall]) -> Bytes {
    let mut packed = Vec::with_capacity(calls.iter().map(SafeCall::encoded_len).sum());
    for call in calls {
        encode_entry(call, &mut packed);
    }
    Bytes::from(packed)
}

/// Parses packed entries back into calls. Trailing or truncated bytes are an error.
pub fn decode(mut packed: &[u8]) -> Result<Vec<SafeCall>> {
    let mut calls = Vec::new();
    while !packed.is_empty() {
        if packed.len() < ENTRY_HEADER_LEN {
            return Err(BundleError::Validation(format!(
                "multisend entry {} truncated: {} header byte(s) left",
                calls.len(),
                packed.len()
            )));
        }
        let operation = Operation::try_from(packed[0])?;
        let to = Address::from_slice(&packed[1..21]);
        let value = U256::from_be_slice(&packed[21..53]);
        let len = U256::from_be_slice(&packed[53..85]);
        let rest = &packed[ENTRY_HEADER_LEN..];
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= rest.len())
            .ok_or_else(|| {
                BundleError::Validation(format!(
                    "multisend entry {} declares {len} data byte(s), {} available",
                    calls.len(),
                    rest.len()
                ))
            })?;
        calls.push(SafeCall {
            operation,
            to,
            value,
            data: Bytes::copy_from_slice(&rest[..len]),
        });
        packed = &rest[len..];
    }
    Ok(calls)
}

/// Wraps `calls` as a `multiSend(bytes)` call delegated to `multisend`.
pub fn wrap(multisend: Address, calls: &[SafeCall]) -> SafeCall {
    let data = IMultiSend::multiSendCall {
        transactions: encode(calls),
    }
    .abi_encode();
    SafeCall::delegate_call(multisend, data)
}

/// Reverses [`wrap`] given the outer call data.
pub fn unwrap_call_data(data: &[u8]) -> Result<Vec<SafeCall>> {
    let call = IMultiSend::multiSendCall::abi_decode(data, true)
        .map_err(|err| BundleError::Validation(format!("not a multiSend call: {err}")))?;
    decode(&call.transactions)
}

/// A single call goes out as-is; several are batched behind the multisend contract.
pub fn batch(multisend: Address, calls: &[SafeCall]) -> Result<SafeCall> {
    match calls {
        [] => Err(BundleError::Validation("nothing to batch".into())),
        [single] => Ok(single.clone()),
        many => Ok(wrap(multisend, many)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use proptest::prelude::*;

    const MULTISEND: Address = address!("0x40A2aCCbd92BCA938b02010E17A5b8929b49130D");

    #[test]
    fn single_entry_layout() {
        let call = SafeCall::call(
            address!("0x1234567890123456789012345678901234567890"),
            U256::from(1000),
            vec![0xa9, 0x05, 0x9c, 0xbb],
        );
        let encoded = encode(std::slice::from_ref(&call));
        assert_eq!(encoded.len(), 89);
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..21], call.to.as_slice());
        assert_eq!(encoded[51], 0x03);
        assert_eq!(encoded[52], 0xe8);
        assert_eq!(encoded[84], 4);
        assert_eq!(&encoded[85..], &[0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn three_entries_sum_their_lengths() {
        let calls = vec![
            SafeCall::call(Address::repeat_byte(1), U256::ZERO, vec![1; 68]),
            SafeCall::call(Address::repeat_byte(2), U256::ZERO, vec![2; 4]),
            SafeCall::call(Address::repeat_byte(3), U256::from(5), Vec::new()),
        ];
        let expected: usize = calls.iter().map(|c| 85 + c.data.len()).sum();
        assert_eq!(encode(&calls).len(), expected);
    }

    #[test]
    fn wrap_targets_multisend_with_delegate_call() {
        let calls = vec![
            SafeCall::call(Address::repeat_byte(1), U256::ZERO, vec![1]),
            SafeCall::call(Address::repeat_byte(2), U256::ZERO, vec![2]),
        ];
        let wrapped = wrap(MULTISEND, &calls);
        assert_eq!(wrapped.operation, Operation::DelegateCall);
        assert_eq!(wrapped.to, MULTISEND);
        assert_eq!(wrapped.value, U256::ZERO);
        assert_eq!(&wrapped.data[..4], &IMultiSend::multiSendCall::SELECTOR);
        assert_eq!(unwrap_call_data(&wrapped.data).unwrap(), calls);
    }

    #[test]
    fn batch_leaves_single_call_alone() {
        let only = SafeCall::call(Address::repeat_byte(9), U256::ZERO, vec![7]);
        assert_eq!(batch(MULTISEND, std::slice::from_ref(&only)).unwrap(), only);
        assert!(batch(MULTISEND, &[]).is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let call = SafeCall::call(Address::repeat_byte(1), U256::ZERO, vec![1, 2, 3]);
        let encoded = encode(&[call]);
        assert!(decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(decode(&encoded[..40]).is_err());
    }

    fn arb_call() -> impl Strategy<Value = SafeCall> {
        (
            any::<bool>(),
            any::<[u8; 20]>(),
            any::<[u8; 32]>(),
            prop::collection::vec(any::<u8>(), 0..200),
        )
            .prop_map(|(delegate, to, value, data)| SafeCall {
                operation: if delegate {
                    Operation::DelegateCall
                } else {
                    Operation::Call
                },
                to: Address::from(to),
                value: U256::from_be_bytes(value),
                data: Bytes::from(data),
            })
    }

    proptest! {
        #[test]
        fn decode_reverses_encode(calls in prop::collection::vec(arb_call(), 1..8)) {
            let encoded = encode(&calls);
            prop_assert_eq!(
                encoded.len(),
                calls.iter().map(SafeCall::encoded_len).sum::<usize>()
            );
            prop_assert_eq!(decode(&encoded).unwrap(), calls);
        }
    }
}
