//! EIP-712 digest of a Safe transaction, computed exactly as the Safe
//! contract's `getTransactionHash` does.

use alloy_primitives::{b256, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;

use crate::{
    error::{BundleError, Result},
    multisend::{Operation, SafeCall},
};

/// keccak256("SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)")
pub const SAFE_TX_TYPEHASH: B256 =
    b256!("0xbb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8");

/// keccak256("EIP712Domain(uint256 chainId,address verifyingContract)")
pub const DOMAIN_SEPARATOR_TYPEHASH: B256 =
    b256!("0x47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218");

/// The fields a Safe signs over. Gas refund fields stay zero for proposals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

/// Every intermediate hash, for offline diagnosis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SafeTxDigest {
    pub domain_separator: B256,
    pub struct_hash: B256,
    pub hash: B256,
}

impl SafeTransaction {
    pub fn from_call(call: &SafeCall, nonce: u64) -> Self {
        Self {
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            operation: call.operation,
            nonce: U256::from(nonce),
            ..Self::default()
        }
    }

    pub fn struct_hash(&self) -> B256 {
        let encoded = (
            SAFE_TX_TYPEHASH,
            self.to,
            self.value,
            keccak256(&self.data),
            U256::from(self.operation.as_u8()),
            self.safe_tx_gas,
            self.base_gas,
            self.gas_price,
            self.gas_token,
            self.refund_receiver,
            self.nonce,
        )
            .abi_encode();
        keccak256(encoded)
    }

    /// `keccak256(0x19 || 0x01 || domainSeparator || structHash)`.
    pub fn safe_tx_hash(&self, chain_id: u64, safe: Address) -> B256 {
        self.digest(chain_id, safe).hash
    }

    pub fn digest(&self, chain_id: u64, safe: Address) -> SafeTxDigest {
        let domain_separator = domain_separator(chain_id, safe);
        let struct_hash = self.struct_hash();
        let mut preimage = [0u8; 66];
        preimage[0] = 0x19;
        preimage[1] = 0x01;
        preimage[2..34].copy_from_slice(domain_separator.as_slice());
        preimage[34..].copy_from_slice(struct_hash.as_slice());
        SafeTxDigest {
            domain_separator,
            struct_hash,
            hash: keccak256(preimage),
        }
    }
}

pub fn domain_separator(chain_id: u64, safe: Address) -> B256 {
    keccak256((DOMAIN_SEPARATOR_TYPEHASH, U256::from(chain_id), safe).abi_encode())
}

/// Normalises hex call data: optional `0x`, any case, `"0x"` or `""` for empty.
pub fn canonical_data(raw: &str) -> Result<Bytes> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|err| BundleError::Validation(format!("call data {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::{sol, Eip712Domain, SolStruct};
    use proptest::prelude::*;

    sol! {
        struct SafeTx {
            address to;
            uint256 value;
            bytes data;
            uint8 operation;
            uint256 safeTxGas;
            uint256 baseGas;
            uint256 gasPrice;
            address gasToken;
            address refundReceiver;
            uint256 nonce;
        }
    }

    const SAFE: Address = address!("0x9999999999999999999999999999999999999999");

    fn sample() -> SafeTransaction {
        SafeTransaction {
            to: address!("0x40A2aCCbd92BCA938b02010E17A5b8929b49130D"),
            value: U256::ZERO,
            data: Bytes::from(vec![0x8d, 0x80, 0xff, 0x0a, 0x00, 0x01]),
            operation: Operation::DelegateCall,
            nonce: U256::from(12u64),
            ..SafeTransaction::default()
        }
    }

    fn via_typed_data(tx: &SafeTransaction, chain_id: u64, safe: Address) -> (B256, B256) {
        let typed = SafeTx {
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
            operation: tx.operation.as_u8(),
            safeTxGas: tx.safe_tx_gas,
            baseGas: tx.base_gas,
            gasPrice: tx.gas_price,
            gasToken: tx.gas_token,
            refundReceiver: tx.refund_receiver,
            nonce: tx.nonce,
        };
        let domain = Eip712Domain::new(None, None, Some(U256::from(chain_id)), Some(safe), None);
        (domain.separator(), typed.eip712_signing_hash(&domain))
    }

    #[test]
    fn typehashes_match_type_strings() {
        assert_eq!(
            keccak256("SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)"),
            SAFE_TX_TYPEHASH
        );
        assert_eq!(
            keccak256("EIP712Domain(uint256 chainId,address verifyingContract)"),
            DOMAIN_SEPARATOR_TYPEHASH
        );
    }

    #[test]
    fn manual_digest_matches_typed_data_encoder() {
        let tx = sample();
        let digest = tx.digest(1, SAFE);
        let (separator, expected) = via_typed_data(&tx, 1, SAFE);
        assert_eq!(digest.domain_separator, separator);
        assert_eq!(digest.hash, expected);
    }

    #[test]
    fn struct_hash_pads_operation_like_uint8() {
        for operation in [Operation::Call, Operation::DelegateCall] {
            let tx = SafeTransaction {
                operation,
                ..sample()
            };
            let typed = SafeTx {
                to: tx.to,
                value: tx.value,
                data: tx.data.clone(),
                operation: operation.as_u8(),
                safeTxGas: tx.safe_tx_gas,
                baseGas: tx.base_gas,
                gasPrice: tx.gas_price,
                gasToken: tx.gas_token,
                refundReceiver: tx.refund_receiver,
                nonce: tx.nonce,
            };
            assert_eq!(tx.struct_hash(), typed.eip712_hash_struct());
        }
    }

    #[test]
    fn every_field_changes_the_digest() {
        let base = sample().safe_tx_hash(1, SAFE);
        let mut other = sample();
        other.nonce = U256::from(13u64);
        assert_ne!(other.safe_tx_hash(1, SAFE), base);
        let mut other = sample();
        other.operation = Operation::Call;
        assert_ne!(other.safe_tx_hash(1, SAFE), base);
        assert_ne!(sample().safe_tx_hash(8453, SAFE), base);
        assert_ne!(sample().safe_tx_hash(1, Address::repeat_byte(1)), base);
    }

    #[test]
    fn data_canonicalisation_ignores_case_and_prefix() {
        let upper = canonical_data("0xDEADbeef").unwrap();
        let bare = canonical_data("deadbeef").unwrap();
        assert_eq!(upper, bare);
        assert!(canonical_data("0x").unwrap().is_empty());
        assert!(canonical_data("").unwrap().is_empty());
        assert!(canonical_data("0xabc").is_err());
    }

    proptest! {
        #[test]
        fn digest_is_deterministic(
            to in any::<[u8; 20]>(),
            value in any::<u64>(),
            data in prop::collection::vec(any::<u8>(), 0..128),
            delegate in any::<bool>(),
            nonce in any::<u64>(),
            chain_id in 1u64..100_000,
        ) {
            let tx = SafeTransaction {
                to: Address::from(to),
                value: U256::from(value),
                data: Bytes::from(data),
                operation: if delegate { Operation::DelegateCall } else { Operation::Call },
                nonce: U256::from(nonce),
                ..SafeTransaction::default()
            };
            let first = tx.safe_tx_hash(chain_id, SAFE);
            prop_assert_eq!(first, tx.clone().safe_tx_hash(chain_id, SAFE));
            prop_assert_eq!(first, via_typed_data(&tx, chain_id, SAFE).1);
        }
    }
}
