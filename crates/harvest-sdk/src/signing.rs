//! Raw digest signing for Safe proposals.
//!
//! The digest is signed as-is (no EIP-191 prefix), which is what the Safe
//! contract expects for owner signatures with `v` in `{27, 28}`.

use std::fmt;

use alloy_primitives::{hex, Address, PrimitiveSignature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use crate::error::{BundleError, Result};

/// `r (32) || s (32) || v (1)`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PackedSignature([u8; 65]);

impl PackedSignature {
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 65] = bytes.try_into().map_err(|_| {
            BundleError::Signing(format!("signature must be 65 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[32..64]
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(self.0)
    }

    /// Address that produced this signature over `digest`.
    pub fn recover(&self, digest: B256) -> Result<Address> {
        let signature = PrimitiveSignature::from_raw(&self.0)
            .map_err(|err| BundleError::Signing(format!("malformed signature: {err}")))?;
        signature
            .recover_address_from_prehash(&digest)
            .map_err(|err| BundleError::Signing(format!("recovery failed: {err}")))
    }
}

impl fmt::Debug for PackedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackedSignature({})", self.to_hex())
    }
}

/// Something that can sign a 32-byte digest on behalf of one address.
pub trait DigestSigner: Send + Sync {
    fn address(&self) -> Address;
    fn sign_digest(&self, digest: B256) -> Result<PackedSignature>;
}

/// Signs with a private key held in memory.
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    pub fn new(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }

    pub fn from_hex(private_key_hex: &str) -> Result<Self> {
        let inner: PrivateKeySigner = private_key_hex
            .trim()
            .parse()
            .map_err(|_| BundleError::Signing("invalid private key".into()))?;
        Ok(Self { inner })
    }
}

impl DigestSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_digest(&self, digest: B256) -> Result<PackedSignature> {
        let signature = self
            .inner
            .sign_hash_sync(&digest)
            .map_err(|err| BundleError::Signing(err.to_string()))?;
        Ok(PackedSignature(signature.as_bytes()))
    }
}

/// External credential store that decrypts a key and signs on request.
pub trait CredentialService: Send + Sync {
    fn sign(&self, digest: B256, address: Address, password: &str) -> Result<PackedSignature>;
}

/// Binds a credential service to one owner address and checks that every
/// signature it returns recovers to that address.
pub struct CredentialSigner<C> {
    service: C,
    address: Address,
    password: String,
}

impl<C: CredentialService> CredentialSigner<C> {
    pub fn new(service: C, address: Address, password: impl Into<String>) -> Self {
        Self {
            service,
            address,
            password: password.into(),
        }
    }
}

impl<C: CredentialService> DigestSigner for CredentialSigner<C> {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: B256) -> Result<PackedSignature> {
        let signature = self.service.sign(digest, self.address, &self.password)?;
        let recovered = signature.recover(digest)?;
        if recovered != self.address {
            return Err(BundleError::Signing(format!(
                "credentials for {} produced a signature from {recovered}",
                self.address
            )));
        }
        Ok(signature)
    }
}
