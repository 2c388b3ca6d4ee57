//! Proposal flow against the Safe Transaction Service:
//! fetch nonce, build the canonical transaction, hash, sign, submit.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{hex, Address, B256};
use log::{info, warn};
use parking_lot::Mutex;
use safe_service::{
    MultisigTransaction, ProposeTransactionRequest, SafeInfo, SafeServiceClient, ServiceError,
};

use crate::{
    config::BundlerConfig,
    error::{BundleError, Result},
    multisend::{self, SafeCall},
    retry::RetryPolicy,
    safe_tx::SafeTransaction,
    signing::{DigestSigner, PackedSignature},
};

/// The coordination-service calls the proposal flow depends on.
pub trait SafeServiceApi: Send + Sync {
    fn safe_info(&self, safe: Address) -> std::result::Result<SafeInfo, ServiceError>;
    fn propose(
        &self,
        safe: Address,
        request: &ProposeTransactionRequest,
    ) -> std::result::Result<(), ServiceError>;
    fn transaction(&self, safe_tx_hash: B256) -> std::result::Result<MultisigTransaction, ServiceError>;
    fn confirm(
        &self,
        safe_tx_hash: B256,
        signature: &PackedSignature,
    ) -> std::result::Result<(), ServiceError>;
}

impl SafeServiceApi for SafeServiceClient {
    fn safe_info(&self, safe: Address) -> std::result::Result<SafeInfo, ServiceError> {
        SafeServiceClient::safe_info(self, &safe.to_checksum(None))
    }

    fn propose(
        &self,
        safe: Address,
        request: &ProposeTransactionRequest,
    ) -> std::result::Result<(), ServiceError> {
        self.propose_transaction(&safe.to_checksum(None), request)
    }

    fn transaction(&self, safe_tx_hash: B256) -> std::result::Result<MultisigTransaction, ServiceError> {
        self.multisig_transaction(&hex::encode_prefixed(safe_tx_hash))
    }

    fn confirm(
        &self,
        safe_tx_hash: B256,
        signature: &PackedSignature,
    ) -> std::result::Result<(), ServiceError> {
        self.confirm_transaction(&hex::encode_prefixed(safe_tx_hash), &signature.to_hex())
    }
}

/// Outcome of one submission attempt. Produced once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalResult {
    /// Hash the service stored the proposal under.
    pub safe_tx_hash: B256,
    pub nonce: u64,
    pub accepted: bool,
    pub tracking_url: String,
    /// Set when the known-good fallback digest was submitted instead of ours.
    pub used_fallback: bool,
    pub error: Option<BundleError>,
}

/// Current service-side state of a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalStatus {
    pub safe: String,
    pub nonce: u64,
    pub safe_tx_hash: B256,
    pub confirmations: Vec<String>,
    pub confirmations_required: Option<u64>,
    pub is_executed: bool,
}

/// Maps a service failure into the crate taxonomy. `local` is the digest we
/// submitted, if the failure happened after one existed.
pub fn classify(err: ServiceError, local: Option<B256>) -> BundleError {
    if err.is_transient() {
        return BundleError::Network(err.to_string());
    }
    if let (true, Some(local)) = (err.is_hash_mismatch(), local) {
        let reported = err
            .reported_hash()
            .and_then(|hash| B256::from_str(&hash).ok());
        return BundleError::DigestMismatch {
            local,
            reported,
            message: err.to_string(),
        };
    }
    match err {
        ServiceError::Rejected { status, body } => BundleError::Submission {
            status,
            message: body,
        },
        ServiceError::Url(err) => BundleError::Validation(format!("service url: {err}")),
        other => BundleError::Submission {
            status: 0,
            message: other.to_string(),
        },
    }
}

/// Builds the wire body: checksummed addresses, decimal numbers, `null` for empty data.
pub fn to_request(
    tx: &SafeTransaction,
    safe_tx_hash: B256,
    sender: Address,
    signature: &PackedSignature,
    origin: Option<String>,
) -> Result<ProposeTransactionRequest> {
    let nonce = u64::try_from(tx.nonce)
        .map_err(|_| BundleError::Validation(format!("nonce {} does not fit u64", tx.nonce)))?;
    Ok(ProposeTransactionRequest {
        to: tx.to.to_checksum(None),
        value: tx.value.to_string(),
        data: (!tx.data.is_empty()).then(|| hex::encode_prefixed(&tx.data)),
        operation: tx.operation.as_u8(),
        safe_tx_gas: tx.safe_tx_gas.to_string(),
        base_gas: tx.base_gas.to_string(),
        gas_price: tx.gas_price.to_string(),
        gas_token: tx.gas_token.to_checksum(None),
        refund_receiver: tx.refund_receiver.to_checksum(None),
        nonce,
        contract_transaction_hash: hex::encode_prefixed(safe_tx_hash),
        sender: sender.to_checksum(None),
        signature: signature.to_hex(),
        origin,
    })
}

pub struct ProposalClient<S> {
    service: S,
    chain_id: u64,
    multisend: Address,
    safe_ui_url: String,
    chain_short_name: String,
    origin: Option<String>,
    fallback_digest: Option<B256>,
    retry: RetryPolicy,
    locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl<S: SafeServiceApi> ProposalClient<S> {
    pub fn new(service: S, config: &BundlerConfig) -> Self {
        Self {
            service,
            chain_id: config.chain_id,
            multisend: config.multisend_address,
            safe_ui_url: config.safe_ui_url.trim_end_matches('/').to_string(),
            chain_short_name: config.chain_short_name.clone(),
            origin: (!config.origin.is_empty()).then(|| config.origin.clone()),
            fallback_digest: config.fallback_digest,
            retry: config.retry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Deep link into the Safe UI transaction queue for `safe`.
    pub fn tracking_url(&self, safe: Address) -> String {
        format!(
            "{}/transactions/queue?safe={}:{}",
            self.safe_ui_url,
            self.chain_short_name,
            safe.to_checksum(None)
        )
    }

    fn lock_for(&self, safe: Address) -> Arc<Mutex<()>> {
        self.locks.lock().entry(safe).or_default().clone()
    }

    /// Current nonce as the service reports it.
    pub fn fetch_nonce(&self, safe: Address) -> Result<u64> {
        let info = self.retry.run("fetch nonce", || {
            self.service
                .safe_info(safe)
                .map_err(|err| classify(err, None))
        })?;
        Ok(info.nonce)
    }

    /// Transaction the Safe executes for `calls`: the call itself, or a
    /// multisend wrapper when there is more than one.
    pub fn canonical_transaction(&self, calls: &[SafeCall], nonce: u64) -> Result<SafeTransaction> {
        let call = multisend::batch(self.multisend, calls)?;
        Ok(SafeTransaction::from_call(&call, nonce))
    }

    /// Proposes `calls` from `safe`, signed by `signer`.
    ///
    /// Failures before a digest exists (nonce lookup, encoding, signing) are
    /// returned as errors. Service rejections after that are reported inside
    /// the result so the caller still learns the digest.
    pub fn propose(
        &self,
        safe: Address,
        calls: &[SafeCall],
        signer: &dyn DigestSigner,
    ) -> Result<ProposalResult> {
        let lock = self.lock_for(safe);
        let _guard = lock.lock();

        let nonce = self.fetch_nonce(safe)?;
        let tx = self.canonical_transaction(calls, nonce)?;
        let digest = tx.safe_tx_hash(self.chain_id, safe);
        info!(
            target: "harvest::proposal",
            "proposing {} call(s) from {safe} at nonce {nonce}, safeTxHash {digest}",
            calls.len()
        );

        let signature = signer.sign_digest(digest)?;
        let request = to_request(&tx, digest, signer.address(), &signature, self.origin.clone())?;

        match self.submit(safe, &request, digest) {
            Ok(()) => Ok(self.accepted(safe, digest, nonce, false)),
            Err(BundleError::DigestMismatch {
                local,
                reported,
                message,
            }) => self.fallback(safe, &tx, signer, nonce, local, reported, message),
            Err(err) => Ok(self.rejected(safe, digest, nonce, err)),
        }
    }

    fn submit(&self, safe: Address, request: &ProposeTransactionRequest, digest: B256) -> Result<()> {
        self.retry.run("submit proposal", || {
            self.service
                .propose(safe, request)
                .map_err(|err| classify(err, Some(digest)))
        })
    }

    /// One-shot resubmission under the configured known-good digest. This
    /// only helps when that digest actually belongs to this transaction.
    #[allow(clippy::too_many_arguments)]
    fn fallback(
        &self,
        safe: Address,
        tx: &SafeTransaction,
        signer: &dyn DigestSigner,
        nonce: u64,
        local: B256,
        reported: Option<B256>,
        message: String,
    ) -> Result<ProposalResult> {
        let mismatch = BundleError::DigestMismatch {
            local,
            reported,
            message,
        };
        let Some(fallback) = self.fallback_digest.filter(|fallback| *fallback != local) else {
            warn!(
                target: "harvest::proposal",
                "digest mismatch for {safe}: local {local}, service {reported:?}; no fallback digest configured"
            );
            return Ok(self.rejected(safe, local, nonce, mismatch));
        };
        warn!(
            target: "harvest::proposal",
            "digest mismatch for {safe}: local {local}, service {reported:?}; retrying once with fallback {fallback}"
        );

        let signature = signer.sign_digest(fallback)?;
        let request = to_request(tx, fallback, signer.address(), &signature, self.origin.clone())?;
        match self.submit(safe, &request, fallback) {
            Ok(()) => Ok(self.accepted(safe, fallback, nonce, true)),
            Err(err) => {
                warn!(
                    target: "harvest::proposal",
                    "fallback submission for {safe} failed: {err}"
                );
                let error = match err {
                    BundleError::DigestMismatch { .. } => mismatch,
                    other => other,
                };
                let mut result = self.rejected(safe, local, nonce, error);
                result.used_fallback = true;
                Ok(result)
            }
        }
    }

    fn accepted(&self, safe: Address, hash: B256, nonce: u64, used_fallback: bool) -> ProposalResult {
        info!(
            target: "harvest::proposal",
            "proposal {hash} accepted for {safe}"
        );
        ProposalResult {
            safe_tx_hash: hash,
            nonce,
            accepted: true,
            tracking_url: self.tracking_url(safe),
            used_fallback,
            error: None,
        }
    }

    fn rejected(&self, safe: Address, hash: B256, nonce: u64, error: BundleError) -> ProposalResult {
        warn!(
            target: "harvest::proposal",
            "proposal {hash} for {safe} rejected: {error}"
        );
        ProposalResult {
            safe_tx_hash: hash,
            nonce,
            accepted: false,
            tracking_url: self.tracking_url(safe),
            used_fallback: false,
            error: Some(error),
        }
    }

    pub fn status(&self, safe_tx_hash: B256) -> Result<ProposalStatus> {
        let tx = self.retry.run("fetch proposal", || {
            self.service
                .transaction(safe_tx_hash)
                .map_err(|err| classify(err, None))
        })?;
        Ok(ProposalStatus {
            safe: tx.safe,
            nonce: tx.nonce,
            safe_tx_hash,
            confirmations: tx.confirmations.into_iter().map(|c| c.owner).collect(),
            confirmations_required: tx.confirmations_required,
            is_executed: tx.is_executed,
        })
    }

    /// Adds `signer`'s confirmation to an existing proposal.
    pub fn confirm(&self, safe_tx_hash: B256, signer: &dyn DigestSigner) -> Result<ProposalResult> {
        let status = self.status(safe_tx_hash)?;
        let safe = Address::from_str(&status.safe).map_err(|err| {
            BundleError::Validation(format!("service returned safe {:?}: {err}", status.safe))
        })?;
        if status.is_executed {
            return Err(BundleError::Validation(format!(
                "proposal {safe_tx_hash} was already executed"
            )));
        }
        let owner = signer.address();
        let already = status
            .confirmations
            .iter()
            .any(|c| Address::from_str(c).is_ok_and(|addr| addr == owner));
        if already {
            info!(
                target: "harvest::proposal",
                "{owner} already confirmed {safe_tx_hash}"
            );
            return Ok(self.accepted(safe, safe_tx_hash, status.nonce, false));
        }

        let signature = signer.sign_digest(safe_tx_hash)?;
        let lock = self.lock_for(safe);
        let _guard = lock.lock();
        let submitted = self.retry.run("confirm proposal", || {
            self.service
                .confirm(safe_tx_hash, &signature)
                .map_err(|err| classify(err, None))
        });
        Ok(match submitted {
            Ok(()) => self.accepted(safe, safe_tx_hash, status.nonce, false),
            Err(err) => self.rejected(safe, safe_tx_hash, status.nonce, err),
        })
    }
}
