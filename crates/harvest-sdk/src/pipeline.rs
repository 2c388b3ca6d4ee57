//! Single composition point wiring provider, store and config together.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use log::{info, warn};

use crate::{
    config::BundlerConfig,
    error::{BundleError, Result},
    format::{Bundle, BundleDocument, BundleFormatter, BundleTarget, OutputKind},
    gas::GasEstimator,
    payload::{Payload, PayloadBuilder},
    progress::Progress,
    proposal::{ProposalClient, ProposalResult, SafeServiceApi},
    records::ClaimInput,
    signing::DigestSigner,
    store::{BundleKey, BundleStore},
    transport::{FeeData, ReadProvider},
};

/// Source of bundle timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A bundle that has been rendered and persisted.
#[derive(Clone, Debug)]
pub struct SavedBundle {
    pub location: String,
    pub bundle: Bundle,
    pub document: BundleDocument,
}

/// What one end-to-end run produced. `saved` survives a failed proposal.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub saved: SavedBundle,
    pub proposal: Option<std::result::Result<ProposalResult, BundleError>>,
}

/// Everything needed to build one bundle.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub target: BundleTarget,
    pub recipient: Option<Address>,
    pub input: ClaimInput,
    pub output: OutputKind,
}

pub struct Bundler {
    provider: Arc<dyn ReadProvider>,
    store: Arc<dyn BundleStore>,
    config: BundlerConfig,
    clock: Arc<dyn Clock>,
    progress: Progress,
}

impl Bundler {
    pub fn new(
        provider: Arc<dyn ReadProvider>,
        store: Arc<dyn BundleStore>,
        config: BundlerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            clock: Arc::new(SystemClock),
            progress: Progress::silent(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    fn ensure_chain(&self) -> Result<()> {
        let reported = self
            .config
            .retry
            .run("chain id", || self.provider.chain_id())?;
        if reported != self.config.chain_id {
            return Err(BundleError::Validation(format!(
                "provider is on chain {reported}, config expects {}",
                self.config.chain_id
            )));
        }
        Ok(())
    }

    /// Builds payloads for `source` and resolves every gas limit.
    pub fn prepare(
        &self,
        source: Address,
        recipient: Option<Address>,
        input: &ClaimInput,
    ) -> Result<Vec<Payload>> {
        self.ensure_chain()?;
        let payloads = PayloadBuilder::new(source, recipient).build_all(input)?;
        if payloads.is_empty() {
            return Ok(payloads);
        }
        let estimator =
            GasEstimator::new(self.provider.as_ref(), self.config.gas, self.config.retry);
        Ok(estimator.estimate_all(source, payloads, &self.progress))
    }

    fn fees(&self) -> FeeData {
        match self.provider.fee_data() {
            Ok(fees) => fees,
            Err(err) => {
                warn!(
                    target: "harvest::format",
                    "fee estimate unavailable ({err}), using configured fees"
                );
                FeeData {
                    max_fee_per_gas: self.config.fees.max_fee_per_gas,
                    max_priority_fee_per_gas: self.config.fees.max_priority_fee_per_gas,
                }
            }
        }
    }

    /// Renders and persists. An empty payload list is refused.
    pub fn format_and_save(
        &self,
        payloads: Vec<Payload>,
        output: OutputKind,
        target: &BundleTarget,
    ) -> Result<SavedBundle> {
        if payloads.is_empty() {
            return Err(BundleError::Validation(format!(
                "nothing to bundle for {}",
                target.wallet_name
            )));
        }
        let fees = if output == OutputKind::Direct {
            self.fees()
        } else {
            FeeData {
                max_fee_per_gas: 0,
                max_priority_fee_per_gas: 0,
            }
        };
        let bundle = Bundle::new(payloads, output, self.clock.now_ms());
        let document = BundleFormatter::new(self.config.chain_id, fees).render(&bundle, target)?;
        let key = BundleKey {
            created_at_ms: bundle.created_at_ms(),
            wallet_name: target.wallet_name.clone(),
            kind: output,
        };
        let location = self.store.save(&key, &document)?;
        Ok(SavedBundle {
            location,
            bundle,
            document,
        })
    }

    /// Proposes a multisig bundle document from `safe`.
    pub fn propose<S: SafeServiceApi>(
        &self,
        safe: Address,
        document: &BundleDocument,
        client: &ProposalClient<S>,
        signer: &dyn DigestSigner,
    ) -> Result<ProposalResult> {
        if !document.kind().is_multisig() {
            return Err(BundleError::Validation(
                "only multisig bundles can be proposed".into(),
            ));
        }
        if let Some(chain_id) = document.chain_id() {
            if chain_id != self.config.chain_id {
                return Err(BundleError::Validation(format!(
                    "bundle targets chain {chain_id}, config expects {}",
                    self.config.chain_id
                )));
            }
        }
        let calls = document.calls()?;
        client.propose(safe, &calls, signer)
    }

    /// Build, estimate, save and (when a proposer is given) propose.
    pub fn run<S: SafeServiceApi>(
        &self,
        request: &RunRequest,
        proposer: Option<(&ProposalClient<S>, &dyn DigestSigner)>,
    ) -> Result<RunReport> {
        let payloads = self.prepare(request.target.address, request.recipient, &request.input)?;
        let saved = self.format_and_save(payloads, request.output, &request.target)?;
        info!(
            target: "harvest::format",
            "bundle for {} saved at {}",
            request.target.wallet_name,
            saved.location
        );
        let proposal = proposer.map(|(client, signer)| {
            self.propose(request.target.address, &saved.document, client, signer)
        });
        if let Some(Err(err)) = &proposal {
            warn!(
                target: "harvest::proposal",
                "proposal failed, bundle kept at {}: {err}",
                saved.location
            );
        }
        Ok(RunReport { saved, proposal })
    }
}
