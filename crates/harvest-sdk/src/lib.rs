//! Reward bundle assembly and Safe multisig proposal signing.
//!
//! Records flow through [`PayloadBuilder`] and [`GasEstimator`] into a
//! persisted bundle ([`BundleFormatter`], [`BundleStore`]). Multisig bundles
//! are then batched ([`multisend`]), hashed ([`SafeTransaction`]), signed
//! ([`DigestSigner`]) and proposed ([`ProposalClient`]). [`Bundler`] wires
//! these together.

pub mod config;
pub mod contracts;
pub mod error;
pub mod format;
pub mod gas;
pub mod multisend;
pub mod payload;
pub mod pipeline;
pub mod progress;
pub mod proposal;
pub mod records;
pub mod retry;
pub mod safe_tx;
pub mod signing;
pub mod store;
pub mod transport;

pub use config::{BundlerConfig, FeeConfig, GasConfig, MULTISEND_CALL_ONLY};
pub use error::{BundleError, Result};
pub use format::{
    describe, parse_quantity, Bundle, BundleDocument, BundleFormatter, BundleSummary,
    BundleTarget, OutputKind,
};
pub use gas::{GasEstimator, GasOutcome};
pub use multisend::{Operation, SafeCall};
pub use payload::{Payload, PayloadBuilder, PayloadKind, PayloadMeta};
pub use pipeline::{Bundler, Clock, RunReport, RunRequest, SavedBundle, SystemClock};
pub use progress::{Progress, ProgressEvent};
pub use proposal::{ProposalClient, ProposalResult, ProposalStatus, SafeServiceApi};
pub use records::{BoostCall, ClaimInput, RewardKind, RewardRecord, RewardToken, SwapRequest};
pub use retry::RetryPolicy;
pub use safe_tx::{SafeTransaction, SafeTxDigest};
pub use signing::{CredentialService, CredentialSigner, DigestSigner, LocalKeySigner, PackedSignature};
pub use store::{BundleKey, BundleStore, FsBundleStore, InMemoryStore};
pub use transport::{AlloyHttpTransport, EvmCall, EvmTransport, FeeData, GasRequest, ReadProvider};
