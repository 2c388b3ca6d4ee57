//! Gas limit resolution with buffered estimates and per-kind fallbacks.

use std::thread;

use alloy_primitives::Address;
use log::{info, warn};

use crate::{
    config::GasConfig,
    error::{BundleError, Result},
    payload::{Payload, PayloadKind},
    progress::Progress,
    retry::RetryPolicy,
    transport::{GasRequest, ReadProvider},
};

/// How a payload's gas limit was decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GasOutcome {
    /// The payload already carried a limit.
    Preset(u64),
    Estimated { raw: u64, buffered: u64 },
    Fallback { limit: u64, reason: BundleError },
}

impl GasOutcome {
    pub fn limit(&self) -> u64 {
        match self {
            GasOutcome::Preset(limit) => *limit,
            GasOutcome::Estimated { buffered, .. } => *buffered,
            GasOutcome::Fallback { limit, .. } => *limit,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GasOutcome::Fallback { .. })
    }
}

pub struct GasEstimator<'a, P: ReadProvider + ?Sized> {
    provider: &'a P,
    config: GasConfig,
    retry: RetryPolicy,
}

impl<'a, P: ReadProvider + ?Sized> GasEstimator<'a, P> {
    pub fn new(provider: &'a P, config: GasConfig, retry: RetryPolicy) -> Self {
        Self {
            provider,
            config,
            retry,
        }
    }

    /// Fixed limit used when simulation fails for a payload of `kind`.
    pub fn fallback_for(&self, kind: PayloadKind) -> u64 {
        match kind {
            PayloadKind::ValidatorBoost => self.config.boost_fallback,
            _ => self.config.default_fallback,
        }
    }

    /// `ceil(estimate * (100 + buffer) / 100)`, saturating at `u64::MAX`.
    pub fn apply_buffer(&self, estimate: u64) -> u64 {
        let scaled = u128::from(estimate) * u128::from(100 + self.config.buffer_percent);
        u64::try_from(scaled.div_ceil(100)).unwrap_or(u64::MAX)
    }

    /// Resolves one payload. Never fails: errors become the kind's fallback.
    pub fn resolve(&self, from: Address, payload: &Payload) -> GasOutcome {
        if let Some(limit) = payload.gas_limit {
            return GasOutcome::Preset(limit);
        }
        let request = GasRequest {
            from,
            to: payload.target,
            data: payload.data.clone(),
            value: payload.value,
        };
        let label = format!("estimate {} -> {}", payload.kind, payload.target);
        match self.estimate_with_retry(&label, &request) {
            Ok(raw) => {
                let buffered = self.apply_buffer(raw);
                info!(
                    target: "harvest::gas",
                    "estimate ok: {} to {} raw={raw} limit={buffered}",
                    payload.kind,
                    payload.target
                );
                GasOutcome::Estimated { raw, buffered }
            }
            Err(reason) => {
                let limit = self.fallback_for(payload.kind);
                warn!(
                    target: "harvest::gas",
                    "estimate FALLBACK: {} to {} limit={limit:#x} ({reason})",
                    payload.kind,
                    payload.target
                );
                GasOutcome::Fallback { limit, reason }
            }
        }
    }

    fn estimate_with_retry(&self, label: &str, request: &GasRequest) -> Result<u64> {
        let raw = self
            .retry
            .run(label, || self.provider.estimate_gas(request))?;
        if raw == 0 {
            return Err(BundleError::Estimation("provider returned zero gas".into()));
        }
        Ok(raw)
    }

    /// Fills in every missing gas limit, issuing at most `concurrency`
    /// estimates at a time. Output order matches input order.
    pub fn estimate_all(
        &self,
        from: Address,
        payloads: Vec<Payload>,
        progress: &Progress,
    ) -> Vec<Payload> {
        let total = payloads.len();
        let batch = self.config.concurrency.max(1);
        let mut resolved = Vec::with_capacity(total);
        let mut fallbacks = 0usize;

        for chunk in payloads.chunks(batch) {
            let outcomes: Vec<GasOutcome> = thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|payload| scope.spawn(move || self.resolve(from, payload)))
                    .collect();
                handles
                    .into_iter()
                    .zip(chunk)
                    .map(|(handle, payload)| {
                        handle.join().unwrap_or_else(|_| GasOutcome::Fallback {
                            limit: self.fallback_for(payload.kind),
                            reason: BundleError::Estimation("estimator thread panicked".into()),
                        })
                    })
                    .collect()
            });
            for (payload, outcome) in chunk.iter().zip(outcomes) {
                if outcome.is_fallback() {
                    fallbacks += 1;
                }
                resolved.push(payload.clone().with_gas_limit(outcome.limit()));
                progress.emit(
                    resolved.len(),
                    total,
                    format!("gas resolved for {}", payload.kind),
                );
            }
        }

        info!(
            target: "harvest::gas",
            "resolved gas for {total} payload(s), {fallbacks} fallback(s)"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadMeta;
    use crate::transport::FeeData;
    use alloy_primitives::{address, Bytes, U256};
    use std::sync::{mpsc::channel, Arc, Mutex};

    const FROM: Address = address!("0x1111111111111111111111111111111111111111");

    /// Scripted provider: answers by target, logging every request.
    #[derive(Clone, Default)]
    struct MockProvider {
        answers: Arc<Mutex<Vec<(Address, Result<u64>)>>>,
        calls: Arc<Mutex<Vec<Address>>>,
    }

    impl MockProvider {
        fn answer(self, to: Address, result: Result<u64>) -> Self {
            self.answers.lock().unwrap().push((to, result));
            self
        }
    }

    impl ReadProvider for MockProvider {
        fn chain_id(&self) -> Result<u64> {
            Ok(1)
        }

        fn estimate_gas(&self, request: &GasRequest) -> Result<u64> {
            self.calls.lock().unwrap().push(request.to);
            self.answers
                .lock()
                .unwrap()
                .iter()
                .find(|(to, _)| *to == request.to)
                .map(|(_, result)| result.clone())
                .unwrap_or(Err(BundleError::Estimation("execution reverted".into())))
        }

        fn fee_data(&self) -> Result<FeeData> {
            Err(BundleError::Network("unused".into()))
        }
    }

    fn payload(target: Address, kind: PayloadKind) -> Payload {
        Payload::new(
            target,
            Bytes::new(),
            U256::ZERO,
            kind,
            PayloadMeta::Boost {
                validator: "v".into(),
                allocation_bps: 10_000,
            },
        )
    }

    fn instant_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    #[test]
    fn buffer_rounds_up() {
        let provider = MockProvider::default();
        let estimator = GasEstimator::new(&provider, GasConfig::default(), RetryPolicy::NONE);
        assert_eq!(estimator.apply_buffer(100_000), 120_000);
        assert_eq!(estimator.apply_buffer(1), 2);
        assert_eq!(estimator.apply_buffer(21_001), 25_202);
    }

    #[test]
    fn boost_failure_uses_boost_fallback() {
        let target = address!("0x2222222222222222222222222222222222222222");
        let provider = MockProvider::default();
        let estimator = GasEstimator::new(&provider, GasConfig::default(), RetryPolicy::NONE);
        let outcome = estimator.resolve(FROM, &payload(target, PayloadKind::ValidatorBoost));
        assert!(outcome.is_fallback());
        assert_eq!(outcome.limit(), 0x100000);

        let outcome = estimator.resolve(FROM, &payload(target, PayloadKind::ClaimVault));
        assert_eq!(outcome.limit(), 500_000);
    }

    #[test]
    fn transient_failures_are_retried_before_fallback() {
        let target = address!("0x3333333333333333333333333333333333333333");
        let provider =
            MockProvider::default().answer(target, Err(BundleError::Network("timeout".into())));
        let estimator = GasEstimator::new(&provider, GasConfig::default(), instant_retry());
        let outcome = estimator.resolve(FROM, &payload(target, PayloadKind::Swap));
        assert_eq!(outcome.limit(), 500_000);
        assert_eq!(provider.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn zero_estimate_takes_fallback() {
        let target = address!("0x5555555555555555555555555555555555555555");
        let provider = MockProvider::default().answer(target, Ok(0));
        let config = GasConfig::default();
        let estimator = GasEstimator::new(&provider, config, RetryPolicy::NONE);
        let outcome = estimator.resolve(FROM, &payload(target, PayloadKind::ClaimVault));
        assert!(outcome.is_fallback());
        assert_eq!(outcome.limit(), config.default_fallback);
        assert_ne!(outcome.limit(), 0);
    }

    #[test]
    fn preset_limits_are_not_estimated() {
        let target = address!("0x4444444444444444444444444444444444444444");
        let provider = MockProvider::default();
        let estimator = GasEstimator::new(&provider, GasConfig::default(), RetryPolicy::NONE);
        let preset = payload(target, PayloadKind::Approval).with_gas_limit(42_000);
        assert_eq!(estimator.resolve(FROM, &preset), GasOutcome::Preset(42_000));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn batches_preserve_order_and_report_progress() {
        let targets: Vec<Address> = (1u8..=5)
            .map(|i| Address::from([i; 20]))
            .collect();
        let mut provider = MockProvider::default();
        for (i, target) in targets.iter().enumerate() {
            if i != 2 {
                provider = provider.answer(*target, Ok(10_000 * (i as u64 + 1)));
            }
        }
        let config = GasConfig {
            concurrency: 2,
            ..GasConfig::default()
        };
        let estimator = GasEstimator::new(&provider, config, RetryPolicy::NONE);
        let payloads: Vec<Payload> = targets
            .iter()
            .map(|t| payload(*t, PayloadKind::ClaimStaker))
            .collect();

        let (tx, rx) = channel();
        let resolved = estimator.estimate_all(FROM, payloads, &Progress::new(tx));
        let limits: Vec<u64> = resolved.iter().map(|p| p.gas_limit.unwrap()).collect();
        assert_eq!(limits, vec![12_000, 24_000, 500_000, 48_000, 60_000]);
        assert_eq!(
            resolved.iter().map(|p| p.target).collect::<Vec<_>>(),
            targets
        );

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 5);
        assert_eq!(events.last().unwrap().completed, 5);
        assert!(events.iter().all(|e| e.total == 5));
    }
}
