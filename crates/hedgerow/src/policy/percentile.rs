// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use super::fixed::DEFAULT_MAX_HEDGES;
use super::{HedgeDecision, HedgePolicy};
use crate::estimator::LatencyEstimator;
use crate::listener::{AttemptReport, HedgeListener};
use crate::utils::EnableIf;
use crate::{ConfigError, ListenerError, PolicyError};

pub(crate) const DEFAULT_MIN_SAMPLES: u64 = 1;

/// Hedges after the latency that a given fraction of recent successful attempts stayed under.
///
/// With a percentile of `0.95`, a hedge is issued once the original attempt has taken longer
/// than 95% of the successful attempts recorded by the estimator. Only the slowest 5% of
/// requests are hedged, which keeps the extra load low while cutting the tail.
///
/// Until the estimator holds at least [`min_samples`][Self::min_samples] samples the policy
/// disables hedging: without data, the delay would be zero and every request would be hedged
/// immediately.
///
/// The policy also implements [`HedgeListener`], forwarding reports to its estimator, so it can
/// be registered as its own feedback source.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use hedgerow::estimator::{EstimatorOptions, LatencyEstimator};
/// use hedgerow::policy::{HedgePolicy, PercentilePolicy};
/// use tick::Clock;
///
/// let estimator = Arc::new(LatencyEstimator::new(&Clock::new_frozen(), EstimatorOptions::default()));
/// let policy = PercentilePolicy::<String>::new(Arc::clone(&estimator), 0.9)?
///     .max_hedges(2)
///     .enable_if(|request| request.starts_with("GET"));
///
/// // No samples yet: hedging stays off.
/// assert!(!policy.decide(&"GET /".to_string())?.is_hedging());
///
/// for millis in 1..=100 {
///     estimator.record(Duration::from_millis(millis), true);
/// }
///
/// let decision = policy.decide(&"GET /".to_string())?;
/// assert_eq!(decision.max_hedges(), 2);
/// assert!(decision.delay() >= Some(Duration::from_millis(90)));
///
/// // The predicate rejects writes.
/// assert_eq!(policy.decide(&"POST /".to_string())?.max_hedges(), 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PercentilePolicy<In> {
    estimator: Arc<LatencyEstimator>,
    percentile: f64,
    max_hedges: u32,
    min_samples: u64,
    enable_if: EnableIf<In>,
}

impl<In> PercentilePolicy<In> {
    /// Creates a policy that hedges at `percentile` of the latencies tracked by `estimator`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `percentile` is not within `[0, 1]`.
    pub fn new(estimator: Arc<LatencyEstimator>, percentile: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&percentile) {
            return Err(ConfigError::caused_by(format!("percentile must be within [0, 1], got {percentile}")));
        }

        Ok(Self {
            estimator,
            percentile,
            max_hedges: DEFAULT_MAX_HEDGES,
            min_samples: DEFAULT_MIN_SAMPLES,
            enable_if: EnableIf::always(),
        })
    }

    /// Sets how many hedges a request may receive.
    ///
    /// **Default**: 1
    #[must_use]
    pub fn max_hedges(mut self, max_hedges: u32) -> Self {
        self.max_hedges = max_hedges;
        self
    }

    /// Sets how many samples the estimator window must hold before hedging starts.
    ///
    /// **Default**: 1
    #[must_use]
    pub fn min_samples(mut self, min_samples: u64) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Restricts hedging to requests accepted by `predicate`. Other requests get no hedges.
    #[must_use]
    pub fn enable_if(mut self, predicate: impl Fn(&In) -> bool + Send + Sync + 'static) -> Self {
        self.enable_if = EnableIf::new(predicate);
        self
    }

    /// The estimator the delay is read from.
    #[must_use]
    pub fn estimator(&self) -> &Arc<LatencyEstimator> {
        &self.estimator
    }

    /// The configured percentile, within `[0, 1]`.
    #[must_use]
    pub fn percentile(&self) -> f64 {
        self.percentile
    }
}

impl<In> HedgePolicy<In> for PercentilePolicy<In> {
    fn decide(&self, input: &In) -> Result<HedgeDecision, PolicyError> {
        if !self.enable_if.call(input) {
            return Ok(HedgeDecision::no_hedges());
        }

        if self.estimator.sample_count() < self.min_samples {
            return Ok(HedgeDecision::disabled());
        }

        Ok(HedgeDecision::new(self.max_hedges, self.estimator.percentile(self.percentile)))
    }
}

impl<In, Out> HedgeListener<In, Out> for PercentilePolicy<In> {
    fn on_attempt_complete(&self, report: &AttemptReport<'_, In, Out>) -> Result<(), ListenerError> {
        self.estimator.record(report.elapsed(), report.is_success());
        Ok(())
    }
}

impl<In> Clone for PercentilePolicy<In> {
    fn clone(&self) -> Self {
        Self {
            estimator: Arc::clone(&self.estimator),
            percentile: self.percentile,
            max_hedges: self.max_hedges,
            min_samples: self.min_samples,
            enable_if: self.enable_if.clone(),
        }
    }
}

impl<In> Debug for PercentilePolicy<In> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PercentilePolicy")
            .field("percentile", &self.percentile)
            .field("max_hedges", &self.max_hedges)
            .field("min_samples", &self.min_samples)
            .field("estimator", &self.estimator)
            .finish_non_exhaustive()
    }
}
