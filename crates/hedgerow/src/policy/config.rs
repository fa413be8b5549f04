// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use tick::Clock;

use super::PercentilePolicy;
use super::fixed::DEFAULT_MAX_HEDGES;
use super::percentile::DEFAULT_MIN_SAMPLES;
use crate::ConfigError;
use crate::estimator::{DEFAULT_MAX_LATENCY, DEFAULT_ROTATIONS, DEFAULT_WINDOW, EstimatorOptions, LatencyEstimator};

const DEFAULT_PERCENTILE: f64 = 0.95;

/// Declarative configuration of a [`PercentilePolicy`] and the estimator behind it.
///
/// With the `serde` feature the configuration can be loaded from any serde format. Durations
/// are written as ISO 8601 (`"PT2M"`) or in the friendly format (`"2m"`, `"1.5s"`). Missing
/// fields take their default values.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hedgerow::policy::PercentilePolicyConfig;
/// use tick::Clock;
///
/// let config = PercentilePolicyConfig {
///     percentile: 0.99,
///     max_hedges: 2,
///     window: Duration::from_secs(60),
///     ..PercentilePolicyConfig::default()
/// };
///
/// let policy = config.build::<String>(&Clock::new_frozen())?;
/// assert_eq!(policy.estimator().options().get_window(), Duration::from_secs(60));
/// # Ok::<(), hedgerow::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PercentilePolicyConfig {
    /// Whether requests are hedged at all. **Default**: `true`
    pub enabled: bool,
    /// Fraction of recent successful latencies to wait for before hedging. **Default**: `0.95`
    pub percentile: f64,
    /// Maximum number of hedges per request. **Default**: `1`
    pub max_hedges: u32,
    /// Samples the window must hold before hedging starts. **Default**: `1`
    pub min_samples: u64,
    /// Span of history percentiles are computed over. **Default**: 2 minutes
    #[cfg_attr(feature = "serde", serde(with = "duration"))]
    pub window: Duration,
    /// Number of histograms rotating through the window. **Default**: `3`
    pub rotations: u32,
    /// Largest latency tracked precisely. **Default**: 60 seconds
    #[cfg_attr(feature = "serde", serde(with = "duration"))]
    pub max_latency: Duration,
}

impl PercentilePolicyConfig {
    /// Creates the estimator and the policy described by this configuration.
    ///
    /// A disabled configuration still builds a policy; it answers every request with no hedges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the percentile is outside `[0, 1]`, or when the window,
    /// rotation count or maximum latency is zero.
    pub fn build<In>(&self, clock: &Clock) -> Result<PercentilePolicy<In>, ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::caused_by("window must be greater than zero"));
        }

        if self.rotations == 0 {
            return Err(ConfigError::caused_by("rotations must be at least 1"));
        }

        if self.max_latency.is_zero() {
            return Err(ConfigError::caused_by("max_latency must be greater than zero"));
        }

        let options = EstimatorOptions::default()
            .window(self.window)
            .rotations(self.rotations)
            .max_latency(self.max_latency);

        let policy = PercentilePolicy::new(Arc::new(LatencyEstimator::new(clock, options)), self.percentile)?
            .max_hedges(self.max_hedges)
            .min_samples(self.min_samples);

        if self.enabled { Ok(policy) } else { Ok(policy.enable_if(|_| false)) }
    }
}

impl Default for PercentilePolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percentile: DEFAULT_PERCENTILE,
            max_hedges: DEFAULT_MAX_HEDGES,
            min_samples: DEFAULT_MIN_SAMPLES,
            window: DEFAULT_WINDOW,
            rotations: DEFAULT_ROTATIONS,
            max_latency: DEFAULT_MAX_LATENCY,
        }
    }
}

/// Serializes [`Duration`] through [`jiff::SignedDuration`], rejecting negative values.
#[cfg(feature = "serde")]
mod duration {
    use std::time::Duration;

    use jiff::SignedDuration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        SignedDuration::try_from(*value)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = SignedDuration::deserialize(deserializer)?;

        Duration::try_from(value).map_err(|error| serde::de::Error::custom(format!("duration must not be negative, got {value}: {error}")))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{HedgeDecision, HedgePolicy};

    #[test]
    fn defaults() {
        let config = PercentilePolicyConfig::default();

        assert!(config.enabled);
        assert!((config.percentile - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.max_hedges, 1);
        assert_eq!(config.min_samples, 1);
        assert_eq!(config.window, Duration::from_secs(120));
        assert_eq!(config.rotations, 3);
        assert_eq!(config.max_latency, Duration::from_secs(60));
    }

    #[test]
    fn build_applies_values() {
        let config = PercentilePolicyConfig {
            percentile: 0.5,
            max_hedges: 3,
            min_samples: 0,
            rotations: 6,
            ..PercentilePolicyConfig::default()
        };

        let policy = config.build::<()>(&Clock::new_frozen()).unwrap();

        assert_eq!(policy.estimator().options().get_rotations(), 6);
        assert_eq!(policy.decide(&()).unwrap(), HedgeDecision::new(3, Duration::ZERO));
    }

    #[test]
    fn disabled_config_never_hedges() {
        let config = PercentilePolicyConfig {
            enabled: false,
            min_samples: 0,
            ..PercentilePolicyConfig::default()
        };

        let policy = config.build::<()>(&Clock::new_frozen()).unwrap();
        assert!(!policy.decide(&()).unwrap().is_hedging());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let clock = Clock::new_frozen();
        let base = PercentilePolicyConfig::default();

        let cases = [
            (PercentilePolicyConfig { percentile: 2.0, ..base.clone() }, "percentile"),
            (PercentilePolicyConfig { window: Duration::ZERO, ..base.clone() }, "window"),
            (PercentilePolicyConfig { rotations: 0, ..base.clone() }, "rotations"),
            (PercentilePolicyConfig { max_latency: Duration::ZERO, ..base }, "max_latency"),
        ];

        for (config, field) in cases {
            let error = config.build::<()>(&clock).unwrap_err();
            assert!(error.to_string().contains(field), "{error} does not mention {field}");
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_friendly_and_iso_durations() {
        let config: PercentilePolicyConfig = serde_json::from_str(
            r#"{
                "percentile": 0.99,
                "max_hedges": 2,
                "window": "30s",
                "max_latency": "PT10S"
            }"#,
        )
        .unwrap();

        assert!((config.percentile - 0.99).abs() < f64::EPSILON);
        assert_eq!(config.max_hedges, 2);
        assert_eq!(config.window, Duration::from_secs(30));
        assert_eq!(config.max_latency, Duration::from_secs(10));
        assert_eq!(config.rotations, 3);
        assert!(config.enabled);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn negative_durations_are_rejected() {
        let error = serde_json::from_str::<PercentilePolicyConfig>(r#"{ "window": "-5s" }"#).unwrap_err();
        assert!(error.to_string().contains("must not be negative"), "{error}");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<PercentilePolicyConfig>(r#"{ "percentil": 0.5 }"#).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_round_trip() {
        let config = PercentilePolicyConfig {
            window: Duration::from_millis(1_500),
            ..PercentilePolicyConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("PT1.5S"), "{json}");
        assert_eq!(serde_json::from_str::<PercentilePolicyConfig>(&json).unwrap(), config);
    }
}
