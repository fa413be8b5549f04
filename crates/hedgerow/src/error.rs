// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types reported by policies, listeners and configuration.
//!
//! None of these errors ever reach the caller of a hedged service: policy and listener
//! failures are logged and absorbed by the middleware, and configuration errors surface
//! while the pipeline is being built.

use ohno::OhnoCore;

/// A hedge policy could not produce a decision.
///
/// The middleware logs the error and runs the request as a single, unhedged attempt.
///
/// # Examples
///
/// ```
/// use hedgerow::PolicyError;
///
/// let error = PolicyError::caused_by("latency data unavailable");
/// assert!(error.to_string().contains("latency data unavailable"));
/// ```
#[derive(ohno::Error)]
#[no_constructors]
pub struct PolicyError {
    core: OhnoCore,
}

impl PolicyError {
    /// Creates a policy error without a cause.
    #[must_use]
    pub fn new() -> Self {
        Self { core: OhnoCore::new() }
    }

    /// Creates a policy error caused by `error`.
    #[must_use]
    pub fn caused_by(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            core: OhnoCore::from(error),
        }
    }
}

impl Default for PolicyError {
    fn default() -> Self {
        Self::new()
    }
}

/// A hedge listener failed to process an attempt report.
///
/// Listener failures are purely observational: the middleware logs them and keeps notifying
/// the remaining listeners.
///
/// # Examples
///
/// ```
/// use hedgerow::ListenerError;
///
/// let error = ListenerError::caused_by("exporter offline");
/// assert!(error.to_string().contains("exporter offline"));
/// ```
#[derive(ohno::Error)]
#[no_constructors]
pub struct ListenerError {
    core: OhnoCore,
}

impl ListenerError {
    /// Creates a listener error without a cause.
    #[must_use]
    pub fn new() -> Self {
        Self { core: OhnoCore::new() }
    }

    /// Creates a listener error caused by `error`.
    #[must_use]
    pub fn caused_by(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            core: OhnoCore::from(error),
        }
    }
}

impl Default for ListenerError {
    fn default() -> Self {
        Self::new()
    }
}

/// A hedging component was configured with invalid values.
///
/// # Examples
///
/// ```
/// use hedgerow::ConfigError;
///
/// let error = ConfigError::caused_by("percentile must be within [0, 1], got 1.5");
/// assert!(error.to_string().contains("percentile"));
/// ```
#[derive(ohno::Error)]
#[no_constructors]
pub struct ConfigError {
    core: OhnoCore,
}

impl ConfigError {
    /// Creates a configuration error caused by `error`.
    #[must_use]
    pub fn caused_by(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            core: OhnoCore::from(error),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_contains_cause() {
        assert!(PolicyError::caused_by("no data").to_string().contains("no data"));
        assert!(ListenerError::caused_by("sink closed").to_string().contains("sink closed"));
        assert!(ConfigError::caused_by("bad window").to_string().contains("bad window"));
    }

    #[test]
    fn debug_contains_cause() {
        let debug = format!("{:?}", ListenerError::caused_by("exporter offline"));
        assert!(debug.contains("exporter offline"), "unexpected debug output: {debug}");
    }

    #[test]
    fn string_causes_have_no_source() {
        assert!(ConfigError::caused_by("plain message").source().is_none());
    }

    #[test]
    fn errors_without_cause_display() {
        assert!(!PolicyError::new().to_string().is_empty());
        assert!(!ListenerError::default().to_string().is_empty());
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(PolicyError: Send, Sync, std::error::Error);
        static_assertions::assert_impl_all!(ListenerError: Send, Sync, std::error::Error);
        static_assertions::assert_impl_all!(ConfigError: Send, Sync, std::error::Error);
    }
}
