// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Decide, per request, how many hedges to issue and how long to wait between them.
//!
//! The hedging middleware asks its [`HedgePolicy`] once at the start of every request and
//! follows the returned [`HedgeDecision`] for the whole race. Three policies are provided:
//!
//! - [`FixedPolicy`]: the same hedge count and delay for every request.
//! - [`PercentilePolicy`]: waits for a latency percentile of recent successful attempts,
//!   as tracked by a [`LatencyEstimator`][crate::estimator::LatencyEstimator].
//! - [`PolicyFn`]: any closure.
//!
//! [`PercentilePolicyConfig`] builds a percentile policy from declarative configuration.
//!
//! # Errors
//!
//! A policy that cannot decide returns a [`PolicyError`]. The middleware logs it and sends
//! the request without hedges.

use std::fmt::Debug;
use std::sync::Arc;

mod config;
mod decision;
mod fixed;
mod percentile;

pub use config::PercentilePolicyConfig;
pub use decision::HedgeDecision;
pub use fixed::FixedPolicy;
pub use percentile::PercentilePolicy;

use crate::PolicyError;

/// Maps a request to its [`HedgeDecision`].
pub trait HedgePolicy<In>: Send + Sync {
    /// Decides how `input` is hedged.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when no decision can be made. The request is then sent once,
    /// without hedges.
    fn decide(&self, input: &In) -> Result<HedgeDecision, PolicyError>;
}

impl<In, P: HedgePolicy<In> + ?Sized> HedgePolicy<In> for Arc<P> {
    fn decide(&self, input: &In) -> Result<HedgeDecision, PolicyError> {
        (**self).decide(input)
    }
}

/// Adapts a closure into a [`HedgePolicy`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hedgerow::policy::{HedgeDecision, HedgePolicy, PolicyFn};
///
/// let policy = PolicyFn::new(|path: &String| {
///     if path.starts_with("/search") {
///         Ok(HedgeDecision::new(2, Duration::from_millis(80)))
///     } else {
///         Ok(HedgeDecision::disabled())
///     }
/// });
///
/// assert_eq!(policy.decide(&"/search?q=rust".to_string())?.max_hedges(), 2);
/// assert_eq!(policy.decide(&"/orders".to_string())?.max_hedges(), 0);
/// # Ok::<(), hedgerow::PolicyError>(())
/// ```
#[derive(Clone)]
pub struct PolicyFn<F>(F);

impl<F> PolicyFn<F> {
    /// Wraps `policy`.
    pub fn new<In>(policy: F) -> Self
    where
        F: Fn(&In) -> Result<HedgeDecision, PolicyError> + Send + Sync,
    {
        Self(policy)
    }
}

impl<F> Debug for PolicyFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyFn").finish_non_exhaustive()
    }
}

impl<In, F> HedgePolicy<In> for PolicyFn<F>
where
    F: Fn(&In) -> Result<HedgeDecision, PolicyError> + Send + Sync,
{
    fn decide(&self, input: &In) -> Result<HedgeDecision, PolicyError> {
        (self.0)(input)
    }
}
