// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Observers notified when hedged attempts complete.
//!
//! The hedging middleware calls every [`HedgeListener`] exactly once for each attempt that
//! reaches a terminal state, the original attempt included. Listeners feed latency trackers
//! such as [`LatencyEstimator`][crate::estimator::LatencyEstimator], record custom metrics or
//! log slow requests.
//!
//! Listeners are purely observational. An error returned by a listener, or a panic inside
//! one, is logged at `WARN` level and does not affect the race or the other listeners.
//!
//! # Examples
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use hedgerow::ListenerError;
//! use hedgerow::listener::{AttemptReport, HedgeListener};
//!
//! #[derive(Debug, Default)]
//! struct HedgeWins(AtomicU32);
//!
//! impl<In, Out> HedgeListener<In, Out> for HedgeWins {
//!     fn on_attempt_complete(&self, report: &AttemptReport<'_, In, Out>) -> Result<(), ListenerError> {
//!         if report.is_success() && report.attempt().is_hedge() {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

mod report;

pub use report::{AttemptOutcome, AttemptReport};

use crate::ListenerError;
use crate::utils::TelemetryHelper;

/// Receives one report per completed attempt.
///
/// Implementations must be cheap: they run inline on the task that drives the race.
pub trait HedgeListener<In, Out>: Send + Sync {
    /// Called once an attempt reached a terminal state.
    ///
    /// # Errors
    ///
    /// Returning an error has no effect besides a warning in the logs.
    fn on_attempt_complete(&self, report: &AttemptReport<'_, In, Out>) -> Result<(), ListenerError>;
}

impl<In, Out, L: HedgeListener<In, Out> + ?Sized> HedgeListener<In, Out> for Arc<L> {
    fn on_attempt_complete(&self, report: &AttemptReport<'_, In, Out>) -> Result<(), ListenerError> {
        (**self).on_attempt_complete(report)
    }
}

/// Adapts a closure into a [`HedgeListener`].
///
/// # Examples
///
/// ```
/// use hedgerow::listener::{AttemptReport, ListenerFn};
///
/// let listener = ListenerFn::new(|report: &AttemptReport<'_, String, String>| {
///     if !report.is_success() {
///         println!("attempt {} of {} failed", report.attempt(), report.input());
///     }
///     Ok(())
/// });
/// # let _listener = listener;
/// ```
#[derive(Clone)]
pub struct ListenerFn<F>(F);

impl<F> ListenerFn<F> {
    /// Wraps `listener`.
    pub fn new<In, Out>(listener: F) -> Self
    where
        F: Fn(&AttemptReport<'_, In, Out>) -> Result<(), ListenerError> + Send + Sync,
    {
        Self(listener)
    }
}

impl<F> Debug for ListenerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerFn").finish_non_exhaustive()
    }
}

impl<In, Out, F> HedgeListener<In, Out> for ListenerFn<F>
where
    F: Fn(&AttemptReport<'_, In, Out>) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_attempt_complete(&self, report: &AttemptReport<'_, In, Out>) -> Result<(), ListenerError> {
        (self.0)(report)
    }
}

/// Delivers `report` to every listener in order, isolating failures.
pub(crate) fn notify_listeners<In, Out>(
    listeners: &[Arc<dyn HedgeListener<In, Out>>],
    report: &AttemptReport<'_, In, Out>,
    telemetry: &TelemetryHelper,
) {
    for (position, listener) in listeners.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| listener.on_attempt_complete(report))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::event!(
                    name: "hedgerow.listener_failed",
                    tracing::Level::WARN,
                    pipeline.name = %telemetry.pipeline_name,
                    strategy.name = %telemetry.strategy_name,
                    resilience.attempt.index = report.attempt().index(),
                    listener.position = position,
                    error = %error,
                    "hedge listener failed",
                );
            }
            Err(_) => {
                tracing::event!(
                    name: "hedgerow.listener_panicked",
                    tracing::Level::WARN,
                    pipeline.name = %telemetry.pipeline_name,
                    strategy.name = %telemetry.strategy_name,
                    resilience.attempt.index = report.attempt().index(),
                    listener.position = position,
                    "hedge listener panicked",
                );
            }
        }
    }
}
