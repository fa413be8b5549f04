// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sliding-window latency percentiles.
//!
//! A [`LatencyEstimator`] records the latencies of successful attempts and answers percentile
//! queries over the most recent window of samples. It is the data source for
//! [`PercentilePolicy`][crate::policy::PercentilePolicy], and implements
//! [`HedgeListener`] so that the hedging middleware can feed it directly.
//!
//! # Accuracy
//!
//! Latencies are tracked in microseconds by HDR histograms with two significant figures, so
//! a reported percentile overestimates the true value by at most 1%. Queries return the
//! highest latency equivalent to the matching sample.
//!
//! # Window
//!
//! The estimator keeps a ring of histograms and writes every sample into all of them.
//! Queries read the oldest histogram. Every `window / rotations` the oldest histogram is
//! cleared and becomes the newest, so queries always reflect between
//! `window - window / rotations` and `window` of history.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use hedgerow::estimator::{EstimatorOptions, LatencyEstimator};
//! use tick::Clock;
//!
//! let estimator = LatencyEstimator::new(&Clock::new_frozen(), EstimatorOptions::default());
//! assert_eq!(estimator.percentile(0.9), Duration::ZERO);
//!
//! for millis in 1..=100 {
//!     estimator.record(Duration::from_millis(millis), true);
//! }
//!
//! let p90 = estimator.percentile(0.9);
//! assert!(p90 >= Duration::from_millis(90));
//! assert!(p90 <= Duration::from_millis(91));
//! ```

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use tick::{Clock, Stopwatch};

mod options;

pub(crate) use options::{DEFAULT_MAX_LATENCY, DEFAULT_ROTATIONS, DEFAULT_WINDOW};
pub use options::EstimatorOptions;

use crate::ListenerError;
use crate::listener::{AttemptReport, HedgeListener};

const SIGNIFICANT_FIGURES: u8 = 2;

/// Thread-safe, windowed latency histogram.
///
/// Recording takes one short lock per histogram in the ring. Rotation takes a separate lock,
/// at most once per rotation step, guarded by an atomic fast path.
///
/// Share an estimator between the policy that reads it and the middleware that feeds it by
/// wrapping it in an [`Arc`][std::sync::Arc].
pub struct LatencyEstimator {
    options: EstimatorOptions,
    max_micros: u64,
    ring: Box<[Mutex<Histogram<u64>>]>,
    oldest: AtomicUsize,
    started: Stopwatch,
    // Nanoseconds since `started` at which the oldest histogram is cleared.
    next_rotation: AtomicU64,
    rotation: Mutex<()>,
}

impl LatencyEstimator {
    /// Creates an empty estimator that reads time from `clock`.
    #[must_use]
    pub fn new(clock: &Clock, options: EstimatorOptions) -> Self {
        // Histogram bounds require `high >= 2 * low`.
        let max_micros = saturating_micros(options.get_max_latency()).max(2);
        let rotations = usize::try_from(options.get_rotations()).unwrap_or(usize::MAX);

        Self {
            max_micros,
            ring: (0..rotations).map(|_| Mutex::new(new_histogram(max_micros))).collect(),
            oldest: AtomicUsize::new(0),
            started: clock.stopwatch(),
            next_rotation: AtomicU64::new(saturating_nanos(options.rotation_step())),
            rotation: Mutex::new(()),
            options,
        }
    }

    /// Records the latency of a completed attempt. Failed attempts are ignored.
    pub fn record(&self, elapsed: Duration, success: bool) {
        if !success {
            return;
        }

        self.rotate();

        let micros = saturating_micros(elapsed).min(self.max_micros);
        for histogram in &self.ring {
            histogram.lock().saturating_record(micros);
        }
    }

    /// Returns the latency under which `percentile` of the samples in the window fall.
    ///
    /// `percentile` is a fraction: `0.95` is the 95th percentile. Values outside `[0, 1]` are
    /// clamped, `NaN` is treated as `1.0`. The result is the highest latency the histogram
    /// considers equivalent to the matching sample, capped at the configured maximum latency.
    /// An empty window yields [`Duration::ZERO`]; use [`sample_count`][Self::sample_count] to
    /// tell that case apart from genuinely fast responses.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Duration {
        self.rotate();

        let histogram = self.readable().lock();
        if histogram.is_empty() {
            return Duration::ZERO;
        }

        let value = histogram.value_at_quantile(quantile_of(percentile));
        let upper = histogram.highest_equivalent(value).min(self.max_micros);

        Duration::from_micros(upper).min(self.options.get_max_latency())
    }

    /// Returns how many samples the current window holds.
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.rotate();
        self.readable().lock().len()
    }

    /// Returns the options the estimator was created with.
    #[must_use]
    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    fn readable(&self) -> &Mutex<Histogram<u64>> {
        &self.ring[self.oldest.load(Ordering::Acquire)]
    }

    fn rotate(&self) {
        let now = saturating_nanos(self.started.elapsed());
        if now < self.next_rotation.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.rotation.lock();

        // Another thread may have rotated while we waited for the lock.
        let next = self.next_rotation.load(Ordering::Acquire);
        if now < next {
            return;
        }

        let step = saturating_nanos(self.options.rotation_step()).max(1);
        let due = (now - next) / step + 1;
        let len = self.ring.len();

        for _ in 0..due.min(len as u64) {
            let oldest = self.oldest.load(Ordering::Acquire);
            self.ring[oldest].lock().reset();
            self.oldest.store((oldest + 1) % len, Ordering::Release);
        }

        self.next_rotation
            .store(next.saturating_add(due.saturating_mul(step)), Ordering::Release);
    }
}

impl Debug for LatencyEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyEstimator")
            .field("options", &self.options)
            .field("oldest", &self.oldest.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<In, Out> HedgeListener<In, Out> for LatencyEstimator {
    fn on_attempt_complete(&self, report: &AttemptReport<'_, In, Out>) -> Result<(), ListenerError> {
        self.record(report.elapsed(), report.is_success());
        Ok(())
    }
}

fn new_histogram(max_micros: u64) -> Histogram<u64> {
    Histogram::new_with_bounds(1, max_micros, SIGNIFICANT_FIGURES)
        .expect("bounds span at least 1..=2 and two significant figures are supported")
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn saturating_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn quantile_of(percentile: f64) -> f64 {
    if percentile.is_nan() { 1.0 } else { percentile.clamp(0.0, 1.0) }
}
