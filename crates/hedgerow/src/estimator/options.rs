// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

pub(crate) const DEFAULT_WINDOW: Duration = Duration::from_secs(120);
pub(crate) const DEFAULT_ROTATIONS: u32 = 3;
pub(crate) const DEFAULT_MAX_LATENCY: Duration = Duration::from_secs(60);

const MIN_WINDOW: Duration = Duration::from_millis(1);
const MIN_MAX_LATENCY: Duration = Duration::from_micros(1);

/// Sizing of a [`LatencyEstimator`][super::LatencyEstimator].
///
/// The estimator keeps `rotations` overlapping histograms. Every `window / rotations` the
/// oldest one is cleared, so percentiles are computed over the most recent `window` of samples
/// with a granularity of one rotation step.
///
/// Out-of-range values are clamped instead of rejected: the window is at least one
/// millisecond, at least one rotation is kept and the maximum latency is at least one
/// microsecond.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hedgerow::estimator::EstimatorOptions;
///
/// let options = EstimatorOptions::default()
///     .window(Duration::from_secs(30))
///     .rotations(5)
///     .max_latency(Duration::from_secs(10));
///
/// assert_eq!(options.get_window(), Duration::from_secs(30));
/// assert_eq!(options.get_rotations(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorOptions {
    window: Duration,
    rotations: u32,
    max_latency: Duration,
}

impl EstimatorOptions {
    /// Sets the span of history percentiles are computed over.
    ///
    /// **Default**: 2 minutes
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window.max(MIN_WINDOW);
        self
    }

    /// Sets how many histograms rotate through the window.
    ///
    /// More rotations make the window slide more smoothly at the cost of one extra atomic
    /// increment per recorded sample.
    ///
    /// **Default**: 3
    #[must_use]
    pub fn rotations(mut self, rotations: u32) -> Self {
        self.rotations = rotations.max(1);
        self
    }

    /// Sets the largest latency tracked precisely. Longer samples count as this value.
    ///
    /// **Default**: 60 seconds
    #[must_use]
    pub fn max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency.max(MIN_MAX_LATENCY);
        self
    }

    /// Returns the configured window.
    #[must_use]
    pub fn get_window(&self) -> Duration {
        self.window
    }

    /// Returns the configured number of rotations.
    #[must_use]
    pub fn get_rotations(&self) -> u32 {
        self.rotations
    }

    /// Returns the configured maximum latency.
    #[must_use]
    pub fn get_max_latency(&self) -> Duration {
        self.max_latency
    }

    pub(super) fn rotation_step(&self) -> Duration {
        (self.window / self.rotations).max(Duration::from_nanos(1))
    }
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            rotations: DEFAULT_ROTATIONS,
            max_latency: DEFAULT_MAX_LATENCY,
        }
    }
}
