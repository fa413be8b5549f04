// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{HedgeDecision, HedgePolicy};
use crate::PolicyError;

pub(crate) const DEFAULT_MAX_HEDGES: u32 = 1;
pub(crate) const DEFAULT_HEDGE_DELAY: Duration = Duration::from_secs(2);

/// Returns the same decision for every request.
///
/// **Default**: one hedge after 2 seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hedgerow::policy::{FixedPolicy, HedgeDecision, HedgePolicy};
///
/// let policy = FixedPolicy::new(2, Duration::from_millis(150));
/// let decision = HedgePolicy::<&str>::decide(&policy, &"GET /")?;
///
/// assert_eq!(decision, HedgeDecision::new(2, Duration::from_millis(150)));
/// # Ok::<(), hedgerow::PolicyError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPolicy {
    decision: HedgeDecision,
}

impl FixedPolicy {
    /// Issues up to `max_hedges` hedges spaced `delay` apart. A `None` delay disables hedging.
    #[must_use]
    pub fn new(max_hedges: u32, delay: impl Into<Option<Duration>>) -> Self {
        Self {
            decision: HedgeDecision::new(max_hedges, delay),
        }
    }

    /// Never hedges.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            decision: HedgeDecision::disabled(),
        }
    }

    /// The decision returned for every request.
    #[must_use]
    pub fn decision(&self) -> HedgeDecision {
        self.decision
    }
}

impl Default for FixedPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEDGES, DEFAULT_HEDGE_DELAY)
    }
}

impl<In> HedgePolicy<In> for FixedPolicy {
    fn decide(&self, _input: &In) -> Result<HedgeDecision, PolicyError> {
        Ok(self.decision)
    }
}
