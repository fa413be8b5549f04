// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// How a single request is hedged: how many hedges at most, and how far apart.
///
/// Hedge `i` (1-based) is issued `i × delay` after the original attempt, unless a successful
/// response arrived first. A decision without a delay disables hedging entirely, whatever
/// hedge count it carries.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hedgerow::policy::HedgeDecision;
///
/// let decision = HedgeDecision::new(2, Duration::from_millis(50));
/// assert_eq!(decision.max_hedges(), 2);
/// assert_eq!(decision.hedge_offset(2), Some(Duration::from_millis(100)));
///
/// let disabled = HedgeDecision::new(3, None);
/// assert_eq!(disabled.max_hedges(), 0);
/// assert!(!disabled.is_hedging());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HedgeDecision {
    max_hedges: u32,
    delay: Option<Duration>,
}

impl HedgeDecision {
    /// Creates a decision. Pass `None` as delay to disable hedging.
    #[must_use]
    pub fn new(max_hedges: u32, delay: impl Into<Option<Duration>>) -> Self {
        Self {
            max_hedges,
            delay: delay.into(),
        }
    }

    /// A decision that disables hedging for the request.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, None)
    }

    /// A decision that keeps hedging enabled but issues no hedges for this request.
    #[must_use]
    pub fn no_hedges() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Number of hedges that may be issued. Always 0 when the delay is absent.
    #[must_use]
    pub fn max_hedges(&self) -> u32 {
        if self.delay.is_some() { self.max_hedges } else { 0 }
    }

    /// Spacing between consecutive attempts, or `None` when hedging is disabled.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Returns `true` if at least one hedge may be issued.
    #[must_use]
    pub fn is_hedging(&self) -> bool {
        self.max_hedges() > 0
    }

    /// Time from the start of the race at which hedge `index` is due.
    ///
    /// Returns `None` when hedging is disabled or `index` exceeds the hedge budget.
    #[must_use]
    pub fn hedge_offset(&self, index: u32) -> Option<Duration> {
        if index > self.max_hedges() {
            return None;
        }

        self.delay.map(|delay| delay.checked_mul(index).unwrap_or(Duration::MAX))
    }
}
