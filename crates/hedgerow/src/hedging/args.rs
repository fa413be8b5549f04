// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use tick::Clock;

use crate::Attempt;

/// Arguments for the [`clone_input_with`][super::HedgingLayer::clone_input_with] callback.
#[derive(Debug)]
pub struct CloneArgs {
    pub(super) attempt: Attempt,
}

impl CloneArgs {
    /// The attempt the clone is for. Index 0 is the original attempt.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }
}

/// Arguments for the [`recovery_with`][super::HedgingLayer::recovery_with] callback.
#[derive(Debug)]
pub struct RecoveryArgs<'a> {
    pub(super) clock: &'a Clock,
    pub(super) attempt: Attempt,
}

impl RecoveryArgs<'_> {
    /// Returns the clock used by the hedging middleware.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        self.clock
    }

    /// The attempt that produced the output being classified.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }
}

/// Arguments for the [`on_hedge`][super::HedgingLayer::on_hedge] callback.
///
/// Provides context when a hedged attempt is about to be issued.
#[derive(Debug)]
pub struct OnHedgeArgs {
    pub(super) attempt: Attempt,
    pub(super) delay: Duration,
}

impl OnHedgeArgs {
    /// The hedge being issued. Its index is 1 for the first hedge.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// Spacing between attempts decided by the policy for this request.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Arguments for the output callback of [`deadline`][super::HedgingLayer::deadline].
#[derive(Debug)]
pub struct DeadlineArgs {
    pub(super) elapsed: Duration,
    pub(super) attempts_issued: u32,
}

impl DeadlineArgs {
    /// Time since the request entered the middleware.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// How many attempts were issued before the deadline, the original included.
    #[must_use]
    pub fn attempts_issued(&self) -> u32 {
        self.attempts_issued
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_args() {
        let args = CloneArgs {
            attempt: Attempt::new(2, true),
        };
        assert_eq!(args.attempt().index(), 2);
        assert!(args.attempt().is_last());
    }

    #[test]
    fn recovery_args() {
        let clock = Clock::new_frozen();
        let args = RecoveryArgs {
            clock: &clock,
            attempt: Attempt::new(1, false),
        };
        let _clock = args.clock();
        assert!(args.attempt().is_hedge());
    }

    #[test]
    fn on_hedge_args() {
        let args = OnHedgeArgs {
            attempt: Attempt::new(1, true),
            delay: Duration::from_millis(30),
        };
        assert_eq!(args.attempt().index(), 1);
        assert_eq!(args.delay(), Duration::from_millis(30));
    }

    #[test]
    fn deadline_args() {
        let args = DeadlineArgs {
            elapsed: Duration::from_secs(1),
            attempts_issued: 3,
        };
        assert_eq!(args.elapsed(), Duration::from_secs(1));
        assert_eq!(args.attempts_issued(), 3);
    }
}
