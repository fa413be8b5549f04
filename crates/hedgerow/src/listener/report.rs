// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;
use std::time::Duration;

use crate::Attempt;

/// Classification of a completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// The attempt produced an output that can be returned to the caller.
    Success,
    /// The attempt produced an output the recovery callback considers transient.
    Failure,
}

impl AttemptOutcome {
    /// Returns `true` for [`AttemptOutcome::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

/// What a listener learns about one attempt that reached a terminal state.
///
/// Reports borrow the original request and the attempt's output. Listeners that need to
/// keep data around must copy it out.
#[derive(Debug)]
pub struct AttemptReport<'a, In, Out> {
    input: &'a In,
    output: &'a Out,
    outcome: AttemptOutcome,
    elapsed: Duration,
    attempt: Attempt,
}

impl<'a, In, Out> AttemptReport<'a, In, Out> {
    /// Creates a report. The middleware builds these; listeners rarely need to.
    #[must_use]
    pub fn new(input: &'a In, output: &'a Out, outcome: AttemptOutcome, elapsed: Duration, attempt: Attempt) -> Self {
        Self {
            input,
            output,
            outcome,
            elapsed,
            attempt,
        }
    }

    /// The request the race was started for.
    #[must_use]
    pub fn input(&self) -> &'a In {
        self.input
    }

    /// The output the attempt produced.
    #[must_use]
    pub fn output(&self) -> &'a Out {
        self.output
    }

    /// Whether the attempt succeeded.
    #[must_use]
    pub fn outcome(&self) -> AttemptOutcome {
        self.outcome
    }

    /// Shorthand for `self.outcome().is_success()`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Time between issuing this attempt and its completion.
    ///
    /// Hedges are measured from their own start, not from the start of the race.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Which attempt of the race this report is about.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let input = String::from("GET /users");
        let output = 200_u16;
        let report = AttemptReport::new(&input, &output, AttemptOutcome::Success, Duration::from_millis(150), Attempt::new(1, true));

        assert_eq!(report.input(), "GET /users");
        assert_eq!(*report.output(), 200);
        assert!(report.is_success());
        assert_eq!(report.elapsed(), Duration::from_millis(150));
        assert_eq!(report.attempt().index(), 1);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(AttemptOutcome::Success.to_string(), "success");
        assert_eq!(AttemptOutcome::Failure.to_string(), "failure");
        assert!(!AttemptOutcome::Failure.is_success());
    }
}
