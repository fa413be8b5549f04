// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// Identifies one execution of a hedged request.
///
/// Index `0` is the original attempt; indices `1..` are hedges issued in order. `is_last`
/// tells whether no further hedge is planned after this one.
///
/// # Examples
///
/// ```
/// use hedgerow::Attempt;
///
/// let original = Attempt::new(0, false);
/// assert!(original.is_original());
/// assert!(!original.is_hedge());
///
/// let hedge = Attempt::new(2, true);
/// assert!(hedge.is_hedge());
/// assert!(hedge.is_last());
/// assert_eq!(hedge.index(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attempt {
    index: u32,
    is_last: bool,
}

impl Attempt {
    /// Creates an attempt with the given 0-based index.
    #[must_use]
    pub fn new(index: u32, is_last: bool) -> Self {
        Self { index, is_last }
    }

    /// Returns the 0-based attempt index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns `true` for the original attempt (index 0).
    #[must_use]
    pub fn is_original(self) -> bool {
        self.index == 0
    }

    /// Returns `true` for hedged attempts (index 1 and above).
    #[must_use]
    pub fn is_hedge(self) -> bool {
        self.index > 0
    }

    /// Returns `true` if no further attempt is planned after this one.
    #[must_use]
    pub fn is_last(self) -> bool {
        self.is_last
    }

    pub(crate) fn planned(index: u32, max_hedges: u32) -> Self {
        Self::new(index, index >= max_hedges)
    }
}

impl Default for Attempt {
    /// The original attempt of an unhedged request.
    fn default() -> Self {
        Self::new(0, true)
    }
}

impl Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.index.fmt(f)
    }
}
