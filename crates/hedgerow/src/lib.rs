// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Request hedging for tail-latency reduction.
//!
//! Hedging sends a request, waits a little, and if no successful answer has arrived sends a
//! copy of the same request to race the first one. The first success wins and the rest are
//! discarded. The waiting time is the lever: hedge too early and the backend takes double
//! load, hedge too late and the tail stays long. This crate decides it per request with a
//! pluggable [`HedgePolicy`][policy::HedgePolicy], typically a latency percentile measured
//! from recent attempts by a [`LatencyEstimator`][estimator::LatencyEstimator].
//!
//! # Runtime Agnostic Design
//!
//! The middleware does not depend on an async runtime. Time comes from a [`tick::Clock`]
//! and losing attempts are drained on an optional [`anyspawn::Spawner`], so the same
//! configuration works on any executor and can be tested with a manually advanced clock.
//!
//! # Building Blocks
//!
//! - [`estimator`]: a windowed, lock-light latency histogram answering percentile queries
//! - [`policy`]: decides how many hedges a request gets and how far apart they are
//! - [`listener`]: observes every completed attempt, the estimator being the main consumer
//! - [`resolver`]: picks the policy and listeners per request, globally or per route
//! - [`hedging`]: the [`Hedging`][hedging::Hedging] middleware that runs the race
//!
//! # Quick Start
//!
//! ```rust
//! # use std::sync::Arc;
//! # use tick::Clock;
//! # use layered::{Execute, Service, Stack};
//! use hedgerow::estimator::{EstimatorOptions, LatencyEstimator};
//! use hedgerow::hedging::Hedging;
//! use hedgerow::policy::PercentilePolicy;
//! use hedgerow::{HedgingContext, RecoveryInfo};
//!
//! # async fn example(clock: Clock) -> Result<(), hedgerow::ConfigError> {
//! let context = HedgingContext::new(&clock).name("user_profile");
//!
//! // Hedge at the observed p90, with up to two hedges per request.
//! let estimator = Arc::new(LatencyEstimator::new(&clock, EstimatorOptions::default()));
//! let policy = PercentilePolicy::new(Arc::clone(&estimator), 0.9)?.max_hedges(2);
//!
//! let service = (
//!     Hedging::layer("hedging", &context)
//!         .clone_input()
//!         .recovery_with(|output: &Result<String, String>, _| match output {
//!             Ok(_) => RecoveryInfo::never(),
//!             Err(_) => RecoveryInfo::retry(),
//!         })
//!         .policy(policy)
//!         .listener(estimator),
//!     Execute::new(fetch_profile),
//! )
//!     .into_service();
//!
//! let profile = service.execute("user-42".to_string()).await;
//! # let _profile = profile;
//! # Ok(())
//! # }
//! # async fn fetch_profile(id: String) -> Result<String, String> { Ok(id) }
//! ```
//!
//! > **Note**: Requests are executed more than once. Only hedge operations that are safe to
//! > repeat, such as reads or idempotent writes.
//!
//! # Features
//!
//! - `metrics`: Reports hedging events through OpenTelemetry, see
//!   `HedgingContext::enable_metrics`.
//! - `serde`: Makes [`PercentilePolicyConfig`][policy::PercentilePolicyConfig] loadable from
//!   configuration files.
//! - `tokio`: Enables the Tokio integrations of [`tick`] and [`anyspawn`].

#[doc(inline)]
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};

mod attempt;
pub use attempt::Attempt;

mod context;
pub use context::HedgingContext;

mod error;
pub use error::{ConfigError, ListenerError, PolicyError};

pub mod estimator;
pub mod hedging;
pub mod listener;
pub mod policy;
pub mod resolver;
pub mod telemetry;

mod utils;

/// A flag indicating that the required property is set.
#[non_exhaustive]
#[derive(Debug)]
pub struct Set;

/// A flag indicating that the required property has not been set.
#[non_exhaustive]
#[derive(Debug)]
pub struct NotSet;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
