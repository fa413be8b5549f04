// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hedging middleware that races redundant copies of a request to cut tail latency.
//!
//! The primary types are [`Hedging`] and [`HedgingLayer`]:
//!
//! - [`Hedging`] wraps an inner service and runs the race for every request
//! - [`HedgingLayer`] configures and constructs the middleware
//!
//! # Quick Start
//!
//! ```rust
//! # use std::time::Duration;
//! # use tick::Clock;
//! # use layered::{Execute, Service, Stack};
//! # use hedgerow::hedging::Hedging;
//! # use hedgerow::policy::FixedPolicy;
//! # use hedgerow::{HedgingContext, RecoveryInfo};
//! # async fn example(clock: Clock) {
//! let context = HedgingContext::new(&clock).name("search_backend");
//!
//! let stack = (
//!     Hedging::layer("hedge", &context)
//!         .clone_input()
//!         .recovery_with(|result: &Result<String, String>, _| match result {
//!             Ok(_) => RecoveryInfo::never(),
//!             Err(_) => RecoveryInfo::retry(),
//!         })
//!         .policy(FixedPolicy::new(2, Duration::from_millis(50))),
//!     Execute::new(my_operation),
//! );
//!
//! let service = stack.into_service();
//! let result = service.execute("input".to_string()).await;
//! # let _result = result;
//! # }
//! # async fn my_operation(input: String) -> Result<String, String> { Ok(input) }
//! ```
//!
//! # How It Works
//!
//! For every request the middleware asks its [`HedgingResolver`] for the
//! [`HedgePolicy`] and [`HedgeListener`]s that apply, and the policy for a
//! [`HedgeDecision`]: the maximum number of hedges and the spacing between attempts.
//!
//! The original attempt starts immediately. Hedge `k` starts `k × delay` after the request
//! entered the middleware, unless an attempt has succeeded by then. The schedule is absolute:
//! an early failure of the original does not pull the hedges forward.
//!
//! - A zero delay issues every hedge at once
//! - A disabled decision (no delay) runs the original attempt alone
//! - A failing policy is logged and treated as a disabled decision
//!
//! The first attempt whose output is classified as final wins the race and its output is
//! returned. When every attempt fails, the output of the original attempt is returned.
//!
//! Every attempt that completes is reported to the listeners with its outcome and latency,
//! in completion order. Attempts still in flight when the race is won are cancelled, or
//! drained on a [`Spawner`][anyspawn::Spawner] when one is configured so their latency is
//! reported too.
//!
//! # Percentile Hedging
//!
//! A [`PercentilePolicy`] delays hedges by a latency percentile of recent attempts. Register
//! the policy, or its estimator, as a listener so every completed attempt feeds the estimate
//! the next requests are scheduled with:
//!
//! ```rust
//! # use std::sync::Arc;
//! # use tick::Clock;
//! # use layered::{Execute, Service, Stack};
//! # use hedgerow::estimator::{EstimatorOptions, LatencyEstimator};
//! # use hedgerow::hedging::Hedging;
//! # use hedgerow::policy::PercentilePolicy;
//! # use hedgerow::{HedgingContext, RecoveryInfo};
//! # async fn example(clock: Clock) -> Result<(), hedgerow::ConfigError> {
//! let context = HedgingContext::new(&clock).name("search_backend");
//! let estimator = Arc::new(LatencyEstimator::new(&clock, EstimatorOptions::default()));
//! let policy = PercentilePolicy::new(Arc::clone(&estimator), 0.95)?.max_hedges(2);
//!
//! let stack = (
//!     Hedging::layer("p95_hedge", &context)
//!         .clone_input()
//!         .recovery_with(|result: &Result<String, String>, _| match result {
//!             Ok(_) => RecoveryInfo::never(),
//!             Err(_) => RecoveryInfo::retry(),
//!         })
//!         .policy(policy)
//!         .listener(estimator),
//!     Execute::new(my_operation),
//! );
//!
//! let service = stack.into_service();
//! let result = service.execute("input".to_string()).await;
//! # let _result = result;
//! # Ok(())
//! # }
//! # async fn my_operation(input: String) -> Result<String, String> { Ok(input) }
//! ```
//!
//! # Configuration
//!
//! The [`HedgingLayer`] uses a type state pattern so that a layer cannot be built before
//! the two required properties are configured:
//!
//! - [`clone_input_with`][HedgingLayer::clone_input_with]: produces the input of every attempt
//! - [`recovery_with`][HedgingLayer::recovery_with]: classifies whether an output is final
//!
//! Each hedging layer requires an identifier for telemetry purposes. Prefer `snake_case`.
//!
//! # Defaults
//!
//! | Parameter | Default Value | Description | Configured By |
//! |-----------|---------------|-------------|---------------|
//! | Policy | one hedge after 2s | How requests are hedged | [`policy`][HedgingLayer::policy], [`resolver`][HedgingLayer::resolver] |
//! | Listeners | none | Who observes completed attempts | [`listener`][HedgingLayer::listener], [`resolver`][HedgingLayer::resolver] |
//! | Handle unavailable | `false` | Unavailable responses are returned immediately | [`handle_unavailable`][HedgingLayer::handle_unavailable] |
//! | Spawner | none | Losing attempts are cancelled | [`spawner`][HedgingLayer::spawner] |
//! | Deadline | none | The race waits for its attempts | [`deadline`][HedgingLayer::deadline] |
//! | Enable condition | Always enabled | Hedging is applied to all requests | [`enable_if`][HedgingLayer::enable_if], [`enable_always`][HedgingLayer::enable_always], [`disable`][HedgingLayer::disable] |
//!
//! # Telemetry
//!
//! ## Metrics
//!
//! - **Metric**: `resilience.event` (counter)
//! - **When**: Emitted for each hedge issued and for each race in which every attempt failed
//! - **Attributes**:
//!   - `resilience.pipeline.name`: Pipeline identifier from [`HedgingContext::name`][crate::HedgingContext::name]
//!   - `resilience.strategy.name`: Hedging identifier from [`Hedging::layer`]
//!   - `resilience.event.name`: `hedge` or `hedge_exhausted`
//!   - `resilience.attempt.index`: Index of the hedge, or the number of hedges for `hedge_exhausted`
//!
//! ## Logs
//!
//! With [`HedgingContext::enable_logs`][crate::HedgingContext::enable_logs], the middleware
//! emits an `INFO` event per hedge and a `DEBUG` event per finished race. Policy and listener
//! failures are always logged as `WARN` events.
//!
//! [`HedgingResolver`]: crate::resolver::HedgingResolver
//! [`HedgePolicy`]: crate::policy::HedgePolicy
//! [`HedgeListener`]: crate::listener::HedgeListener
//! [`HedgeDecision`]: crate::policy::HedgeDecision
//! [`PercentilePolicy`]: crate::policy::PercentilePolicy

mod args;
mod callbacks;
mod layer;
mod service;

pub use args::{CloneArgs, DeadlineArgs, OnHedgeArgs, RecoveryArgs};
pub use layer::HedgingLayer;
pub use service::Hedging;
