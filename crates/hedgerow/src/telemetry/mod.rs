// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Well-known telemetry keys emitted by the hedging middleware.
//!
//! The keys are attached to metrics (when the `metrics` feature is enabled) and to
//! `tracing` events. They follow the
//! [OpenTelemetry naming guidelines](https://opentelemetry.io/docs/specs/semconv/general/naming/#general-naming-considerations)
//! and match the keys used by the other resilience middleware in this workspace, so hedging
//! events land on the same dashboards.

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;

/// Key used to annotate the name of a resilience pipeline.
///
/// Values are short `snake_case` names such as `search_backend` or `user_profile`.
pub const PIPELINE_NAME: &str = "resilience.pipeline.name";

/// Key used to annotate the name of the hedging strategy within a pipeline.
pub const STRATEGY_NAME: &str = "resilience.strategy.name";

/// Key used to annotate the specific event being emitted.
///
/// Emitted values: [`HEDGE_EVENT`] and [`HEDGE_EXHAUSTED_EVENT`].
pub const EVENT_NAME: &str = "resilience.event.name";

/// Key used to annotate the 0-based attempt index an event refers to.
pub const ATTEMPT_INDEX: &str = "resilience.attempt.index";

/// Event emitted whenever a hedged attempt is issued.
pub const HEDGE_EVENT: &str = "hedge";

/// Event emitted when every issued attempt of a request failed.
pub const HEDGE_EXHAUSTED_EVENT: &str = "hedge_exhausted";
