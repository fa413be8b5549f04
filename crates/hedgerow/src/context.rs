// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::marker::PhantomData;

use tick::Clock;

use crate::utils::TelemetryHelper;

pub(crate) const DEFAULT_PIPELINE_NAME: &str = "default";

/// Shared dependencies for the hedging middleware of one pipeline.
///
/// A `HedgingContext` carries the [`Clock`] used to schedule hedges and measure attempt
/// latencies, plus the telemetry configuration. Pass the same context to every hedging
/// layer of a pipeline so their telemetry shares the pipeline name.
///
/// # Examples
///
/// ```
/// # use tick::Clock;
/// # use hedgerow::HedgingContext;
/// # fn example(clock: &Clock) {
/// let context = HedgingContext::<String, String>::new(clock)
///     .name("search_backend")
///     .enable_logs();
/// # let _context = context;
/// # }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub struct HedgingContext<In, Out> {
    clock: Clock,
    name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
    logs_enabled: bool,
    _types: PhantomData<fn(In) -> Out>,
}

impl<In, Out> HedgingContext<In, Out> {
    /// Creates a context with a clock. The pipeline name defaults to `default`.
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        Self {
            clock: clock.as_ref().clone(),
            name: Cow::Borrowed(DEFAULT_PIPELINE_NAME),
            #[cfg(any(feature = "metrics", test))]
            meter: None,
            logs_enabled: false,
            _types: PhantomData,
        }
    }

    /// Sets the pipeline name used for telemetry correlation. Prefer `snake_case`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables metrics reporting with the given OpenTelemetry meter provider.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            meter: Some(crate::telemetry::metrics::create_meter(provider)),
            ..self
        }
    }

    /// Enables informational `tracing` events for issued hedges and completed races.
    ///
    /// Warnings about failing policies and listeners are always emitted.
    #[must_use]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Returns the clock shared by the pipeline.
    #[must_use]
    pub fn get_clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn create_telemetry(&self, strategy_name: Cow<'static, str>) -> TelemetryHelper {
        TelemetryHelper {
            pipeline_name: self.name.clone(),
            strategy_name,
            #[cfg(any(feature = "metrics", test))]
            event_reporter: self.meter.as_ref().map(crate::telemetry::metrics::create_resilience_event_counter),
            logs_enabled: self.logs_enabled,
        }
    }
}

impl<In, Out> Clone for HedgingContext<In, Out> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            name: self.name.clone(),
            #[cfg(any(feature = "metrics", test))]
            meter: self.meter.clone(),
            logs_enabled: self.logs_enabled,
            _types: PhantomData,
        }
    }
}
