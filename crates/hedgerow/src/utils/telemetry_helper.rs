// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

/// Names and instruments a single hedging strategy reports under.
#[derive(Debug, Clone)]
pub(crate) struct TelemetryHelper {
    pub(crate) pipeline_name: Cow<'static, str>,
    pub(crate) strategy_name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    pub(crate) event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
    pub(crate) logs_enabled: bool,
}

impl TelemetryHelper {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn metrics_enabled(&self) -> bool {
        self.event_reporter.is_some()
    }

    #[cfg_attr(
        not(any(feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "nothing to report without the metrics feature")
    )]
    pub(crate) fn report_event(&self, event_name: &'static str, attempt_index: u32) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(reporter) = &self.event_reporter {
            use crate::telemetry::{ATTEMPT_INDEX, EVENT_NAME, PIPELINE_NAME, STRATEGY_NAME};

            reporter.add(
                1,
                &[
                    opentelemetry::KeyValue::new(PIPELINE_NAME, self.pipeline_name.clone()),
                    opentelemetry::KeyValue::new(STRATEGY_NAME, self.strategy_name.clone()),
                    opentelemetry::KeyValue::new(EVENT_NAME, event_name),
                    opentelemetry::KeyValue::new(ATTEMPT_INDEX, i64::from(attempt_index)),
                ],
            );
        }
    }
}
