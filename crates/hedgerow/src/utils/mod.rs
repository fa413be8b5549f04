// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod fn_wrapper;
pub(crate) use fn_wrapper::define_fn_wrapper;

mod telemetry_helper;
pub(crate) use telemetry_helper::TelemetryHelper;

define_fn_wrapper!(EnableIf<In>(Fn(input: &In) -> bool));

impl<In> EnableIf<In> {
    pub(crate) fn always() -> Self {
        Self::new(|_| true)
    }

    pub(crate) fn never() -> Self {
        Self::new(|_| false)
    }
}
