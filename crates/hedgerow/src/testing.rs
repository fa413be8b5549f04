// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

use crate::{Recovery, RecoveryInfo};

/// Output type whose recovery classification is chosen by the test.
#[derive(Debug, Clone)]
pub(crate) struct Response {
    pub(crate) body: &'static str,
    recovery: RecoveryInfo,
}

impl Response {
    pub(crate) fn ok(body: &'static str) -> Self {
        Self {
            body,
            recovery: RecoveryInfo::never(),
        }
    }

    pub(crate) fn transient(body: &'static str) -> Self {
        Self {
            body,
            recovery: RecoveryInfo::retry(),
        }
    }
}

impl Recovery for Response {
    fn recovery(&self) -> RecoveryInfo {
        self.recovery.clone()
    }
}

/// Captures formatted `tracing` output of the current thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).to_string()
    }

    pub(crate) fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(output.contains(expected), "log output does not contain '{expected}', got:\n{output}");
    }

    pub(crate) fn assert_not_contains(&self, unexpected: &str) {
        let output = self.output();
        assert!(!output.contains(unexpected), "log output unexpectedly contains '{unexpected}', got:\n{output}");
    }

    /// Creates a subscriber writing into this capture. Install it with `set_default`.
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber {
        use tracing_subscriber::layer::SubscriberExt;

        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

pub(crate) struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
