//! Build log output and diagnostic tracing.
//!
//! Two separate channels exist:
//!
//! - The **build log** ([`LogSink`]) receives the human-readable lines the
//!   build host shows to users. Their exact text is part of the external
//!   contract and is emitted only for verbose rules.
//! - **Diagnostics** go through `tracing` and are filtered with the
//!   `CONTENT_REPLACE_LOG` environment variable.

use std::io::Write;
use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Receiver for build log lines, in the order they are produced.
pub trait LogSink {
    fn log(&mut self, line: &str);
}

/// Collects lines in memory.
impl LogSink for Vec<String> {
    fn log(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Writes each line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn log(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not abort the build step.
        let _ = writeln!(out, "{line}");
    }
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&mut self, _line: &str) {}
}

static INIT: Once = Once::new();

/// Initialize diagnostic logging to stderr.
///
/// Reads `CONTENT_REPLACE_LOG` for the filter (e.g. `content_replace=debug`),
/// falling back to `default_filter`. Calling it more than once is a no-op.
pub fn init_tracing(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("CONTENT_REPLACE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // Another subscriber may already be installed by an embedding host.
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .without_time(),
            )
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_preserves_order() {
        let mut sink: Vec<String> = Vec::new();
        sink.log("first");
        sink.log("second");
        assert_eq!(sink, vec!["first", "second"]);
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing("warn");
        init_tracing("debug");
    }
}
