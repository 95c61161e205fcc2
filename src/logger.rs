//! Injectable logger for page-originated messages
//!
//! Console output, failed sub-resource loads and uncaught script errors come
//! from the page, not from this crate, so callers get to decide where they
//! go. The default forwards to `tracing`.

use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sink for messages produced by the captured page and the asset server
pub trait CaptureLogger: Send + Sync {
    /// Informational message (console.log, console.info, ...)
    fn info(&self, message: &str);
    /// Warning (console.warn, missing assets)
    fn warn(&self, message: &str);
    /// Error (console.error, load failures, uncaught exceptions)
    fn error(&self, message: &str);
}

/// Logger that forwards to `tracing` under the `capture_template::page` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl CaptureLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "capture_template::page", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "capture_template::page", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "capture_template::page", "{}", message);
    }
}

/// Shared logger handle
pub type SharedLogger = Arc<dyn CaptureLogger>;

/// The default logger as a shared handle
pub fn default_logger() -> SharedLogger {
    Arc::new(TracingLogger)
}

/// Debug formatting for structs holding a `SharedLogger`
pub(crate) struct LoggerDebug;

impl fmt::Debug for LoggerDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<logger>")
    }
}
