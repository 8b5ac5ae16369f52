//! One-way diagnostic channel towards the host adapter.
//!
//! Every message is also forwarded to the `log` facade. The sink is never
//! blocked on and failures inside it are not retried.

use std::fmt;
use std::sync::Arc;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational notice (e.g. a coerced transform length).
    Notice,
    /// A device, context or configuration failure.
    Error,
}

type Sink = Arc<dyn Fn(Severity, &str) + Send + Sync>;

/// Textual notification sink supplied by the host adapter.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<Sink>,
}

impl Diagnostics {
    /// Diagnostics that only go to the log.
    pub fn silent() -> Self {
        Self { sink: None }
    }

    /// Diagnostics forwarded to `sink` in addition to the log.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(Severity, &str) + Send + Sync + 'static,
    {
        Self {
            sink: Some(Arc::new(sink)),
        }
    }

    pub fn notice(&self, message: &str) {
        log::info!("{}", message);
        self.emit(Severity::Notice, message);
    }

    pub fn error(&self, message: &str) {
        log::error!("{}", message);
        self.emit(Severity::Error, message);
    }

    fn emit(&self, severity: Severity, message: &str) {
        if let Some(sink) = &self.sink {
            sink(severity, message);
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
