//! Logging collaborator.
//!
//! Diagnostics are always emitted as `tracing` events. A [`LogSink`] can be
//! configured to receive the same messages as `(level, text)` pairs; it is
//! purely observational.

use std::fmt;
use std::sync::Arc;

/// Severity passed to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Critical,
    Error,
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        })
    }
}

/// Callback receiving every diagnostic.
pub type LogSink = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Per-connection logger.
#[derive(Clone, Default)]
pub(crate) struct Logger {
    connection: u64,
    sink: Option<LogSink>,
}

impl Logger {
    pub(crate) fn new(connection: u64, sink: Option<LogSink>) -> Self {
        Self { connection, sink }
    }

    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        let connection = self.connection;
        match level {
            LogLevel::Critical => tracing::error!(connection, critical = true, "{}", message),
            LogLevel::Error => tracing::error!(connection, "{}", message),
            LogLevel::Info => tracing::info!(connection, "{}", message),
            LogLevel::Debug => tracing::debug!(connection, "{}", message),
        }
        if let Some(sink) = &self.sink {
            sink(level, message);
        }
    }

    pub(crate) fn critical(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Critical, message.as_ref());
    }

    pub(crate) fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    pub(crate) fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub(crate) fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref());
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("connection", &self.connection)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
