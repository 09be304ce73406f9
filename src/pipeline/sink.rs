//! User-facing output lines.
//!
//! The core reports results and failures as `(severity, message)` pairs.  How
//! they are rendered is up to the [`TextSink`]; [`LogSink`] writes them
//! through the `log` facade under the `cameron::output` target.

/// How a line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Receiver of user-facing output lines.
pub trait TextSink: Send + Sync {
    fn emit(&self, severity: Severity, message: &str);

    fn info(&self, message: &str) {
        self.emit(Severity::Info, message);
    }

    fn error(&self, message: &str) {
        self.emit(Severity::Error, message);
    }
}

/// [`TextSink`] that forwards to `log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TextSink for LogSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => log::info!(target: "cameron::output", "{message}"),
            Severity::Error => log::error!(target: "cameron::output", "{message}"),
        }
    }
}

/// Sink that records every line, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    lines: std::sync::Mutex<Vec<(Severity, String)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn lines(&self) -> Vec<(Severity, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, m)| m).collect()
    }
}

#[cfg(test)]
impl TextSink for RecordingSink {
    fn emit(&self, severity: Severity, message: &str) {
        self.lines.lock().unwrap().push((severity, message.to_string()));
    }
}
