// CloudWatch-visible log sink.
//
// One line per record on standard error, tab-separated:
//
//     <LEVEL>\t<request_id or "-">\t<message>
//
// Lambda forwards the sandbox's stderr to the function's CloudWatch log
// stream, so the format stays single-line and machine-splittable. The
// request id slot is bound by the invocation loop for the duration of a
// dispatch; records emitted outside any invocation carry `-`.

use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

/// Log level for sink records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Debug level (most verbose)
    Debug,
    /// Info level (informational messages)
    Info,
    /// Warning level (warning messages)
    Warn,
    /// Error level (error messages)
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// The process log sink.
///
/// In release builds only [`Logger::error`] is retained; the other
/// levels compile to no-ops (`cfg!(debug_assertions)` is a constant the
/// optimizer folds away), so warm-path handlers pay nothing for debug
/// logging left in place.
///
/// # Thread Safety
///
/// The writer and the request id slot sit behind mutexes; the runtime
/// itself is single-threaded, but handlers are free to hand the logger
/// reference to short-lived worker threads.
pub struct Logger {
    /// Request id of the invocation currently being dispatched.
    request_id: Mutex<Option<String>>,
    /// Writer (stderr by default, swappable for test capture).
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    /// Creates a sink writing to standard error.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Mutex::new(None),
            writer: Mutex::new(Box::new(io::stderr())),
        }
    }

    /// Creates a sink with a custom writer (test-only).
    #[cfg(test)]
    fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            request_id: Mutex::new(None),
            writer: Mutex::new(writer),
        }
    }

    /// Logs an error message. Always retained, in every build profile.
    pub fn error(&self, message: &str) {
        self.write(Level::Error, message);
    }

    /// Logs a warning. Elided in release builds.
    pub fn warn(&self, message: &str) {
        if cfg!(debug_assertions) {
            self.write(Level::Warn, message);
        }
    }

    /// Logs an informational message. Elided in release builds.
    pub fn info(&self, message: &str) {
        if cfg!(debug_assertions) {
            self.write(Level::Info, message);
        }
    }

    /// Logs a debug message. Elided in release builds.
    pub fn debug(&self, message: &str) {
        if cfg!(debug_assertions) {
            self.write(Level::Debug, message);
        }
    }

    /// Binds the request id stamped on subsequent records.
    pub(crate) fn bind_request_id(&self, request_id: &str) {
        *self.request_id.lock().unwrap() = Some(request_id.to_string());
    }

    /// Clears the request id slot; subsequent records carry `-`.
    pub(crate) fn clear_request_id(&self) {
        *self.request_id.lock().unwrap() = None;
    }

    fn write(&self, level: Level, message: &str) {
        let request_id = self.request_id.lock().unwrap();
        let request_id = request_id.as_deref().unwrap_or("-");
        let mut writer = self.writer.lock().unwrap();
        let _ = writeln!(writer, "{level}\t{request_id}\t{message}");
        let _ = writer.flush();
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(Logger: Send, Sync);
