use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// One operator-facing log line.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub message: String,
}

impl LogEntry {
    /// Entry stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let since_epoch = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        write!(
            f,
            "[{}.{:03}] {}",
            since_epoch.as_secs(),
            since_epoch.subsec_millis(),
            self.message
        )
    }
}

/// Sink for operator-facing status messages.
///
/// Injected into every component at construction instead of a process-wide
/// logger, so an embedding UI can route messages to its own log view. Called
/// from the capture, detection and control threads concurrently.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

/// Silent sink that discards all messages.
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _message: &str) {}
}

/// Forwards operator messages to the `log` facade at info level.
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Retains timestamped entries in memory.
///
/// Used by tests and by front ends that render their own log list.
#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    /// True if any retained message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|e| e.message.contains(needle))
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LogEntry::now(message));
    }
}
