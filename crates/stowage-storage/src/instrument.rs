//! Instrumentation events emitted by storage operations.
//!
//! Each logical operation produces exactly one [`StorageEvent`], delivered to the
//! backend's [`Instrumenter`]. The default [`TracingInstrumenter`] turns events
//! into structured `tracing` records.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Operation an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
    StreamingDownload,
    Delete,
    Exist,
    Url,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::StreamingDownload => "streaming_download",
            Operation::Delete => "delete",
            Operation::Exist => "exist",
            Operation::Url => "url",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub operation: Operation,
    /// Backend name, e.g. "disk" or "azure"
    pub service: &'static str,
    pub key: String,
    pub duration: Duration,
    pub succeeded: bool,
    pub checksum: Option<String>,
    pub exist: Option<bool>,
    pub url: Option<String>,
}

impl StorageEvent {
    pub(crate) fn new(operation: Operation, service: &'static str, key: &str, started: Instant) -> Self {
        Self {
            operation,
            service,
            key: key.to_string(),
            duration: started.elapsed(),
            succeeded: true,
            checksum: None,
            exist: None,
            url: None,
        }
    }

    pub(crate) fn with_checksum(mut self, checksum: Option<&str>) -> Self {
        self.checksum = checksum.map(String::from);
        self
    }

    pub(crate) fn with_exist(mut self, exist: bool) -> Self {
        self.exist = Some(exist);
        self
    }

    pub(crate) fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub(crate) fn with_outcome<T, E>(mut self, result: &Result<T, E>) -> Self {
        self.succeeded = result.is_ok();
        self
    }
}

/// Receiver of storage events
pub trait Instrumenter: Send + Sync {
    fn instrument(&self, event: StorageEvent);
}

/// Emits every event as a `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstrumenter;

impl Instrumenter for TracingInstrumenter {
    fn instrument(&self, event: StorageEvent) {
        let duration_ms = event.duration.as_secs_f64() * 1000.0;
        if event.succeeded {
            tracing::debug!(
                operation = %event.operation,
                service = event.service,
                key = %event.key,
                checksum = ?event.checksum,
                exist = ?event.exist,
                url = ?event.url,
                duration_ms = duration_ms,
                "Storage operation completed"
            );
        } else {
            tracing::warn!(
                operation = %event.operation,
                service = event.service,
                key = %event.key,
                checksum = ?event.checksum,
                duration_ms = duration_ms,
                "Storage operation failed"
            );
        }
    }
}

/// Keeps events in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryInstrumenter {
    events: Mutex<Vec<StorageEvent>>,
}

impl MemoryInstrumenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<StorageEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Instrumenter for MemoryInstrumenter {
    fn instrument(&self, event: StorageEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
