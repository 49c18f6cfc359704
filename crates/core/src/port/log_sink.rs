// Log Sink Port - structured call records

use std::time::Duration;

/// One record per completed call
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub service: String,
    pub method: String,
    pub took: Duration,
    /// Rendered arguments (skip-listed fields removed)
    pub request: Option<String>,
    /// Rendered result; `None` on failure or when the method skips `response`
    pub response: Option<String>,
    /// Failure outcome; `Some` means the record is emitted at error level
    pub error: Option<String>,
}

impl CallRecord {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub trait LogSink: Send + Sync {
    fn emit(&self, record: &CallRecord);
}
