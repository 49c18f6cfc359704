// Log sink adapter: call records as `tracing` events
// INFO on success, ERROR (with the error value) on failure

use switchboard_core::port::{CallRecord, LogSink};
use tracing::{error, info};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl TracingLogSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingLogSink {
    fn emit(&self, record: &CallRecord) {
        match &record.error {
            Some(err) => error!(
                target: "switchboard::calls",
                service = %record.service,
                method = %record.method,
                took = ?record.took,
                request = record.request.as_deref(),
                error = %err,
                "call {}",
                record.method
            ),
            None => info!(
                target: "switchboard::calls",
                service = %record.service,
                method = %record.method,
                took = ?record.took,
                request = record.request.as_deref(),
                response = record.response.as_deref(),
                "call {}",
                record.method
            ),
        }
    }
}
