use crate::ActionError;

/// Local analytics pipeline that mirrors every relayed action.
///
/// Called synchronously from the relay step and never awaited: a slow or
/// failing sink has no effect on delivery order.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: &str, properties: &serde_json::Value);
}

/// Receives relay failures for error reporting.
pub trait ErrorReporter: Send + Sync {
    fn capture_exception(&self, error: &ActionError);
}

/// Emits tracked events as `debug` log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn track(&self, event: &str, properties: &serde_json::Value) {
        tracing::debug!(event, %properties, "track");
    }
}

/// Discards tracked events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn track(&self, _event: &str, _properties: &serde_json::Value) {}
}

/// Logs captured relay failures at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn capture_exception(&self, error: &ActionError) {
        tracing::error!(error = %error, "action relay failed");
    }
}
