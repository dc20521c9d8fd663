//! Progress reporting for transferred layers.

use std::time::Duration;

/// Receives one notification per layer whose real bytes were written.
///
/// Placeholder writes are never reported.
pub trait ProgressLogger: Send + Sync {
    /// Called once `name` has been fully transferred.
    fn report_done(&self, name: &str, elapsed: Duration);
}

/// Reports completed layers as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressLogger for TracingProgress {
    fn report_done(&self, name: &str, elapsed: Duration) {
        tracing::info!(
            file = %name,
            elapsed_ms = elapsed.as_millis() as u64,
            "Layer written"
        );
    }
}

/// Discards progress notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressLogger for NoopProgress {
    fn report_done(&self, _name: &str, _elapsed: Duration) {}
}
