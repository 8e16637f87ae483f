use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::error;

/// Error-capture collaborator. Capturing must never fail the caller.
pub trait ErrorSink: Send + Sync {
    fn capture(&self, context: &str, error: &anyhow::Error);
}

/// Logs captured errors with their full cause chain
#[derive(Debug, Default)]
pub struct LoggingErrorSink {
    captured: AtomicU64,
}

impl LoggingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }
}

impl ErrorSink for LoggingErrorSink {
    fn capture(&self, context: &str, error: &anyhow::Error) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        error!("❌ {}: {:#}", context, error);
    }
}

/// Keeps captured errors in memory for later inspection
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(context, rendered error)` pairs in capture order
    pub fn events(&self) -> Vec<(String, String)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorSink for RecordingErrorSink {
    fn capture(&self, context: &str, error: &anyhow::Error) {
        let event = (context.to_string(), format!("{:#}", error));
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_logging_sink_counts() {
        let sink = LoggingErrorSink::new();
        sink.capture("cycle", &anyhow::anyhow!("storage unavailable"));
        sink.capture("cycle", &anyhow::anyhow!("storage unavailable"));
        assert_eq!(sink.captured(), 2);
    }

    #[test]
    fn test_recording_sink_keeps_cause_chain() {
        let sink = RecordingErrorSink::new();
        let error = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("Failed to persist cycle")
            .unwrap_err();
        sink.capture("persist", &error);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "persist");
        assert_eq!(events[0].1, "Failed to persist cycle: connection refused");
    }
}
