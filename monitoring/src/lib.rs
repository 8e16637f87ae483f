//! Monitoring - observability collaborator for the signal pipeline
//!
//! - `PipelineMetrics`: prometheus counters, gauges and histograms with a private registry
//! - `ErrorSink`: fire-and-forget error capture

pub mod errors;
pub mod metrics;

pub use errors::{ErrorSink, LoggingErrorSink, RecordingErrorSink};
pub use metrics::PipelineMetrics;
