use anyhow::{Context, Result};
use common::{SignalCategory, SourceKind};
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::debug;

/// Pipeline Metrics - Prometheus instruments for the signal pipeline.
///
/// Owns its registry; nothing is registered globally. Every recording method is
/// infallible so callers can treat metrics as fire-and-forget.
pub struct PipelineMetrics {
    registry: Registry,
    processed_social_posts: IntCounter,
    processed_pools: IntCounter,
    processed_token_metrics: IntCounter,
    processed_forum_calls: IntCounter,
    generated_signals: IntCounter,
    rejected_records: IntCounterVec,
    source_failures: IntCounterVec,
    cycle_failures: IntCounter,
    signal_score: GaugeVec,
    stage_records: IntGaugeVec,
    processing_time: Histogram,
    stage_duration: HistogramVec,
}

const STAGE_BUCKETS: [f64; 10] = [0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const CYCLE_BUCKETS: [f64; 9] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter> {
            let counter = IntCounter::new(name, help).with_context(|| format!("Invalid counter {name}"))?;
            registry
                .register(Box::new(counter.clone()))
                .with_context(|| format!("Failed to register {name}"))?;
            Ok(counter)
        };

        let processed_social_posts = counter("processed_social_posts_total", "Validated social posts processed")?;
        let processed_pools = counter("processed_pools_total", "Validated liquidity pools processed")?;
        let processed_token_metrics = counter("processed_token_metrics_total", "Validated token metric snapshots processed")?;
        let processed_forum_calls = counter("processed_forum_calls_total", "Validated forum calls processed")?;
        let generated_signals = counter("generated_signals_total", "Signals produced")?;
        let cycle_failures = counter("cycle_failures_total", "Cycles aborted by an unrecovered error")?;

        let rejected_records = IntCounterVec::new(
            Opts::new("rejected_records_total", "Records dropped by validation"),
            &["source"],
        )?;
        let source_failures = IntCounterVec::new(
            Opts::new("source_failures_total", "Source fetches that degraded to empty"),
            &["source"],
        )?;
        let signal_score = GaugeVec::new(
            Opts::new("signal_score", "Latest aggregate score per token"),
            &["token", "category"],
        )?;
        let stage_records = IntGaugeVec::new(
            Opts::new("stage_records", "Records leaving each stage in the latest cycle"),
            &["stage"],
        )?;
        let processing_time = Histogram::with_opts(
            HistogramOpts::new("processing_time_seconds", "End-to-end cycle duration").buckets(CYCLE_BUCKETS.to_vec()),
        )?;
        let stage_duration = HistogramVec::new(
            HistogramOpts::new("stage_duration_seconds", "Duration of each pipeline stage")
                .buckets(STAGE_BUCKETS.to_vec()),
            &["stage"],
        )?;

        registry.register(Box::new(rejected_records.clone()))?;
        registry.register(Box::new(source_failures.clone()))?;
        registry.register(Box::new(signal_score.clone()))?;
        registry.register(Box::new(stage_records.clone()))?;
        registry.register(Box::new(processing_time.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
            .context("Failed to register process collector")?;

        Ok(Self {
            registry,
            processed_social_posts,
            processed_pools,
            processed_token_metrics,
            processed_forum_calls,
            generated_signals,
            rejected_records,
            source_failures,
            cycle_failures,
            signal_score,
            stage_records,
            processing_time,
            stage_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn processed_counter(&self, source: SourceKind) -> &IntCounter {
        match source {
            SourceKind::SocialPost => &self.processed_social_posts,
            SourceKind::Pool => &self.processed_pools,
            SourceKind::TokenMetrics => &self.processed_token_metrics,
            SourceKind::ForumCall => &self.processed_forum_calls,
        }
    }

    pub fn record_processed(&self, source: SourceKind, count: usize) {
        self.processed_counter(source).inc_by(count as u64);
    }

    pub fn record_rejected(&self, source: SourceKind, count: usize) {
        self.rejected_records
            .with_label_values(&[source.as_str()])
            .inc_by(count as u64);
    }

    pub fn record_source_failure(&self, source: SourceKind) {
        self.source_failures.with_label_values(&[source.as_str()]).inc();
    }

    pub fn record_cycle_failure(&self) {
        self.cycle_failures.inc();
    }

    pub fn record_signals(&self, count: usize) {
        self.generated_signals.inc_by(count as u64);
    }

    pub fn set_signal_score(&self, token: &str, category: SignalCategory, score: f64) {
        self.signal_score
            .with_label_values(&[token, category.as_str()])
            .set(score);
    }

    pub fn set_stage_records(&self, stage: &str, count: usize) {
        self.stage_records
            .with_label_values(&[stage])
            .set(count as i64);
    }

    pub fn observe_stage(&self, stage: &str, seconds: f64) {
        debug!("Stage {} took {:.3}s", stage, seconds);
        self.stage_duration.with_label_values(&[stage]).observe(seconds);
    }

    pub fn observe_cycle(&self, seconds: f64) {
        self.processing_time.observe(seconds);
    }

    pub fn processed_total(&self, source: SourceKind) -> u64 {
        self.processed_counter(source).get()
    }

    pub fn rejected_total(&self, source: SourceKind) -> u64 {
        self.rejected_records.with_label_values(&[source.as_str()]).get()
    }

    pub fn source_failures_total(&self, source: SourceKind) -> u64 {
        self.source_failures.with_label_values(&[source.as_str()]).get()
    }

    pub fn cycle_failures_total(&self) -> u64 {
        self.cycle_failures.get()
    }

    pub fn generated_signals_total(&self) -> u64 {
        self.generated_signals.get()
    }

    pub fn signal_score_value(&self, token: &str, category: SignalCategory) -> f64 {
        self.signal_score
            .with_label_values(&[token, category.as_str()])
            .get()
    }

    /// Text exposition format, for an external scrape endpoint
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics exposition is not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_source() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_processed(SourceKind::SocialPost, 12);
        metrics.record_processed(SourceKind::SocialPost, 3);
        metrics.record_rejected(SourceKind::ForumCall, 2);
        metrics.record_source_failure(SourceKind::Pool);

        assert_eq!(metrics.processed_total(SourceKind::SocialPost), 15);
        assert_eq!(metrics.processed_total(SourceKind::Pool), 0);
        assert_eq!(metrics.rejected_total(SourceKind::ForumCall), 2);
        assert_eq!(metrics.source_failures_total(SourceKind::Pool), 1);
    }

    #[test]
    fn test_render_exposition() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_signals(2);
        metrics.set_signal_score("So111", SignalCategory::StrongBuy, 0.84);
        metrics.set_stage_records("validate", 40);
        metrics.observe_stage("ingest", 0.3);
        metrics.observe_cycle(1.2);

        let text = metrics.render().unwrap();
        assert!(text.contains("generated_signals_total 2"));
        assert!(text
            .lines()
            .any(|line| line.starts_with("signal_score{") && line.contains("token=\"So111\"") && line.ends_with(" 0.84")));
        assert_eq!(metrics.signal_score_value("So111", SignalCategory::StrongBuy), 0.84);
        assert!(text.contains("stage_records{stage=\"validate\"} 40"));
        assert!(text.contains("stage_duration_seconds_count{stage=\"ingest\"} 1"));
        assert!(text.contains("processing_time_seconds_count 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = PipelineMetrics::new().unwrap();
        let b = PipelineMetrics::new().unwrap();
        a.record_cycle_failure();
        assert_eq!(a.cycle_failures_total(), 1);
        assert_eq!(b.cycle_failures_total(), 0);
    }
}
