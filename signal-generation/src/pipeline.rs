// Signal Generation Pipeline
// Drives ingest -> validate -> score -> aggregate -> persist -> cache, once per cycle

use crate::aggregator::{AssetInput, SentimentSample, SignalAggregator};
use crate::assets::AssetIndex;
use crate::config::{CycleConfig, PipelineSettings};
use crate::normalizer::MarketMetricsInput;
use crate::storage::{
    CycleBatch, InMemoryStore, SignalStore, StoredRecord, Table, METRICS_CACHE_KEY, SIGNALS_CACHE_KEY,
};
use crate::validators::Validator;
use anyhow::{Context, Result};
use common::{
    ForumCall, LiquidityPool, RawRecord, SentimentResult, Signal, SocialPost, SourceKind, TokenMetrics,
    ValidatedRecord,
};
use data_ingestion::{
    call_profitability, fetch_token_metrics, parse_trading_call, pool_token_addresses, FetchError, ForumConnector,
    HttpTransport, PoolConnector, SocialConnector, SourceConnector, TokenMetricsConnector, TokenMetricsLookup,
    TradeAction, Transport,
};
use monitoring::{ErrorSink, LoggingErrorSink, PipelineMetrics};
use sentiment_analysis::CompositeSentimentScorer;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{timeout_at, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One explicitly owned client per upstream source
pub struct PipelineSources {
    pub social: Arc<dyn SourceConnector>,
    pub pools: Arc<dyn SourceConnector>,
    pub token_metrics: Arc<dyn TokenMetricsLookup>,
    /// Token lookups in flight at once
    pub token_concurrency: usize,
    pub forum: Arc<dyn SourceConnector>,
}

impl PipelineSources {
    /// HTTP-backed connectors for every configured source
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(
            HttpTransport::new(settings.retry.request_timeout()).context("Failed to build HTTP transport")?,
        );
        let retry = settings.retry.policy();
        let sources = &settings.sources;

        let token_metrics = TokenMetricsConnector::new(sources.token_metrics.clone(), transport.clone(), retry.clone());

        Ok(Self {
            social: Arc::new(SocialConnector::new(sources.social.clone(), transport.clone(), retry.clone())),
            pools: Arc::new(PoolConnector::new(sources.pools.clone(), transport.clone(), retry.clone())),
            token_concurrency: token_metrics.max_concurrent(),
            token_metrics: Arc::new(token_metrics),
            forum: Arc::new(ForumConnector::new(sources.forum.clone(), transport, retry)),
        })
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Raw records received per source
    pub ingested: BTreeMap<SourceKind, usize>,
    /// Records that passed validation per source
    pub valid: BTreeMap<SourceKind, usize>,
    /// Sources that failed or were cut off by the deadline
    pub degraded: Vec<SourceKind>,
    pub scored_posts: usize,
    pub signals: Vec<Signal>,
    pub deadline_hit: bool,
    pub duration: Duration,
}

enum Degradation {
    Failed(FetchError),
    /// Carries whatever arrived before the deadline
    DeadlineExceeded(Vec<RawRecord>),
}

type SourceResult = std::result::Result<Vec<RawRecord>, Degradation>;

#[derive(Default)]
struct Ingested {
    records: Vec<RawRecord>,
    degraded: Vec<SourceKind>,
    deadline_hit: bool,
}

impl Ingested {
    fn absorb(&mut self, source: SourceKind, result: SourceResult, metrics: &PipelineMetrics) {
        match result {
            Ok(records) => {
                debug!("Ingested {} {} records", records.len(), source);
                self.records.extend(records);
            }
            Err(Degradation::Failed(e)) => {
                warn!("⚠️ Source {} degraded to empty for this cycle: {}", source, e);
                metrics.record_source_failure(source);
                self.degraded.push(source);
            }
            Err(Degradation::DeadlineExceeded(partial)) => {
                warn!(
                    "⚠️ Source {} cut off at the cycle deadline with {} records",
                    source,
                    partial.len()
                );
                metrics.record_source_failure(source);
                self.degraded.push(source);
                self.deadline_hit = true;
                self.records.extend(partial);
            }
        }
    }
}

/// Validated records of one cycle, split by source
#[derive(Default)]
struct CycleRecords {
    posts: Vec<SocialPost>,
    pools: Vec<LiquidityPool>,
    tokens: Vec<TokenMetrics>,
    calls: Vec<ForumCall>,
}

impl CycleRecords {
    fn split(records: Vec<ValidatedRecord>) -> Self {
        let mut split = Self::default();
        for record in records {
            match record {
                ValidatedRecord::SocialPost(post) => split.posts.push(post),
                ValidatedRecord::Pool(pool) => split.pools.push(pool),
                ValidatedRecord::TokenMetrics(metrics) => split.tokens.push(metrics),
                ValidatedRecord::ForumCall(call) => split.calls.push(call),
            }
        }
        split
    }

    fn counts(&self) -> BTreeMap<SourceKind, usize> {
        BTreeMap::from([
            (SourceKind::SocialPost, self.posts.len()),
            (SourceKind::Pool, self.pools.len()),
            (SourceKind::TokenMetrics, self.tokens.len()),
            (SourceKind::ForumCall, self.calls.len()),
        ])
    }
}

/// Signal pipeline orchestrator
pub struct PipelineOrchestrator {
    sources: PipelineSources,
    validator: Validator,
    scorer: CompositeSentimentScorer,
    aggregator: SignalAggregator,
    store: Arc<dyn SignalStore>,
    metrics: Arc<PipelineMetrics>,
    errors: Arc<dyn ErrorSink>,
    cycle: CycleConfig,
}

impl PipelineOrchestrator {
    /// In-memory storage and a logging error sink until replaced
    pub fn new(sources: PipelineSources, settings: &PipelineSettings) -> Result<Self> {
        settings.validate().context("Invalid pipeline settings")?;
        let scorer = CompositeSentimentScorer::from_config(&settings.sentiment)
            .context("Failed to build sentiment scorer")?;
        let metrics = PipelineMetrics::new().context("Failed to register pipeline metrics")?;

        Ok(Self {
            sources,
            validator: Validator::new(),
            scorer,
            aggregator: SignalAggregator::new(settings.aggregation.clone()),
            store: Arc::new(InMemoryStore::new()),
            metrics: Arc::new(metrics),
            errors: Arc::new(LoggingErrorSink::new()),
            cycle: settings.cycle.clone(),
        })
    }

    /// Set signal storage
    pub fn with_store(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the configured sentiment scorer
    pub fn with_scorer(mut self, scorer: CompositeSentimentScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Run one cycle. A failure past the source boundary is captured, counted and returned.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let started = Instant::now();

        let result = self.execute_cycle(cycle_id).await;
        self.metrics.observe_cycle(started.elapsed().as_secs_f64());

        match result {
            Ok(report) => {
                info!(
                    "✅ Cycle {} finished in {:.2}s with {} signals",
                    cycle_id,
                    report.duration.as_secs_f64(),
                    report.signals.len()
                );
                Ok(report)
            }
            Err(e) => {
                self.metrics.record_cycle_failure();
                self.errors.capture(&format!("cycle {}", cycle_id), &e);
                Err(e)
            }
        }
    }

    /// Run cycles on the configured cadence until `shutdown` resolves.
    /// A failed cycle never stops the loop.
    pub async fn run_forever(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.cycle.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("🚀 Signal pipeline running every {}s", self.cycle.interval_secs);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Shutdown requested, stopping signal pipeline");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if self.run_cycle().await.is_err() {
                        warn!("Cycle aborted; next cycle in {}s", self.cycle.interval_secs);
                    }
                }
            }
        }
    }

    async fn execute_cycle(&self, cycle_id: Uuid) -> Result<CycleReport> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.cycle.deadline();
        info!("🔄 Starting cycle {}", cycle_id);

        // Ingest
        let stage = Instant::now();
        let ingested = self.ingest(deadline).await;
        let mut ingested_counts: BTreeMap<SourceKind, usize> = SourceKind::ALL.iter().map(|s| (*s, 0)).collect();
        for record in &ingested.records {
            *ingested_counts.entry(record.source).or_default() += 1;
        }
        self.finish_stage("ingest", stage, ingested.records.len());
        let mut deadline_hit = ingested.deadline_hit;

        // Validate
        let stage = Instant::now();
        let records = CycleRecords::split(self.validator.filter_valid(&ingested.records));
        let valid_counts = records.counts();
        for (source, valid) in &valid_counts {
            self.metrics.record_processed(*source, *valid);
            let total = ingested_counts.get(source).copied().unwrap_or(0);
            self.metrics.record_rejected(*source, total.saturating_sub(*valid));
        }
        self.finish_stage("validate", stage, valid_counts.values().sum());

        // Score
        let stage = Instant::now();
        let (sentiments, scoring_cut_off) = self.scorer.analyze_posts_until(&records.posts, Some(deadline)).await;
        deadline_hit |= scoring_cut_off;
        self.finish_stage("score", stage, sentiments.len());

        // Aggregate
        let stage = Instant::now();
        let inputs = self.asset_inputs(&records, &sentiments);
        let signals = self.aggregator.generate_batch(&inputs);
        self.metrics.record_signals(signals.len());
        for signal in &signals {
            self.metrics.set_signal_score(&signal.asset_id, signal.category, signal.score);
        }
        self.finish_stage("aggregate", stage, signals.len());

        // Persist
        let stage = Instant::now();
        let batch = self
            .build_batch(cycle_id, &records, &sentiments, &signals)
            .context("Failed to serialize cycle records")?;
        self.store
            .persist_cycle(&batch)
            .await
            .with_context(|| format!("Failed to persist cycle {}", cycle_id))?;
        self.finish_stage("persist", stage, batch.len());

        // Cache
        let stage = Instant::now();
        self.cache_json(SIGNALS_CACHE_KEY, &signals, self.cycle.signal_cache_ttl()).await;
        self.cache_json(METRICS_CACHE_KEY, &records.tokens, self.cycle.metrics_cache_ttl()).await;
        self.finish_stage("cache", stage, 2);

        Ok(CycleReport {
            cycle_id,
            ingested: ingested_counts,
            valid: valid_counts,
            degraded: ingested.degraded,
            scored_posts: sentiments.len(),
            signals,
            deadline_hit,
            duration: started.elapsed(),
        })
    }

    fn finish_stage(&self, name: &str, started: Instant, records: usize) {
        let seconds = started.elapsed().as_secs_f64();
        self.metrics.observe_stage(name, seconds);
        self.metrics.set_stage_records(name, records);
        debug!("Stage {} handled {} records in {:.3}s", name, records, seconds);
    }

    /// Social, forum and pools->token-metrics run as three concurrent branches
    async fn ingest(&self, deadline: tokio::time::Instant) -> Ingested {
        let (social, forum, (pools, tokens)) = tokio::join!(
            fetch_source(self.sources.social.as_ref(), deadline),
            fetch_source(self.sources.forum.as_ref(), deadline),
            self.ingest_market(deadline),
        );

        let mut ingested = Ingested::default();
        ingested.absorb(SourceKind::SocialPost, social, &self.metrics);
        ingested.absorb(SourceKind::ForumCall, forum, &self.metrics);
        ingested.absorb(SourceKind::Pool, pools, &self.metrics);
        ingested.absorb(SourceKind::TokenMetrics, tokens, &self.metrics);
        ingested
    }

    async fn ingest_market(&self, deadline: tokio::time::Instant) -> (SourceResult, SourceResult) {
        let pools = fetch_source(self.sources.pools.as_ref(), deadline).await;
        // Only pools that pass validation drive token lookups
        let addresses = match &pools {
            Ok(pools) => {
                let valid: Vec<RawRecord> = pools
                    .iter()
                    .filter(|pool| self.validator.validate_pool(&pool.payload).is_ok())
                    .cloned()
                    .collect();
                pool_token_addresses(&valid)
            }
            Err(_) => Vec::new(),
        };
        if addresses.is_empty() {
            return (pools, Ok(Vec::new()));
        }

        let batch = fetch_token_metrics(
            self.sources.token_metrics.as_ref(),
            &addresses,
            self.sources.token_concurrency,
            Some(deadline),
        )
        .await;
        let tokens = if batch.deadline_hit {
            Err(Degradation::DeadlineExceeded(batch.records))
        } else {
            Ok(batch.records)
        };
        (pools, tokens)
    }

    /// Group sentiment samples and metric inputs by tracked token
    fn asset_inputs(&self, records: &CycleRecords, sentiments: &[SentimentResult]) -> BTreeMap<String, AssetInput> {
        let index = AssetIndex::from_metrics(&records.tokens);
        let mut inputs: BTreeMap<String, AssetInput> = BTreeMap::new();

        for metrics in &records.tokens {
            inputs.entry(metrics.address.clone()).or_default().metrics =
                Some(MarketMetricsInput::from_token_metrics(metrics));
        }

        let scores: HashMap<&str, &SentimentResult> = sentiments.iter().map(|s| (s.subject_id.as_str(), s)).collect();
        let mut unattributed = 0;
        for post in &records.posts {
            let Some(result) = scores.get(post.id.as_str()) else {
                continue;
            };
            let assets = index.resolve(&post.text);
            if assets.is_empty() {
                unattributed += 1;
            }
            for asset in assets {
                let sample = SentimentSample::scored(result.score).with_engagement(post.engagement);
                inputs.entry(asset.to_string()).or_default().sentiment.push(sample);
            }
        }

        for call in &records.calls {
            let assets = index.resolve(&call.content);
            if assets.is_empty() {
                unattributed += 1;
            }
            for asset in assets {
                inputs
                    .entry(asset.to_string())
                    .or_default()
                    .sentiment
                    .push(SentimentSample::scored(forum_call_score(call)));
            }
        }

        if unattributed > 0 {
            debug!("{} posts and calls matched no tracked token", unattributed);
        }
        inputs
    }

    fn build_batch(
        &self,
        cycle_id: Uuid,
        records: &CycleRecords,
        sentiments: &[SentimentResult],
        signals: &[Signal],
    ) -> Result<CycleBatch> {
        let mut batch = CycleBatch::new(cycle_id);
        let scores: HashMap<&str, &SentimentResult> = sentiments.iter().map(|s| (s.subject_id.as_str(), s)).collect();

        for post in &records.posts {
            let mut payload = serde_json::to_value(post)?;
            if let Some(result) = scores.get(post.id.as_str()) {
                insert_field(&mut payload, "sentiment", serde_json::to_value(result)?);
            }
            batch.push(Table::SocialPosts, StoredRecord::new(post.id.clone(), payload));
        }

        let pool_of: HashMap<&str, &str> = records
            .pools
            .iter()
            .map(|pool| (pool.mint_a.as_str(), pool.id.as_str()))
            .collect();
        for metrics in &records.tokens {
            let key = ValidatedRecord::TokenMetrics(metrics.clone()).natural_key();
            let key = match pool_of.get(metrics.address.as_str()) {
                Some(pool_id) => format!("{}:{}", pool_id, key),
                None => key,
            };
            batch.push(Table::MarketMetrics, StoredRecord::from_serialize(key, metrics)?);
        }

        let index = AssetIndex::from_metrics(&records.tokens);
        let prices: HashMap<&str, f64> = records.tokens.iter().map(|m| (m.address.as_str(), m.price_usd)).collect();
        for call in &records.calls {
            let parsed = parse_trading_call(&call.content);
            let assets = index.resolve(&call.content);
            let profitability = parsed.entry_price.and_then(|entry| {
                assets
                    .first()
                    .and_then(|asset| prices.get(asset))
                    .and_then(|current| call_profitability(entry, *current))
            });

            let mut payload = serde_json::to_value(call)?;
            insert_field(&mut payload, "assets", json!(assets));
            insert_field(&mut payload, "entry_price", json!(parsed.entry_price));
            insert_field(&mut payload, "profitability", json!(profitability));
            batch.push(Table::ForumCalls, StoredRecord::new(call.post_id.clone(), payload));
        }

        for signal in signals {
            batch.push(Table::Signals, StoredRecord::from_serialize(signal.natural_key(), signal)?);
        }

        Ok(batch)
    }

    async fn cache_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot serialize {} for the cache: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.cache_set(key, value, ttl).await {
            warn!("Cache write for {} failed: {}", key, e);
        }
    }
}

async fn fetch_source(connector: &dyn SourceConnector, deadline: tokio::time::Instant) -> SourceResult {
    match timeout_at(deadline, connector.fetch()).await {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(e)) => Err(Degradation::Failed(e)),
        Err(_) => Err(Degradation::DeadlineExceeded(Vec::new())),
    }
}

/// Buy calls lean bullish by their confidence, sell calls bearish
fn forum_call_score(call: &ForumCall) -> f64 {
    let confidence = call.confidence.unwrap_or(0.5);
    let action = parse_trading_call(&call.content).action.or_else(|| {
        match call.sentiment.as_deref().map(str::to_lowercase).as_deref() {
            Some("bullish" | "positive") => Some(TradeAction::Buy),
            Some("bearish" | "negative") => Some(TradeAction::Sell),
            _ => None,
        }
    });
    match action {
        Some(TradeAction::Buy) => 0.5 + 0.5 * confidence,
        Some(TradeAction::Sell) => 0.5 - 0.5 * confidence,
        None => 0.5,
    }
}

fn insert_field(payload: &mut Value, name: &str, value: Value) {
    if let Value::Object(map) = payload {
        map.insert(name.to_string(), value);
    }
}
