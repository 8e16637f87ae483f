// Signal Generation (Layer 2)
// Validates ingested records, scores assets and turns them into categorized trading signals

pub mod aggregator;
pub mod assets;
pub mod config;
pub mod normalizer;
pub mod pipeline;
pub mod storage;
pub mod validators;

pub use aggregator::{
    AggregationConfig, AggregationWeights, AssetInput, BuyBand, CategoryBands, SellBand, SentimentSample,
    SignalAggregator,
};
pub use assets::AssetIndex;
pub use config::{
    create_config_template, load_config, save_config, CycleConfig, PipelineSettings, SecretOverrides, SourcesConfig,
    StorageConfig,
};
pub use normalizer::{MarketMetricsInput, MetricNormalizer, LIQUIDITY_REFERENCE};
pub use pipeline::{CycleReport, PipelineOrchestrator, PipelineSources};
pub use storage::{
    CycleBatch, InMemoryStore, PersistentStore, PostgresStore, RedisCache, SignalStore, StorageError, StoredRecord,
    Table, METRICS_CACHE_KEY, SIGNALS_CACHE_KEY,
};
pub use validators::{Rejection, Validator, CRYPTO_KEYWORDS};
