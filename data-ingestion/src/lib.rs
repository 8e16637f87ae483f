//! Data Ingestion - Layer 0
//!
//! Rate-limited, retrying access to the upstream sources:
//! - social post search
//! - liquidity pool listing
//! - token market-metric lookup
//! - forum trading calls

pub mod client;
pub mod connectors;
pub mod error;

pub use client::{FetchRequest, HttpTransport, RateLimitedClient, RateLimiter, RetryConfig, RetryPolicy, Transport, TransportResponse};
pub use connectors::{
    fetch_token_metrics, pool_token_addresses, ForumConnector, ForumSourceConfig, PoolConnector, PoolSourceConfig,
    SocialConnector, SocialSourceConfig, SourceConnector, TokenMetricsConnector, TokenMetricsBatch,
    TokenMetricsLookup, TokenMetricsSourceConfig,
};
pub use connectors::forum::{call_profitability, mentions_trade_action, parse_trading_call, TradeAction, TradingCall};
pub use error::{FetchError, TransportError};
