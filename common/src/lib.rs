//! Shared domain model for the signal pipeline
//!
//! Every crate in the workspace speaks these types:
//! - raw and validated source records (social posts, pools, token metrics, forum calls)
//! - sentiment results and normalized market sub-scores
//! - the terminal `Signal` handed to storage

pub mod records;
pub mod scores;
pub mod signal;

pub use records::{
    Engagement, ForumCall, LiquidityPool, RawRecord, SocialPost, SourceKind, TokenMetrics,
    ValidatedRecord,
};
pub use scores::{clip_unit, round2, NormalizedMetrics, SentimentCategory, SentimentLabel, SentimentResult};
pub use signal::{Confidence, Signal, SignalCategory, SignalComponents, SignalMetadata};

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
