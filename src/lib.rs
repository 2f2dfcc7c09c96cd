// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod ingest;
pub mod oracle;
pub mod rank;
pub mod run;
pub mod trend;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::ingest::state::DedupState;
pub use crate::ingest::types::{Item, SourceAdapter};
pub use crate::ingest::ParallelFetcher;
pub use crate::oracle::rerank::{FineRankConfig, FineRanker};
pub use crate::oracle::{AnthropicOracle, Oracle, OracleClient, OracleError, OracleRequest};
pub use crate::rank::coarse::{CoarseScorer, ScoreOverride};
pub use crate::rank::dedup::Deduplicator;
pub use crate::rank::RankingPipeline;
pub use crate::run::{PipelineRunner, RefineStage, RunReport};
pub use crate::trend::{Trend, TrendDetector, TrendRecord};
