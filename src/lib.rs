//! Padrón: resolution engine for noisy person records
//!
//! Normalizes free-text nationality and place-of-residence fields against a
//! target country and its administrative geography, caching every answer so
//! a value is resolved at most once.
//!
//! # Core Concepts
//!
//! - **Cascades**: each field walks tiers of increasing cost (cache, static
//!   tables, remote geography, generative AI) and stops at the first answer
//! - **Resolution cache**: persistent, keyed by folded input text; a repeated
//!   value never leaves the process
//! - **Batches**: the dataset is processed in fixed-size batches on a bounded
//!   worker pool; one failing row or batch never aborts the run
//!
//! # Example
//!
//! ```
//! use padron::{fold, ResolutionKey};
//!
//! assert_eq!(fold("  ARGÉNTINA "), "argentina");
//! assert_eq!(ResolutionKey::single("Morón").as_str(), "moron");
//! ```

pub mod ai;
pub mod batch;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod geo;
mod normalize;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod strategy;
pub mod tables;
mod types;

pub use batch::{BatchFailure, BatchOrchestrator, RowFailure, RunReport};
pub use cache::{CacheError, OpenCache, ResolutionCache, SqliteCache};
pub use config::{ConfigError, EngineConfig};
pub use dataset::{Dataset, DatasetError, OutputParts};
pub use engine::{Engine, EngineError, EngineParts};
pub use normalize::{decode_lossless, fold, normalize, normalize_bytes};
pub use pipeline::{ColumnMap, EnrichmentPipeline, RowProcessor};
pub use report::IncompletenessReport;
pub use strategy::{NationalityResolver, PlaceQuery, PlaceResolver, ResolveError};
pub use tables::ReferenceTables;
pub use types::{
    Confidence, EnrichedRow, InputRow, NationalityResult, PlaceKind, PlaceResolution, PlaceResult,
    PlaceSource, PostalCheck, ResolutionKey,
};

pub use tokio_util::sync::CancellationToken;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
