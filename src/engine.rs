//! Engine wiring
//!
//! Builds the resolvers, the pipeline and the orchestrator from one
//! `EngineConfig`, sharing a single cache, one set of reference tables and
//! one cancellation token across all of them.

use crate::ai::{AiError, AiResolver, CompletionClient, OllamaClient};
use crate::batch::BatchOrchestrator;
use crate::cache::{CacheError, OpenCache, ResolutionCache, SqliteCache};
use crate::config::EngineConfig;
use crate::geo::{GeoClient, GeoError, HttpGeoClient, RemoteResolver};
use crate::pipeline::EnrichmentPipeline;
use crate::retry::{Sleeper, TokioSleeper};
use crate::strategy::{NationalityResolver, PlaceResolver};
use crate::tables::{HintTable, ReferenceTables, TableError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Reference table error: {0}")]
    Table(#[from] TableError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Geography client error: {0}")]
    Geo(#[from] GeoError),

    #[error("Completion client error: {0}")]
    Ai(#[from] AiError),
}

/// The collaborators an engine is assembled from.
pub struct EngineParts {
    pub geo: Arc<dyn GeoClient>,
    pub ai: Arc<dyn CompletionClient>,
    pub cache: Arc<dyn ResolutionCache>,
    pub tables: Arc<ReferenceTables>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl EngineParts {
    /// Built-in tables and real sleeps.
    pub fn new(
        geo: Arc<dyn GeoClient>,
        ai: Arc<dyn CompletionClient>,
        cache: Arc<dyn ResolutionCache>,
    ) -> Self {
        Self {
            geo,
            ai,
            cache,
            tables: Arc::new(ReferenceTables::builtin()),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_tables(mut self, tables: ReferenceTables) -> Self {
        self.tables = Arc::new(tables);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }
}

/// Fully wired resolvers for one run.
pub struct Engine {
    config: EngineConfig,
    nationality: Arc<NationalityResolver>,
    places: Arc<PlaceResolver>,
    cancel: CancellationToken,
}

impl Engine {
    /// Connect to the configured services, open the cache and load hints.
    ///
    /// Without a configured cache path the cache is in-memory and lost on exit.
    pub fn connect(config: EngineConfig, cancel: CancellationToken) -> Result<Self, EngineError> {
        let geo = HttpGeoClient::new(
            config.geo.base_url.clone(),
            config.geo.timeout(),
            config.geo.params.clone(),
        )?;
        let ai = OllamaClient::new(
            config.ai.base_url.clone(),
            config.ai.model.clone(),
            config.ai.timeout(),
        )?;

        let cache = match &config.cache.path {
            Some(path) => SqliteCache::open(path)?,
            None => SqliteCache::open_in_memory()?,
        };
        info!(path = ?config.cache.path, entries = cache.len()?, "resolution cache opened");

        let hints = match &config.hints.path {
            Some(path) => HintTable::load_or_empty(path)?,
            None => HintTable::new(),
        };
        let tables = ReferenceTables::builtin().with_hints(hints);

        let parts = EngineParts::new(Arc::new(geo), Arc::new(ai), Arc::new(cache))
            .with_tables(tables);
        Ok(Self::from_parts(config, parts, cancel))
    }

    /// Assemble from explicit collaborators.
    pub fn from_parts(config: EngineConfig, parts: EngineParts, cancel: CancellationToken) -> Self {
        let remote = RemoteResolver::new(parts.geo)
            .with_endpoints(config.geo.endpoints.clone())
            .with_request_delay(config.geo.request_delay())
            .with_sleeper(parts.sleeper.clone())
            .with_cancellation(cancel.clone());
        let ai = AiResolver::new(parts.ai)
            .with_retry(config.ai.retry)
            .with_sleeper(parts.sleeper)
            .with_cancellation(cancel.clone());

        let nationality = NationalityResolver::new(
            parts.tables.clone(),
            parts.cache.clone(),
            Arc::new(ai),
        );
        let places = PlaceResolver::new(parts.tables, parts.cache, Arc::new(remote))
            .with_cancellation(cancel.clone());

        Self {
            config,
            nationality: Arc::new(nationality),
            places: Arc::new(places),
            cancel,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn nationality(&self) -> Arc<NationalityResolver> {
        self.nationality.clone()
    }

    pub fn places(&self) -> Arc<PlaceResolver> {
        self.places.clone()
    }

    /// A pipeline running the selected cascades over the configured columns.
    pub fn pipeline(&self, nationality: bool, places: bool) -> EnrichmentPipeline {
        let mut pipeline = EnrichmentPipeline::new(self.config.columns.clone());
        if nationality {
            pipeline = pipeline.with_nationality(self.nationality());
        }
        if places {
            pipeline = pipeline.with_places(self.places());
        }
        pipeline
    }

    pub fn orchestrator(&self, pipeline: EnrichmentPipeline) -> BatchOrchestrator {
        BatchOrchestrator::new(Arc::new(pipeline)).with_cancellation(self.cancel.clone())
    }
}
