//! Per-row enrichment
//!
//! `RowProcessor` is the seam between the batch orchestrator and the
//! resolution cascades; `EnrichmentPipeline` is the production implementation.

use crate::strategy::{NationalityResolver, PlaceQuery, PlaceResolver, ResolveError};
use crate::types::{EnrichedRow, InputRow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input column names read by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub nationality: String,
    pub birthplace: String,
    pub locality: String,
    pub district: String,
    pub province: String,
    pub postal_code: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            nationality: "nacionalidad".to_string(),
            birthplace: "lugar_nacimiento".to_string(),
            locality: "localidad".to_string(),
            district: "distrito".to_string(),
            province: "provincia".to_string(),
            postal_code: "codigo_postal".to_string(),
        }
    }
}

/// Enriches one row. Implementations must be safe to share across workers.
#[async_trait]
pub trait RowProcessor: Send + Sync {
    async fn process(&self, row: &InputRow) -> Result<EnrichedRow, ResolveError>;
}

/// Runs the enabled cascades over a row.
pub struct EnrichmentPipeline {
    nationality: Option<Arc<NationalityResolver>>,
    places: Option<Arc<PlaceResolver>>,
    columns: ColumnMap,
}

impl EnrichmentPipeline {
    /// A pipeline with no cascade enabled; rows pass through untouched.
    pub fn new(columns: ColumnMap) -> Self {
        Self {
            nationality: None,
            places: None,
            columns,
        }
    }

    pub fn with_nationality(mut self, resolver: Arc<NationalityResolver>) -> Self {
        self.nationality = Some(resolver);
        self
    }

    pub fn with_places(mut self, resolver: Arc<PlaceResolver>) -> Self {
        self.places = Some(resolver);
        self
    }

    pub fn resolves_nationality(&self) -> bool {
        self.nationality.is_some()
    }

    pub fn resolves_places(&self) -> bool {
        self.places.is_some()
    }

    fn place_query(&self, row: &InputRow) -> PlaceQuery {
        PlaceQuery::new(row.get(&self.columns.locality))
            .with_district(row.get(&self.columns.district))
            .with_province(row.get(&self.columns.province))
            .with_postal_code(row.get(&self.columns.postal_code))
    }
}

#[async_trait]
impl RowProcessor for EnrichmentPipeline {
    async fn process(&self, row: &InputRow) -> Result<EnrichedRow, ResolveError> {
        let nationality = match &self.nationality {
            Some(resolver) => {
                let birthplace = row.get(&self.columns.birthplace);
                let birthplace = (!birthplace.trim().is_empty()).then_some(birthplace);
                Some(
                    resolver
                        .resolve(row.get(&self.columns.nationality), birthplace)
                        .await?,
                )
            }
            None => None,
        };

        let places = match &self.places {
            Some(resolver) => Some(resolver.resolve(&self.place_query(row)).await?),
            None => None,
        };

        Ok(EnrichedRow {
            row: row.clone(),
            nationality,
            places,
        })
    }
}
