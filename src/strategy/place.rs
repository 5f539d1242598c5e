//! Place cascade: locality first, then province and district inferred from it

use super::ResolveError;
use crate::cache::{CachedValue, ResolutionCache};
use crate::geo::{PlaceInfo, RemoteResolver};
use crate::normalize::{fold, normalize};
use crate::tables::{canonical_postal_code, is_unspecified, ReferenceTables};
use crate::types::{PlaceKind, PlaceResolution, PlaceResult, PlaceSource, PostalCheck, ResolutionKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The place fields of one row, as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceQuery {
    pub locality: String,
    pub district: String,
    pub province: String,
    pub postal_code: String,
}

impl PlaceQuery {
    pub fn new(locality: impl Into<String>) -> Self {
        Self {
            locality: locality.into(),
            ..Self::default()
        }
    }

    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = district.into();
        self
    }

    pub fn with_province(mut self, province: impl Into<String>) -> Self {
        self.province = province.into();
        self
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = postal_code.into();
        self
    }

    /// Cache key over all four fields.
    pub fn key(&self) -> ResolutionKey {
        let postal = canonical_postal_code(&self.postal_code);
        ResolutionKey::composite([
            self.locality.as_str(),
            self.district.as_str(),
            self.province.as_str(),
            postal.as_str(),
        ])
    }
}

/// Resolves locality, district and province for a row.
pub struct PlaceResolver {
    tables: Arc<ReferenceTables>,
    cache: Arc<dyn ResolutionCache>,
    remote: Arc<RemoteResolver>,
    cancel: CancellationToken,
}

impl PlaceResolver {
    pub fn new(
        tables: Arc<ReferenceTables>,
        cache: Arc<dyn ResolutionCache>,
        remote: Arc<RemoteResolver>,
    ) -> Self {
        Self {
            tables,
            cache,
            remote,
            cancel: CancellationToken::new(),
        }
    }

    /// Share the token the remote tier was built with, so an interrupted
    /// cascade is reported instead of cached as "not found".
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn resolve(&self, query: &PlaceQuery) -> Result<PlaceResolution, ResolveError> {
        let key = query.key();

        match self.cache.get_places(&key) {
            Ok(Some(cached)) => {
                debug!(%key, "place cache hit");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!(%key, error = %e, "place cache read failed; resolving anyway"),
        }

        let resolution = self.cascade(query).await;
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        debug!(
            %key,
            locality = %resolution.locality.source,
            district = %resolution.district.source,
            province = %resolution.province.source,
            "places resolved"
        );
        if let Err(e) = self
            .cache
            .put(&key, &CachedValue::Places(resolution.clone()))
        {
            warn!(%key, error = %e, "place cache write failed");
        }
        Ok(resolution)
    }

    async fn cascade(&self, query: &PlaceQuery) -> PlaceResolution {
        let postal = canonical_postal_code(&query.postal_code);
        let postal = (!postal.is_empty()).then_some(postal);
        let hint = postal
            .as_deref()
            .and_then(|cp| self.tables.hints.get(cp))
            .map(str::to_string);

        let (record, locality) = self
            .resolve_locality(&query.locality, postal.as_deref(), hint.as_deref())
            .await;
        let province = self.resolve_province(&query.province, record.as_ref()).await;
        let district = self
            .resolve_district(&query.district, postal.as_deref(), record.as_ref())
            .await;

        let postal_check = match (hint.as_deref(), record.as_ref()) {
            (Some(hinted), Some(found)) if fold(hinted) == fold(&found.name) => PostalCheck::Match,
            (Some(_), Some(_)) => PostalCheck::Mismatch,
            _ => PostalCheck::NotApplicable,
        };

        PlaceResolution {
            locality,
            district,
            province,
            postal_check,
        }
    }

    /// Name with postal code, name alone, then the postal-code hint.
    async fn resolve_locality(
        &self,
        name: &str,
        postal: Option<&str>,
        hint: Option<&str>,
    ) -> (Option<PlaceInfo>, PlaceResult) {
        let kind = PlaceKind::Locality;

        if let Some(found) = self.remote.resolve_place(name, kind, postal).await {
            let result = PlaceResult::found(kind, found.name.clone(), PlaceSource::Normalized);
            return (Some(found), result);
        }
        if postal.is_some() {
            if let Some(found) = self.remote.resolve_place(name, kind, None).await {
                let result = PlaceResult::found(kind, found.name.clone(), PlaceSource::Normalized);
                return (Some(found), result);
            }
        }
        if let Some(hinted) = hint {
            if let Some(found) = self.remote.resolve_place(hinted, kind, None).await {
                debug!(original = %name, suggested = %found.name, "locality taken from postal-code hint");
                let result =
                    PlaceResult::found(kind, found.name.clone(), PlaceSource::SuggestedFromHint);
                return (Some(found), result);
            }
        }

        (None, PlaceResult::not_found(kind, &normalize(name)))
    }

    /// A usable province is looked up by name; a sentinel is inferred from
    /// the locality record.
    async fn resolve_province(&self, name: &str, record: Option<&PlaceInfo>) -> PlaceResult {
        let kind = PlaceKind::Province;

        if is_unspecified(name) {
            return match record.and_then(PlaceInfo::province_name) {
                Some(province) => PlaceResult::found(kind, province, PlaceSource::Inferred),
                None => PlaceResult::not_inferred(),
            };
        }

        match self.remote.resolve_place(name, kind, None).await {
            Some(found) => PlaceResult::found(kind, found.name, PlaceSource::Normalized),
            None => PlaceResult::not_found(kind, &normalize(name)),
        }
    }

    /// The locality's own district wins over the declared one.
    async fn resolve_district(
        &self,
        name: &str,
        postal: Option<&str>,
        record: Option<&PlaceInfo>,
    ) -> PlaceResult {
        let kind = PlaceKind::District;

        if let Some(district) = record.and_then(PlaceInfo::district_name) {
            return PlaceResult::found(kind, district, PlaceSource::Inferred);
        }
        if let Some(found) = self.remote.resolve_place(name, kind, postal).await {
            return PlaceResult::found(kind, found.name, PlaceSource::Normalized);
        }
        if postal.is_some() {
            if let Some(found) = self.remote.resolve_place(name, kind, None).await {
                return PlaceResult::found(kind, found.name, PlaceSource::Normalized);
            }
        }

        PlaceResult::not_found(kind, &normalize(name))
    }
}
