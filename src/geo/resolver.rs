//! Endpoint cascade over the geography client

use super::client::{GeoClient, GeoError, PlaceInfo};
use crate::normalize::{has_alphabetic, normalize};
use crate::retry::{Sleeper, TokioSleeper};
use crate::tables::is_unspecified;
use crate::types::PlaceKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ordered endpoint categories tried for each place kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoEndpoints {
    pub province: Vec<String>,
    pub district: Vec<String>,
    pub locality: Vec<String>,
}

impl Default for GeoEndpoints {
    fn default() -> Self {
        Self {
            province: vec!["provincias".to_string()],
            district: vec!["departamentos".to_string(), "municipios".to_string()],
            locality: vec!["localidades".to_string(), "localidades-censales".to_string()],
        }
    }
}

impl GeoEndpoints {
    pub fn for_kind(&self, kind: PlaceKind) -> &[String] {
        match kind {
            PlaceKind::Province => &self.province,
            PlaceKind::District => &self.district,
            PlaceKind::Locality => &self.locality,
        }
    }
}

/// Resolves a place name against the geography service.
///
/// Never fails: transport errors, bad statuses and unreadable bodies move the
/// cascade to the next endpoint, and exhausting the list yields `None`.
pub struct RemoteResolver {
    client: Arc<dyn GeoClient>,
    endpoints: GeoEndpoints,
    request_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl RemoteResolver {
    pub fn new(client: Arc<dyn GeoClient>) -> Self {
        Self {
            client,
            endpoints: GeoEndpoints::default(),
            request_delay: Duration::from_millis(100),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GeoEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Pause after every request, to stay under upstream rate limits.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Look up `name` as a `kind`, trying each endpoint category in order.
    ///
    /// Empty names, "unspecified" sentinels and names without a single letter
    /// return `None` without touching the network.
    pub async fn resolve_place(
        &self,
        name: &str,
        kind: PlaceKind,
        postal_code: Option<&str>,
    ) -> Option<PlaceInfo> {
        let name = normalize(name);
        if name.is_empty() || is_unspecified(&name) || !has_alphabetic(&name) {
            debug!(%kind, name = %name, "skipping remote lookup for unusable name");
            return None;
        }
        let postal_code = postal_code.map(normalize).filter(|cp| !cp.is_empty());

        for endpoint in self.endpoints.for_kind(kind) {
            if self.cancel.is_cancelled() {
                return None;
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(GeoError::Cancelled),
                result = self.client.query(endpoint, &name, postal_code.as_deref()) => result,
            };

            match outcome {
                Err(GeoError::Cancelled) => return None,
                Err(e) => {
                    warn!(%kind, endpoint = %endpoint, name = %name, error = %e, "geography lookup failed; trying next endpoint");
                }
                Ok(records) => {
                    if let Some(first) = records.into_iter().next() {
                        debug!(%kind, endpoint = %endpoint, name = %name, resolved = %first.name, "geography lookup hit");
                        self.pause().await;
                        return Some(first);
                    }
                    debug!(%kind, endpoint = %endpoint, name = %name, "geography lookup empty");
                }
            }

            self.pause().await;
        }

        None
    }

    /// Wait out the request delay, or until the token fires.
    async fn pause(&self) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.sleeper.sleep(self.request_delay) => {}
        }
    }
}
