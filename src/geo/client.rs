//! Geography service client: queries an administrative-units API
//!
//! Defines the client trait and record types for Georef-style endpoints
//! (`/provincias`, `/departamentos`, `/localidades`, ...). Two implementations:
//! - `HttpGeoClient`: issues HTTP GET requests (production)
//! - `MockGeoClient`: returns preconfigured records and logs calls (testing)

use crate::normalize::fold;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// A parent unit embedded in a record (the province of a locality, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: Option<String>,
    pub name: String,
}

impl ParentRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// One record returned by the geography service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub id: String,
    pub name: String,
    pub province: Option<ParentRef>,
    pub department: Option<ParentRef>,
    pub municipality: Option<ParentRef>,
}

impl PlaceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            province: None,
            department: None,
            municipality: None,
        }
    }

    pub fn with_province(mut self, name: impl Into<String>) -> Self {
        self.province = Some(ParentRef::named(name));
        self
    }

    pub fn with_department(mut self, name: impl Into<String>) -> Self {
        self.department = Some(ParentRef::named(name));
        self
    }

    pub fn with_municipality(mut self, name: impl Into<String>) -> Self {
        self.municipality = Some(ParentRef::named(name));
        self
    }

    pub fn province_name(&self) -> Option<&str> {
        self.province.as_ref().map(|p| p.name.as_str())
    }

    /// The district a locality belongs to: its department, else its municipality.
    pub fn district_name(&self) -> Option<&str> {
        self.department
            .as_ref()
            .or(self.municipality.as_ref())
            .map(|p| p.name.as_str())
    }
}

/// Errors from geography client operations.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("request to '{endpoint}' failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("'{endpoint}' returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("'{endpoint}' returned an unreadable body: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("client setup failed: {0}")]
    Setup(String),
    #[error("request cancelled")]
    Cancelled,
}

/// Client trait for the geography service.
///
/// Abstracts over transport so the resolver doesn't depend on how the
/// service is reached.
#[async_trait]
pub trait GeoClient: Send + Sync {
    /// Query one endpoint category by name, optionally narrowed by postal code.
    ///
    /// An empty vector means the service answered but found nothing.
    async fn query(
        &self,
        endpoint: &str,
        name: &str,
        postal_code: Option<&str>,
    ) -> Result<Vec<PlaceInfo>, GeoError>;
}

/// Query parameter names understood by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub name: String,
    pub postal_code: String,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            name: "nombre".to_string(),
            postal_code: "codigo_postal".to_string(),
        }
    }
}

/// HTTP client for a Georef-style service.
pub struct HttpGeoClient {
    http: reqwest::Client,
    base_url: String,
    params: QueryParams,
}

impl HttpGeoClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        params: QueryParams,
    ) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeoError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            params,
        })
    }
}

#[async_trait]
impl GeoClient for HttpGeoClient {
    async fn query(
        &self,
        endpoint: &str,
        name: &str,
        postal_code: Option<&str>,
    ) -> Result<Vec<PlaceInfo>, GeoError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut query: Vec<(&str, &str)> = vec![(self.params.name.as_str(), name), ("max", "1")];
        if let Some(cp) = postal_code {
            query.push((self.params.postal_code.as_str(), cp));
        }

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|source| GeoError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GeoError::Transport {
                    endpoint: endpoint.to_string(),
                    source: e,
                }
            } else {
                GeoError::Decode {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        parse_records(endpoint, &body).ok_or_else(|| GeoError::Decode {
            endpoint: endpoint.to_string(),
            reason: "no record list in response".to_string(),
        })
    }
}

#[derive(Deserialize)]
struct RawParent {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "nombre")]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    #[serde(default, alias = "provincia")]
    province: Option<RawParent>,
    #[serde(default, alias = "departamento")]
    department: Option<RawParent>,
    #[serde(default, alias = "municipio")]
    municipality: Option<RawParent>,
}

fn id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parent(raw: Option<RawParent>) -> Option<ParentRef> {
    let raw = raw?;
    let name = raw.name.filter(|n| !n.trim().is_empty())?;
    Some(ParentRef {
        id: id_string(raw.id),
        name,
    })
}

/// Extract records from a response body.
///
/// The list is expected under the endpoint's plural name (`localidades`,
/// `localidades_censales` for `localidades-censales`); failing that, the first
/// array-valued field is used. Records without a name are dropped. Returns
/// `None` when the body has no list at all.
pub fn parse_records(endpoint: &str, body: &serde_json::Value) -> Option<Vec<PlaceInfo>> {
    let object = body.as_object()?;
    let list = object
        .get(endpoint)
        .or_else(|| object.get(&endpoint.replace('-', "_")))
        .filter(|v| v.is_array())
        .or_else(|| object.values().find(|v| v.is_array()))?
        .as_array()?;

    Some(
        list.iter()
            .filter_map(|item| serde_json::from_value::<RawRecord>(item.clone()).ok())
            .filter_map(|raw| {
                let name = raw.name.filter(|n| !n.trim().is_empty())?;
                Some(PlaceInfo {
                    id: id_string(raw.id).unwrap_or_default(),
                    name,
                    province: parent(raw.province),
                    department: parent(raw.department),
                    municipality: parent(raw.municipality),
                })
            })
            .collect(),
    )
}

/// A call observed by `MockGeoClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoCall {
    pub endpoint: String,
    pub name: String,
    pub postal_code: Option<String>,
}

type MockKey = (String, String, Option<String>);

/// Mock client for testing. Returns preconfigured records.
///
/// Responses are keyed by endpoint, folded name and postal code; a query
/// with no registered response finds nothing.
#[derive(Default)]
pub struct MockGeoClient {
    responses: HashMap<MockKey, Result<Vec<PlaceInfo>, String>>,
    calls: Arc<Mutex<Vec<GeoCall>>>,
}

impl MockGeoClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(endpoint: &str, name: &str, postal_code: Option<&str>) -> MockKey {
        (
            endpoint.to_string(),
            fold(name),
            postal_code.map(|cp| cp.trim().to_uppercase()),
        )
    }

    /// Register a record for a query.
    pub fn with_record(
        mut self,
        endpoint: &str,
        name: &str,
        postal_code: Option<&str>,
        record: PlaceInfo,
    ) -> Self {
        self.responses
            .insert(Self::key(endpoint, name, postal_code), Ok(vec![record]));
        self
    }

    /// Register a failing status for a query.
    pub fn with_failure(mut self, endpoint: &str, name: &str, postal_code: Option<&str>) -> Self {
        self.responses.insert(
            Self::key(endpoint, name, postal_code),
            Err(endpoint.to_string()),
        );
        self
    }

    /// Every query issued so far, in order.
    pub fn calls(&self) -> Vec<GeoCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl GeoClient for MockGeoClient {
    async fn query(
        &self,
        endpoint: &str,
        name: &str,
        postal_code: Option<&str>,
    ) -> Result<Vec<PlaceInfo>, GeoError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(GeoCall {
                endpoint: endpoint.to_string(),
                name: name.to_string(),
                postal_code: postal_code.map(str::to_string),
            });
        }

        match self.responses.get(&Self::key(endpoint, name, postal_code)) {
            Some(Ok(records)) => Ok(records.clone()),
            Some(Err(endpoint)) => Err(GeoError::Status {
                endpoint: endpoint.clone(),
                status: 503,
            }),
            None => Ok(Vec::new()),
        }
    }
}
