//! Core value types shared by resolvers, the cache and the orchestrator

use crate::normalize::fold;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Separator between the parts of a composite key. Folding never produces it
/// from user text that matters for lookups, and it is stripped from parts.
const KEY_SEPARATOR: char = '|';

/// A folded lookup/cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionKey(String);

impl ResolutionKey {
    /// Key for a single free-text value.
    pub fn single(text: &str) -> Self {
        Self(fold(text).replace(KEY_SEPARATOR, " "))
    }

    /// Key combining several free-text values, in order.
    pub fn composite<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let joined = parts
            .into_iter()
            .map(|p| fold(p).replace(KEY_SEPARATOR, " "))
            .collect::<Vec<_>>()
            .join(&KEY_SEPARATOR.to_string());
        Self(joined)
    }

    /// Wrap an already-folded key (e.g. one read back from storage).
    pub fn from_folded(folded: impl Into<String>) -> Self {
        Self(folded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse reliability label attached to a nationality result.
///
/// Serialized with the Spanish labels used in output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "alta")]
    High,
    #[serde(rename = "media")]
    Medium,
    #[serde(rename = "baja")]
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "alta",
            Self::Medium => "media",
            Self::Low => "baja",
        }
    }

    /// Parse a Spanish or English label, case- and accent-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match fold(label).as_str() {
            "alta" | "high" => Some(Self::High),
            "media" | "medium" => Some(Self::Medium),
            "baja" | "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving a declared nationality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationalityResult {
    pub is_target_country: bool,
    pub normalized_name: String,
    pub confidence: Confidence,
}

impl NationalityResult {
    pub fn new(
        is_target_country: bool,
        normalized_name: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            is_target_country,
            normalized_name: normalized_name.into(),
            confidence,
        }
    }
}

/// Administrative level of a place name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    Province,
    District,
    Locality,
}

impl PlaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Province => "province",
            Self::District => "district",
            Self::Locality => "locality",
        }
    }
}

impl fmt::Display for PlaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tier produced a place result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceSource {
    Normalized,
    Inferred,
    SuggestedFromHint,
    NotFound,
}

impl PlaceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalized => "normalized",
            Self::Inferred => "inferred",
            Self::SuggestedFromHint => "suggested_from_hint",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for PlaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved (or explicitly unresolved) place name.
///
/// For `NotFound`, `normalized_name` holds the original input text, so the
/// failure stays diagnosable downstream. An empty name on a `NotFound`
/// province means inference from the locality was attempted and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub kind: PlaceKind,
    pub normalized_name: String,
    pub source: PlaceSource,
}

impl PlaceResult {
    pub fn found(kind: PlaceKind, name: impl Into<String>, source: PlaceSource) -> Self {
        Self {
            kind,
            normalized_name: name.into(),
            source,
        }
    }

    pub fn not_found(kind: PlaceKind, original: &str) -> Self {
        Self {
            kind,
            normalized_name: original.to_string(),
            source: PlaceSource::NotFound,
        }
    }

    /// A province that could not be inferred from the locality record.
    pub fn not_inferred() -> Self {
        Self {
            kind: PlaceKind::Province,
            normalized_name: String::new(),
            source: PlaceSource::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        self.source != PlaceSource::NotFound
    }

    /// Value written to output files. Unresolved values are sentinels, never empty.
    pub fn label(&self) -> String {
        if self.is_found() {
            return self.normalized_name.clone();
        }
        match self.kind {
            PlaceKind::Province if self.normalized_name.is_empty() => "No inferida".to_string(),
            PlaceKind::District => format!("No encontrado: {}", self.normalized_name),
            _ => format!("No encontrada: {}", self.normalized_name),
        }
    }
}

/// Result of comparing the resolved locality with the postal-code hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostalCheck {
    Match,
    Mismatch,
    NotApplicable,
}

impl PostalCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "si",
            Self::Mismatch => "no",
            Self::NotApplicable => "n/a",
        }
    }
}

/// The place results for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceResolution {
    pub locality: PlaceResult,
    pub district: PlaceResult,
    pub province: PlaceResult,
    pub postal_check: PostalCheck,
}

/// One input record, identified by its position in the dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow {
    pub index: usize,
    pub fields: HashMap<String, String>,
}

impl InputRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Field value, or "" when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or_default()
    }
}

/// An input row plus whatever the enabled cascades produced for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub row: InputRow,
    pub nationality: Option<NationalityResult>,
    pub places: Option<PlaceResolution>,
}

impl EnrichedRow {
    pub fn index(&self) -> usize {
        self.row.index
    }
}
