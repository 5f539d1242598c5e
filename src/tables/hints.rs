//! Postal code → locality hints loaded from a reference CSV

use crate::normalize::{decode_lossless, normalize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

const POSTAL_CODE_COLUMNS: &[&str] = &["codigo_postal", "postal_code", "cp"];
const NAME_COLUMNS: &[&str] = &["nombre", "name", "localidad"];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("hint file is missing a '{0}' column")]
    MissingColumn(&'static str),
}

/// Read-only postal code → locality name table.
#[derive(Debug, Clone, Default)]
pub struct HintTable {
    by_postal_code: HashMap<String, String>,
}

impl HintTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut table = Self::new();
        for (code, name) in pairs {
            table.insert(code.as_ref(), name.as_ref());
        }
        table
    }

    /// Load from a CSV file. A missing file yields an empty table.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        match std::fs::File::open(path) {
            Ok(file) => Self::from_reader(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "hint file not found; continuing without postal-code hints");
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse CSV content with a header row naming the postal-code and name columns.
    ///
    /// First entry wins when a postal code repeats; rows with an empty code or
    /// name are skipped.
    pub fn from_reader(reader: impl Read) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .byte_headers()?
            .iter()
            .map(|h| decode_lossless(h).trim().to_lowercase())
            .collect();

        let code_idx = find_column(&headers, POSTAL_CODE_COLUMNS)
            .ok_or(TableError::MissingColumn("codigo_postal"))?;
        let name_idx =
            find_column(&headers, NAME_COLUMNS).ok_or(TableError::MissingColumn("nombre"))?;

        let mut table = Self::new();
        let mut skipped = 0usize;
        for record in csv_reader.byte_records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "skipping unreadable hint row");
                    continue;
                }
            };
            let code = record.get(code_idx).map(decode_lossless).unwrap_or_default();
            let name = record.get(name_idx).map(decode_lossless).unwrap_or_default();
            if !table.insert(&code, &name) {
                skipped += 1;
            }
        }

        debug!(entries = table.len(), skipped, "loaded postal-code hints");
        Ok(table)
    }

    fn insert(&mut self, code: &str, name: &str) -> bool {
        let code = canonical_postal_code(code);
        let name = normalize(name);
        if code.is_empty() || name.is_empty() {
            return false;
        }
        self.by_postal_code.entry(code).or_insert(name);
        true
    }

    pub fn get(&self, postal_code: &str) -> Option<&str> {
        self.by_postal_code
            .get(&canonical_postal_code(postal_code))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_postal_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_postal_code.is_empty()
    }
}

/// Trim and upper-case, so "b1714" and " B1714 " share an entry.
pub(crate) fn canonical_postal_code(code: &str) -> String {
    normalize(code).to_uppercase()
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.contains(&h.as_str()))
}
