//! CSV dataset input and enriched output
//!
//! Input bytes are decoded permissively (UTF-8, else Windows-1252) so exports
//! from legacy systems load without a preprocessing step.

use crate::normalize::decode_lossless;
use crate::types::{EnrichedRow, InputRow};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const NATIONALITY_COLUMNS: &[&str] = &[
    "es_argentino",
    "nacionalidad_normalizada",
    "confianza_nacionalidad",
];

pub const PLACE_COLUMNS: &[&str] = &[
    "localidad_normalizada",
    "localidad_fuente",
    "distrito_normalizado",
    "distrito_fuente",
    "provincia_normalizada",
    "provincia_fuente",
    "coincide_codigo_postal",
];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset has no header row")]
    NoHeader,

    #[error("dataset has no rows")]
    Empty,
}

/// An input table: its header row and its records.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<InputRow>,
}

impl Dataset {
    /// Read at most `limit` records from a CSV file.
    pub fn read(path: impl AsRef<Path>, limit: Option<usize>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let dataset = Self::from_reader(std::fs::File::open(path)?, limit)?;
        info!(path = %path.display(), rows = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    pub fn from_reader(reader: impl Read, limit: Option<usize>) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .byte_headers()?
            .iter()
            .map(|h| decode_lossless(h).trim().to_string())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(DatasetError::NoHeader);
        }

        let mut rows = Vec::new();
        for record in csv_reader.byte_records() {
            if limit.is_some_and(|max| rows.len() >= max) {
                break;
            }
            let record = record?;
            let mut row = InputRow::new(rows.len());
            for (header, value) in headers.iter().zip(record.iter()) {
                if !header.is_empty() {
                    row.fields
                        .entry(header.clone())
                        .or_insert_with(|| decode_lossless(value));
                }
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }
        debug!(columns = headers.len(), rows = rows.len(), "parsed dataset");
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Which enrichment column groups to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputParts {
    pub nationality: bool,
    pub places: bool,
}

impl OutputParts {
    pub fn all() -> Self {
        Self {
            nationality: true,
            places: true,
        }
    }

    fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if self.nationality {
            columns.extend_from_slice(NATIONALITY_COLUMNS);
        }
        if self.places {
            columns.extend_from_slice(PLACE_COLUMNS);
        }
        columns
    }
}

/// Write the original columns followed by the enrichment columns.
///
/// An input column named like an enrichment column is replaced, so a result
/// file can be fed back in.
pub fn write_enriched(
    writer: impl Write,
    headers: &[String],
    rows: &[EnrichedRow],
    parts: OutputParts,
) -> Result<(), DatasetError> {
    let enrichment = parts.columns();
    let replaced: HashSet<&str> = enrichment.iter().copied().collect();
    let kept: Vec<&String> = headers
        .iter()
        .filter(|h| !replaced.contains(h.as_str()))
        .collect();

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(
        kept.iter()
            .map(|h| h.as_str())
            .chain(enrichment.iter().copied()),
    )?;

    for enriched in rows {
        let mut record: Vec<String> = kept
            .iter()
            .map(|h| enriched.row.get(h).to_string())
            .collect();
        if parts.nationality {
            record.extend(nationality_cells(enriched));
        }
        if parts.places {
            record.extend(place_cells(enriched));
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_enriched_file(
    path: impl AsRef<Path>,
    headers: &[String],
    rows: &[EnrichedRow],
    parts: OutputParts,
) -> Result<(), DatasetError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_enriched(file, headers, rows, parts)?;
    info!(path = %path.display(), rows = rows.len(), "results written");
    Ok(())
}

fn nationality_cells(enriched: &EnrichedRow) -> Vec<String> {
    match &enriched.nationality {
        Some(n) => vec![
            n.is_target_country.to_string(),
            n.normalized_name.clone(),
            n.confidence.as_str().to_string(),
        ],
        None => vec![String::new(); NATIONALITY_COLUMNS.len()],
    }
}

fn place_cells(enriched: &EnrichedRow) -> Vec<String> {
    match &enriched.places {
        Some(p) => vec![
            p.locality.label(),
            p.locality.source.as_str().to_string(),
            p.district.label(),
            p.district.source.as_str().to_string(),
            p.province.label(),
            p.province.source.as_str().to_string(),
            p.postal_check.as_str().to_string(),
        ],
        None => vec![String::new(); PLACE_COLUMNS.len()],
    }
}
