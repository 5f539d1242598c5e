//! Incompleteness summary over an enriched result file

use crate::dataset::{Dataset, DatasetError};
use crate::normalize::fold;
use crate::types::InputRow;
use std::fmt;
use std::path::Path;

const LOCALITY_COLUMN: &str = "localidad_normalizada";
const DISTRICT_COLUMN: &str = "distrito_normalizado";
const PROVINCE_COLUMN: &str = "provincia_normalizada";

/// Counts of records whose place fields could not be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncompletenessReport {
    pub total: usize,
    pub without_locality: usize,
    pub without_district: usize,
    pub without_province: usize,
    /// Records with at least one of the above.
    pub incomplete: usize,
}

impl IncompletenessReport {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a InputRow>) -> Self {
        let mut report = Self::default();
        for row in rows {
            report.total += 1;
            let locality = fold(row.get(LOCALITY_COLUMN)).contains("no encontrada");
            let district = fold(row.get(DISTRICT_COLUMN)).contains("no encontrado");
            let province = {
                let value = fold(row.get(PROVINCE_COLUMN));
                value.contains("no encontrada") || value.contains("no inferida")
            };
            report.without_locality += usize::from(locality);
            report.without_district += usize::from(district);
            report.without_province += usize::from(province);
            report.incomplete += usize::from(locality || district || province);
        }
        report
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dataset = Dataset::read(path, None)?;
        Ok(Self::from_rows(&dataset.rows))
    }
}

impl fmt::Display for IncompletenessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total de registros: {}", self.total)?;
        writeln!(f, "Sin localidad: {}", self.without_locality)?;
        writeln!(f, "Sin distrito: {}", self.without_district)?;
        writeln!(f, "Sin provincia: {}", self.without_province)?;
        write!(f, "Registros incompletos: {}", self.incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(locality: &str, district: &str, province: &str) -> InputRow {
        InputRow::new(0)
            .with_field(LOCALITY_COLUMN, locality)
            .with_field(DISTRICT_COLUMN, district)
            .with_field(PROVINCE_COLUMN, province)
    }

    #[test]
    fn counts_each_missing_field() {
        let rows = vec![
            row("Quilmes", "Quilmes", "Buenos Aires"),
            row("No encontrada: Qilmes", "Quilmes", "Buenos Aires"),
            row("Bernal", "No encontrado: X", "No inferida"),
            row("Tigre", "Tigre", "No encontrada: Narnia"),
        ];
        let report = IncompletenessReport::from_rows(&rows);
        assert_eq!(
            report,
            IncompletenessReport {
                total: 4,
                without_locality: 1,
                without_district: 1,
                without_province: 2,
                incomplete: 3,
            }
        );
    }

    #[test]
    fn display_lists_every_count() {
        let report = IncompletenessReport {
            total: 10,
            incomplete: 2,
            ..Default::default()
        };
        let text = report.to_string();
        assert!(text.contains("Total de registros: 10"));
        assert!(text.ends_with("Registros incompletos: 2"));
    }
}
