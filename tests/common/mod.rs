//! Common test utilities for the integration suites
//!
//! Sample data and helpers for building an engine on mock collaborators.

use padron::ai::MockCompletionClient;
use padron::geo::{MockGeoClient, PlaceInfo};
use padron::retry::RecordingSleeper;
use padron::tables::{HintTable, ReferenceTables};
use padron::{CancellationToken, Engine, EngineConfig, EngineParts, ResolutionCache};
use std::sync::Arc;

/// A small person-record export with the usual mistakes.
pub const SAMPLE_CSV: &str = "\
id,nacionalidad,lugar_nacimiento,localidad,distrito,provincia,codigo_postal
1,ARGENTINA,,Quilmes,,Buenos Aires,1878
2,atgentina,,Sn Isdro,,Sin dato,1642
3,Boliviana,Rosario,Qilmes,Pdo X,No especificado,
4,Moron,,Tigre,,,
5,klingon,,Tigre,,,
6,x,,,,,
";

/// Geography records used by the sample dataset.
pub fn sample_geo() -> MockGeoClient {
    MockGeoClient::new()
        .with_record(
            "localidades",
            "Quilmes",
            Some("1878"),
            PlaceInfo::new("06658010000", "Quilmes")
                .with_province("Buenos Aires")
                .with_department("Quilmes"),
        )
        .with_record(
            "provincias",
            "Buenos Aires",
            None,
            PlaceInfo::new("06", "Buenos Aires"),
        )
        .with_record(
            "localidades",
            "San Isidro",
            None,
            PlaceInfo::new("06756010000", "San Isidro")
                .with_province("Buenos Aires")
                .with_department("San Isidro"),
        )
        .with_record(
            "localidades",
            "Tigre",
            None,
            PlaceInfo::new("06805010000", "Tigre")
                .with_province("Buenos Aires")
                .with_department("Tigre"),
        )
}

pub fn sample_hints() -> HintTable {
    HintTable::from_pairs([("1642", "San Isidro"), ("1878", "Quilmes")])
}

/// An engine over mocks that never sleeps for real.
pub fn mock_engine(
    geo: Arc<MockGeoClient>,
    ai: Arc<MockCompletionClient>,
    cache: Arc<dyn ResolutionCache>,
    hints: HintTable,
) -> Engine {
    let parts = EngineParts::new(geo, ai, cache)
        .with_tables(ReferenceTables::builtin().with_hints(hints))
        .with_sleeper(Arc::new(RecordingSleeper::new()));
    Engine::from_parts(EngineConfig::default(), parts, CancellationToken::new())
}
