//! End-to-end: CSV in, batched enrichment on mocks, CSV out, report.

mod common;

use common::{mock_engine, sample_geo, sample_hints, SAMPLE_CSV};
use padron::ai::MockCompletionClient;
use padron::dataset::write_enriched_file;
use padron::{
    Confidence, Dataset, IncompletenessReport, OpenCache, OutputParts, PlaceSource, PostalCheck,
    SqliteCache,
};
use std::sync::Arc;

const BOLIVIA_REPLY: &str =
    r#"{"es_argentino": false, "nacionalidad_normalizada": "Bolivia", "confianza": "media"}"#;

#[tokio::test]
async fn sample_dataset_is_enriched_and_reported() {
    let geo = Arc::new(sample_geo());
    let ai = Arc::new(MockCompletionClient::replying(BOLIVIA_REPLY).failing_on("klingon"));
    let cache = Arc::new(SqliteCache::open_in_memory().unwrap());
    let engine = mock_engine(geo.clone(), ai.clone(), cache, sample_hints());

    let dataset = Dataset::from_reader(SAMPLE_CSV.as_bytes(), None).unwrap();
    assert_eq!(dataset.len(), 6);
    let headers = dataset.headers.clone();

    let orchestrator = engine.orchestrator(engine.pipeline(true, true));
    let mut report = orchestrator.run(dataset.rows, 2, 2).await;
    report.sort_by_index();

    // Only the row whose AI tier is unreachable is lost.
    assert_eq!(report.total_rows, 6);
    assert_eq!(report.rows.len(), 5);
    assert_eq!(report.row_failures.len(), 1);
    assert_eq!(report.row_failures[0].index, 4);
    assert!(report.batch_failures.is_empty());

    let by_id = |id: &str| {
        report
            .rows
            .iter()
            .find(|r| r.row.get("id") == id)
            .unwrap_or_else(|| panic!("row {} missing", id))
    };

    let first = by_id("1");
    let nationality = first.nationality.as_ref().unwrap();
    assert!(nationality.is_target_country);
    assert_eq!(nationality.confidence, Confidence::High);
    let places = first.places.as_ref().unwrap();
    assert_eq!(places.locality.normalized_name, "Quilmes");
    assert_eq!(places.province.source, PlaceSource::Normalized);
    assert_eq!(places.district.source, PlaceSource::Inferred);
    assert_eq!(places.postal_check, PostalCheck::Match);

    let second = by_id("2");
    let places = second.places.as_ref().unwrap();
    assert_eq!(places.locality.source, PlaceSource::SuggestedFromHint);
    assert_eq!(places.province.normalized_name, "Buenos Aires");
    assert_eq!(places.province.source, PlaceSource::Inferred);

    let third = by_id("3");
    assert_eq!(third.nationality.as_ref().unwrap().normalized_name, "Bolivia");
    assert_eq!(third.places.as_ref().unwrap().province.label(), "No inferida");

    let fourth = by_id("4");
    assert_eq!(
        fourth.nationality.as_ref().unwrap().confidence,
        Confidence::Medium
    );

    // Birthplace reached the prompt for the only row that had one.
    assert!(ai
        .prompts()
        .iter()
        .any(|p| p.contains("Lugar de nacimiento: \"Rosario\"")));

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("resultado.csv");
    write_enriched_file(&out, &headers, &report.rows, OutputParts::all()).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("id,nacionalidad,lugar_nacimiento"));
    assert!(header.ends_with("provincia_fuente,coincide_codigo_postal"));
    assert_eq!(text.lines().count(), 6);

    let summary = IncompletenessReport::from_file(&out).unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.without_locality, 2);
    assert_eq!(summary.without_district, 2);
    assert_eq!(summary.without_province, 2);
    assert_eq!(summary.incomplete, 2);
}

#[tokio::test]
async fn repeated_values_resolve_once_per_run() {
    let geo = Arc::new(sample_geo());
    let ai = Arc::new(MockCompletionClient::replying(BOLIVIA_REPLY));
    let cache = Arc::new(SqliteCache::open_in_memory().unwrap());
    let engine = mock_engine(geo.clone(), ai.clone(), cache, sample_hints());

    let csv = "nacionalidad,localidad\nperuana,Tigre\nperuana,Tigre\nPERUANA,tigre\n";
    let dataset = Dataset::from_reader(csv.as_bytes(), None).unwrap();

    // One worker, so the first row is cached before the others are looked at.
    let orchestrator = engine.orchestrator(engine.pipeline(true, true));
    let report = orchestrator.run(dataset.rows, 10, 1).await;

    assert_eq!(report.rows.len(), 3);
    assert_eq!(ai.call_count(), 1);
    assert_eq!(geo.call_count(), 1);
}

#[tokio::test]
async fn skipped_parts_are_not_resolved() {
    let geo = Arc::new(sample_geo());
    let ai = Arc::new(MockCompletionClient::new());
    let cache = Arc::new(SqliteCache::open_in_memory().unwrap());
    let engine = mock_engine(geo.clone(), ai.clone(), cache, sample_hints());

    let dataset = Dataset::from_reader(SAMPLE_CSV.as_bytes(), None).unwrap();
    let orchestrator = engine.orchestrator(engine.pipeline(false, true));
    let report = orchestrator.run(dataset.rows, 3, 2).await;

    assert_eq!(report.rows.len(), 6);
    assert!(report.rows.iter().all(|r| r.nationality.is_none()));
    assert_eq!(ai.call_count(), 0);
}
