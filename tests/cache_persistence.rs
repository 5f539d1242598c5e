//! A second run over the same data, with a reopened cache, makes no remote calls.

mod common;

use common::{mock_engine, sample_geo, sample_hints, SAMPLE_CSV};
use padron::ai::MockCompletionClient;
use padron::geo::MockGeoClient;
use padron::tables::HintTable;
use padron::{Dataset, EnrichedRow, OpenCache, ResolutionCache, SqliteCache};
use std::path::Path;
use std::sync::Arc;

const BOLIVIA_REPLY: &str =
    r#"{"es_argentino": false, "nacionalidad_normalizada": "Bolivia", "confianza": "media"}"#;

async fn run(
    cache_path: &Path,
    geo: Arc<MockGeoClient>,
    ai: Arc<MockCompletionClient>,
    hints: HintTable,
) -> Vec<EnrichedRow> {
    let cache = Arc::new(SqliteCache::open(cache_path).unwrap());
    let engine = mock_engine(geo, ai, cache, hints);
    let dataset = Dataset::from_reader(SAMPLE_CSV.as_bytes(), None).unwrap();
    let mut report = engine
        .orchestrator(engine.pipeline(true, true))
        .run(dataset.rows, 2, 3)
        .await;
    report.sort_by_index();
    report.rows
}

#[tokio::test]
async fn reopened_cache_answers_every_resolved_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let first_geo = Arc::new(sample_geo());
    let first_ai = Arc::new(MockCompletionClient::replying(BOLIVIA_REPLY).failing_on("klingon"));
    let first = run(&path, first_geo.clone(), first_ai, sample_hints()).await;
    assert!(first_geo.call_count() > 0);

    // Nothing reachable this time: every answer has to come from disk.
    let second_geo = Arc::new(MockGeoClient::new());
    let second_ai = Arc::new(MockCompletionClient::new());
    let second = run(&path, second_geo.clone(), second_ai.clone(), HintTable::new()).await;

    assert_eq!(first, second);
    assert_eq!(second_geo.call_count(), 0);
    // The failed row was never cached, so only it reaches the AI tier again.
    assert!(second_ai.prompts().iter().all(|p| p.contains("klingon")));
    assert_eq!(second_ai.call_count(), 3);
}

#[tokio::test]
async fn cache_holds_one_entry_per_distinct_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    let ai = Arc::new(MockCompletionClient::replying(BOLIVIA_REPLY).failing_on("klingon"));
    run(&path, Arc::new(sample_geo()), ai, sample_hints()).await;

    let cache = SqliteCache::open(&path).unwrap();
    // Five nationalities (klingon failed) and five place tuples (two rows
    // share "Tigre").
    assert_eq!(cache.len().unwrap(), 10);
}
