use async_trait::async_trait;
use chrono::NaiveDate;
use common::Error;
use etl::{BreweryRecord, PageSource, RecordingSleeper, RetryPolicy};
use lakehouse::models::{Layer, UNKNOWN};
use lakehouse::processor::{PartitionRef, load_aggregates, load_silver};
use lakehouse::storage::list_parquet_files;
use lakehouse::utils::arrow::{string_at, string_column};
use lakehouse::{ExitCode, PipelineConfig, PipelineDriver, PipelineError, PipelineState};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves scripted responses in order; an empty page once the script runs out.
struct ScriptedSource {
    responses: Mutex<VecDeque<common::Result<Vec<BreweryRecord>>>>,
}

impl ScriptedSource {
    fn new(responses: Vec<common::Result<Vec<BreweryRecord>>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }

    fn pages(pages: Vec<Vec<BreweryRecord>>) -> Arc<Self> {
        Self::new(pages.into_iter().map(Ok).collect())
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, _page: u32, _per_page: u32) -> common::Result<Vec<BreweryRecord>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

const TYPES: [&str; 3] = ["micro", "brewpub", "large"];
const PLACES: [(&str, &str); 3] = [
    ("United States", "Oregon"),
    ("Ireland", "Cork"),
    ("South Korea", "Seoul"),
];

fn brewery(n: usize) -> BreweryRecord {
    let (country, state) = PLACES[n % PLACES.len()];
    let mut record = BreweryRecord::with_id(&format!("brewery-{:04}", n));
    record.name = Some(format!("Brewery {}", n));
    record.brewery_type = Some(TYPES[n % TYPES.len()].to_string());
    record.country = Some(country.to_string());
    record.state_province = Some(state.to_string());
    record
}

fn page(range: std::ops::Range<usize>) -> Vec<BreweryRecord> {
    range.map(brewery).collect()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn config(root: &Path, run_date: NaiveDate) -> PipelineConfig {
    PipelineConfig {
        storage_root: root.to_path_buf(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
            honor_retry_after: true,
        },
        per_page: 50,
        max_pages: 20,
        max_reject_ratio: 1.0,
        run_date,
    }
}

fn driver(root: &Path, run_date: NaiveDate, source: Arc<ScriptedSource>) -> PipelineDriver {
    PipelineDriver::new(config(root, run_date), source)
        .with_sleeper(Arc::new(RecordingSleeper::new()))
}

fn gold_partition(root: &Path, run_date: NaiveDate) -> PartitionRef {
    PartitionRef {
        layer: Layer::Gold,
        date_request: run_date,
        path: root
            .join("gold")
            .join(format!("date_request={}", run_date.format("%Y-%m-%d"))),
        rows: 0,
    }
}

fn gold_bytes(root: &Path, run_date: NaiveDate) -> Vec<u8> {
    let files = list_parquet_files(&gold_partition(root, run_date).path).unwrap();
    assert_eq!(files.len(), 1);
    std::fs::read(&files[0]).unwrap()
}

#[tokio::test]
async fn test_three_pages_flow_through_every_layer() {
    let tmp = tempfile::tempdir().unwrap();
    let source = ScriptedSource::pages(vec![page(0..50), page(50..100), page(100..149)]);

    let summary = driver(tmp.path(), date(1), source).run().await.unwrap();

    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.fetched, 149);
    assert_eq!(summary.bronze_rows, 149);
    assert_eq!(summary.curated_rows, 149);
    assert_eq!(summary.rejected_rows, 0);

    let gold = load_aggregates(&gold_partition(tmp.path(), date(1))).unwrap();
    assert_eq!(gold.iter().map(|r| r.count).sum::<i64>(), 149);
    assert_eq!(summary.gold_rows, gold.len());

    let countries: Vec<String> = std::fs::read_dir(&summary.silver_path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(countries.len(), 3);
    assert!(countries.iter().all(|c| c.starts_with("country=")));
}

#[tokio::test]
async fn test_fetch_failure_leaves_storage_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    driver(tmp.path(), date(1), ScriptedSource::pages(vec![page(0..10)]))
        .run()
        .await
        .unwrap();
    let before = gold_bytes(tmp.path(), date(1));

    let source = ScriptedSource::new(vec![
        Ok(page(0..50)),
        Err(Error::ServerError(503)),
        Err(Error::ServerError(503)),
        Err(Error::ServerError(503)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut failing =
        PipelineDriver::new(config(tmp.path(), date(2)), source).with_sleeper(sleeper.clone());
    let err = failing.run().await.unwrap_err();
    assert_eq!(failing.state(), PipelineState::Failed);

    match &err {
        PipelineError::Fetch(fetch) => {
            assert_eq!(fetch.page, 2);
            assert_eq!(fetch.attempts, 3);
        }
        other => panic!("expected a fetch failure, got {other}"),
    }
    assert_eq!(err.exit_code(), ExitCode::FetchFailed);
    assert_eq!(err.exit_code().as_i32(), 2);
    assert_eq!(
        sleeper.pauses(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );

    for layer in ["bronze", "silver", "gold"] {
        assert!(!tmp.path().join(layer).join("date_request=2024-03-02").exists());
    }
    assert_eq!(gold_bytes(tmp.path(), date(1)), before);
}

#[tokio::test]
async fn test_missing_country_lands_in_unknown_group() {
    let tmp = tempfile::tempdir().unwrap();
    let mut records = page(0..99);
    let mut orphan = BreweryRecord::with_id("no-country");
    orphan.brewery_type = Some("micro".to_string());
    records.push(orphan);

    let summary = driver(tmp.path(), date(3), ScriptedSource::pages(vec![records]))
        .run()
        .await
        .unwrap();
    assert_eq!(summary.curated_rows, 100);

    let gold = load_aggregates(&gold_partition(tmp.path(), date(3))).unwrap();
    let unknown: Vec<_> = gold.iter().filter(|r| r.country == UNKNOWN).collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].state, UNKNOWN);
    assert_eq!(unknown[0].brewery_type.as_deref(), Some("micro"));
    assert_eq!(unknown[0].count, 1);
    assert!(summary.silver_path.join("country=unknown").is_dir());
}

#[tokio::test]
async fn test_rerun_with_same_data_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let pages = || vec![page(0..50), page(50..75)];

    driver(tmp.path(), date(4), ScriptedSource::pages(pages()))
        .run()
        .await
        .unwrap();
    let first = gold_bytes(tmp.path(), date(4));

    driver(tmp.path(), date(4), ScriptedSource::pages(pages()))
        .run()
        .await
        .unwrap();
    assert_eq!(gold_bytes(tmp.path(), date(4)), first);

    // no staging or replaced directories survive a rerun
    for layer in ["bronze", "silver", "gold"] {
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join(layer))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1, "{layer}: {entries:?}");
    }
}

#[tokio::test]
async fn test_gold_matches_counts_recomputed_from_silver() {
    let tmp = tempfile::tempdir().unwrap();
    let summary = driver(
        tmp.path(),
        date(5),
        ScriptedSource::pages(vec![page(0..50), page(50..90)]),
    )
    .run()
    .await
    .unwrap();

    let silver = PartitionRef {
        layer: Layer::Silver,
        date_request: date(5),
        path: summary.silver_path.clone(),
        rows: summary.curated_rows,
    };
    let mut expected: BTreeMap<(Option<String>, String, String), i64> = BTreeMap::new();
    for batch in load_silver(&silver).unwrap() {
        let types = string_column(&batch, "brewery_type").unwrap();
        let countries = string_column(&batch, "country").unwrap();
        let states = string_column(&batch, "state").unwrap();
        for row in 0..batch.num_rows() {
            let key = (
                string_at(types.as_ref(), row),
                string_at(countries.as_ref(), row).unwrap(),
                string_at(states.as_ref(), row).unwrap(),
            );
            *expected.entry(key).or_default() += 1;
        }
    }

    let actual: BTreeMap<(Option<String>, String, String), i64> =
        load_aggregates(&gold_partition(tmp.path(), date(5)))
            .unwrap()
            .into_iter()
            .map(|r| ((r.brewery_type, r.country, r.state), r.count))
            .collect();
    assert_eq!(actual, expected);
    assert!(actual.values().all(|count| *count > 0));
}

#[tokio::test]
async fn test_blank_id_is_rejected_before_gold() {
    let tmp = tempfile::tempdir().unwrap();
    let mut records = page(0..10);
    records.push(BreweryRecord::with_id("   "));
    records.push(brewery(3));

    let summary = driver(tmp.path(), date(6), ScriptedSource::pages(vec![records]))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.bronze_rows, 12);
    assert_eq!(summary.curated_rows, 10);
    assert_eq!(summary.rejected_rows, 2);

    let gold = load_aggregates(&gold_partition(tmp.path(), date(6))).unwrap();
    assert_eq!(gold.iter().map(|r| r.count).sum::<i64>(), 10);
}

#[tokio::test]
async fn test_rerun_replaces_previous_partitions() {
    let tmp = tempfile::tempdir().unwrap();
    driver(tmp.path(), date(7), ScriptedSource::pages(vec![page(0..30)]))
        .run()
        .await
        .unwrap();

    let mut scottish = BreweryRecord::with_id("only-one");
    scottish.brewery_type = Some("nano".to_string());
    scottish.country = Some("Scotland".to_string());
    scottish.state = Some("Fife".to_string());
    let summary = driver(tmp.path(), date(7), ScriptedSource::pages(vec![vec![scottish]]))
        .run()
        .await
        .unwrap();

    let countries: Vec<_> = std::fs::read_dir(&summary.silver_path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(countries, vec!["country=Scotland".to_string()]);

    let gold = load_aggregates(&gold_partition(tmp.path(), date(7))).unwrap();
    assert_eq!(gold.len(), 1);
    assert_eq!(gold[0].count, 1);
    assert_eq!(gold[0].state, "Fife");
}
