use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone};
use serde_json::{Value, json};

use fingrid_explorer::app::{App, AppOptions, Outcome, ProgressEvent, ProgressLevel, ProgressSink};
use fingrid_explorer::client::{FingridClient, PageRequest};
use fingrid_explorer::domain::{
    AggregationMode, DatasetDescriptor, DatasetId, DateWindow, Granularity,
};
use fingrid_explorer::error::ExplorerError;
use fingrid_explorer::labels::Labeler;
use fingrid_explorer::table::PROVIDER_TZ;

/// Fails dataset 181 every time and dataset 75 on its first call only.
#[derive(Default)]
struct FlakyClient {
    calls: Mutex<HashMap<String, usize>>,
}

impl FingridClient for FlakyClient {
    fn search_catalog(&self, _query: &str, _api_key: &str) -> Result<Value, ExplorerError> {
        Ok(json!({"data": []}))
    }

    fn fetch_page(&self, request: &PageRequest, _api_key: &str) -> Result<Value, ExplorerError> {
        let id = request.dataset_id.as_str().to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        match (id.as_str(), call) {
            ("181", _) => Err(ExplorerError::Status {
                status: 503,
                message: "Service Unavailable".to_string(),
            }),
            ("75", 1) => Err(ExplorerError::Network("connection reset".to_string())),
            ("75", _) => Ok(page(&[
                ("2025-01-01T00:00:00Z", 10.0),
                ("2025-01-01T00:15:00Z", 20.0),
                ("2025-01-01T02:00:00Z", 30.0),
            ])),
            _ => Ok(page(&[("2025-01-01T01:00:00Z", 5.0)])),
        }
    }
}

fn page(rows: &[(&str, f64)]) -> Value {
    let data: Vec<Value> = rows
        .iter()
        .map(|(start, value)| json!([start, start, value]))
        .collect();
    json!({"data": data, "pagination": {"lastPage": 1}})
}

/// Takes `delay` per page and records when each page started and ended.
struct SlowClient {
    delay: Duration,
    spans: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

impl FingridClient for SlowClient {
    fn search_catalog(&self, _query: &str, _api_key: &str) -> Result<Value, ExplorerError> {
        Ok(json!({"data": []}))
    }

    fn fetch_page(&self, _request: &PageRequest, _api_key: &str) -> Result<Value, ExplorerError> {
        let started = Instant::now();
        std::thread::sleep(self.delay);
        self.spans.lock().unwrap().push((started, Instant::now()));
        Ok(page(&[("2025-01-01T00:00:00Z", 1.0)]))
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn descriptor(id: &str, name: &str, period: &str) -> DatasetDescriptor {
    DatasetDescriptor {
        id: id.parse().unwrap(),
        name_en: name.to_string(),
        name_fi: String::new(),
        data_period_en: period.to_string(),
        data_period_fi: String::new(),
        unit_en: "MW".to_string(),
        unit_fi: String::new(),
        search_score: 1.0,
        description_en: String::new(),
        description_fi: String::new(),
    }
}

fn app() -> App<FlakyClient> {
    App::new(
        FlakyClient::default(),
        Labeler::builtin(),
        AppOptions {
            retry_delay: Duration::ZERO,
            throttle_interval: Duration::ZERO,
            ..AppOptions::default()
        },
    )
}

fn window(start: u32, end: u32) -> DateWindow {
    DateWindow::new(
        NaiveDate::from_ymd_opt(2025, 1, start).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, end).unwrap(),
    )
    .unwrap()
}

#[test]
fn failed_dataset_is_skipped_after_one_retry() {
    let app = app();
    let sink = RecordingSink::default();
    let selection = vec![
        descriptor("181", "Wind real time", "3 min"),
        descriptor("75", "Wind", "15 min"),
        descriptor("245", "Solar", "15 min"),
    ];

    let report = app.fetch_selection(&selection, window(1, 1), "key", &sink);

    assert_eq!(report.items.len(), 3);
    assert_matches!(&report.items[0].outcome, Outcome::Failed { message } if message.contains("503"));
    assert_matches!(&report.items[1].outcome, Outcome::Fetched { retried: true, .. });
    assert_matches!(&report.items[2].outcome, Outcome::Fetched { retried: false, .. });
    assert_eq!(report.failed(), vec!["181".parse::<DatasetId>().unwrap()]);
    assert_eq!(report.succeeded().len(), 2);

    let events = sink.events.lock().unwrap();
    assert_eq!(
        events
            .iter()
            .filter(|event| event.level == ProgressLevel::Error)
            .count(),
        1
    );
}

#[test]
fn throttle_spaces_fetches_from_previous_completion() {
    let interval = Duration::from_millis(100);
    let spans = Arc::new(Mutex::new(Vec::new()));
    let app = App::new(
        SlowClient {
            delay: Duration::from_millis(80),
            spans: Arc::clone(&spans),
        },
        Labeler::builtin(),
        AppOptions {
            retry_delay: Duration::ZERO,
            throttle_interval: interval,
            ..AppOptions::default()
        },
    );
    let selection = vec![
        descriptor("75", "Wind", "15 min"),
        descriptor("245", "Solar", "15 min"),
        descriptor("193", "Consumption", "15 min"),
    ];

    let report = app.fetch_selection(&selection, window(1, 1), "key", &RecordingSink::default());

    assert_eq!(report.succeeded().len(), 3);
    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 3);
    for pair in spans.windows(2) {
        let gap = pair[1].0.duration_since(pair[0].1);
        assert!(gap >= interval, "gap of {gap:?} between fetches");
    }
}

#[test]
fn long_high_frequency_window_warns() {
    let app = app();
    let sink = RecordingSink::default();
    let selection = vec![descriptor("245", "Solar", "3 min")];

    app.fetch_selection(&selection, window(1, 31), "key", &sink);

    let events = sink.events.lock().unwrap();
    assert!(events.iter().any(|event| event.level == ProgressLevel::Warn
        && event.message.contains("3 min")));
}

#[test]
fn combined_view_forward_fills_each_series() {
    let app = app();
    let sink = RecordingSink::default();
    let selection = vec![
        descriptor("75", "Wind", "15 min"),
        descriptor("245", "Solar", "15 min"),
    ];
    let report = app.fetch_selection(&selection, window(1, 1), "key", &sink);

    let combined = app.combined(&report, Granularity::Hour).unwrap().unwrap();

    assert_eq!(combined.column_names(), vec!["Wind", "Solar"]);
    assert_eq!(
        combined.index(),
        &[
            PROVIDER_TZ.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap(),
            PROVIDER_TZ.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap(),
            PROVIDER_TZ.with_ymd_and_hms(2025, 1, 1, 4, 0, 0).unwrap(),
        ]
    );
    assert_eq!(
        combined.column("Wind").unwrap().values,
        vec![Some(15.0), Some(15.0), Some(30.0)]
    );
    assert_eq!(
        combined.column("Solar").unwrap().values,
        vec![None, Some(5.0), Some(5.0)]
    );
}

#[test]
fn single_series_has_no_combined_view() {
    let app = app();
    let sink = RecordingSink::default();
    let report = app.fetch_selection(&[descriptor("245", "Solar", "15 min")], window(1, 1), "key", &sink);
    assert!(app.combined(&report, Granularity::Hour).unwrap().is_none());
}

#[test]
fn aggregation_is_memoized() {
    let app = app();
    let (table, _) = app
        .fetch_series(&descriptor("245", "Solar", "15 min"), window(1, 1), "key")
        .unwrap();

    let first = app.aggregate(&table, Granularity::Day, AggregationMode::Sum).unwrap();
    let second = app.aggregate(&table, Granularity::Day, AggregationMode::Sum).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.column("Solar").unwrap().values, vec![Some(5.0)]);
    let (_, _, aggregates) = app.cache_stats();
    assert_eq!(aggregates.hits, 1);
}

#[test]
fn api_call_url_lists_query_parameters() {
    let app = app();
    let url = app
        .api_call_url("https://data.fingrid.fi", &"75".parse().unwrap(), window(1, 2))
        .unwrap();
    assert!(url.starts_with("https://data.fingrid.fi/api/datasets/75/data?"));
    assert!(url.contains("startTime=2025-01-01T00%3A00%3A00Z"));
    assert!(url.contains("endTime=2025-01-02T23%3A59%3A00Z"));
    assert!(url.contains("pageSize=20000"));
}
