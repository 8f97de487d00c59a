use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate;
use crate::cache::{CacheStats, MemoCache};
use crate::catalog;
use crate::client::{FingridClient, PageRequest, series_url};
use crate::config::ResolvedConfig;
use crate::domain::{
    AggregationMode, DatasetDescriptor, DatasetId, DateWindow, Granularity, Locale,
};
use crate::error::ExplorerError;
use crate::labels::Labeler;
use crate::series::{self, FetchedSeries};
use crate::table::SeriesTable;
use crate::throttle::Throttle;

/// Datasets sampled this often are slow to fetch over long ranges.
const HIGH_FREQUENCY_MINUTES: u32 = 3;
const HIGH_FREQUENCY_WARN_DAYS: i64 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: ProgressLevel,
    pub dataset: Option<String>,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn info(dataset: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Info,
            dataset: dataset.map(str::to_string),
            message: message.into(),
            elapsed: None,
        }
    }

    fn warn(dataset: &str, message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Warn,
            ..Self::info(Some(dataset), message)
        }
    }

    fn error(dataset: &str, message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Error,
            ..Self::info(Some(dataset), message)
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub results: Vec<DatasetDescriptor>,
    pub max_search_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Fetched {
        table: SeriesTable,
        categorical: bool,
        retried: bool,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct DatasetOutcome {
    pub descriptor: DatasetDescriptor,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub window: DateWindow,
    pub items: Vec<DatasetOutcome>,
}

impl FetchReport {
    pub fn succeeded(&self) -> Vec<DatasetId> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, Outcome::Fetched { .. }))
            .map(|item| item.descriptor.id.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<DatasetId> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, Outcome::Failed { .. }))
            .map(|item| item.descriptor.id.clone())
            .collect()
    }

    /// Tables that take part in the combined view.
    pub fn simple_tables(&self) -> Vec<&SeriesTable> {
        self.items
            .iter()
            .filter_map(|item| match &item.outcome {
                Outcome::Fetched {
                    table,
                    categorical: false,
                    ..
                } => Some(table),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub locale: Locale,
    pub retry_delay: Duration,
    pub throttle_interval: Duration,
    pub cache_entries: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from(&ResolvedConfig::default())
    }
}

impl From<&ResolvedConfig> for AppOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            locale: config.locale,
            retry_delay: config.retry_delay,
            throttle_interval: config.throttle_interval,
            cache_entries: config.cache_entries,
        }
    }
}

type SearchKey = (String, String);
type FetchKey = (NaiveDate, NaiveDate, DatasetId, String);
type AggregateKey = (u64, Granularity, AggregationMode);

pub struct App<C: FingridClient> {
    client: C,
    labeler: Labeler,
    options: AppOptions,
    throttle: Throttle,
    searches: Mutex<MemoCache<SearchKey, Vec<DatasetDescriptor>>>,
    fetches: Mutex<MemoCache<FetchKey, FetchedSeries>>,
    aggregates: Mutex<MemoCache<AggregateKey, SeriesTable>>,
}

impl<C: FingridClient> App<C> {
    pub fn new(client: C, labeler: Labeler, options: AppOptions) -> Self {
        Self {
            client,
            labeler,
            throttle: Throttle::new(options.throttle_interval),
            searches: Mutex::new(MemoCache::new(options.cache_entries)),
            fetches: Mutex::new(MemoCache::new(options.cache_entries)),
            aggregates: Mutex::new(MemoCache::new(options.cache_entries)),
            options,
        }
    }

    pub fn from_config(client: C, config: &ResolvedConfig) -> Self {
        Self::new(client, config.labeler(), AppOptions::from(config))
    }

    pub fn locale(&self) -> Locale {
        self.options.locale
    }

    pub fn search(
        &self,
        query: &str,
        api_key: &str,
        sink: &dyn ProgressSink,
    ) -> Result<SearchResult, ExplorerError> {
        let key = (query.to_string(), api_key.to_string());
        let cached = lock(&self.searches).get(&key);
        let results = match cached {
            Some(results) => results,
            None => {
                sink.event(ProgressEvent::info(None, format!("searching catalog for `{query}`")));
                let results = catalog::search(&self.client, query, api_key)?;
                lock(&self.searches).insert(key, results.clone());
                results
            }
        };
        Ok(SearchResult {
            query: query.to_string(),
            max_search_score: catalog::max_search_score(&results),
            results,
        })
    }

    /// Memoized on the window, id and key. The display name is applied after
    /// the lookup so renaming a dataset does not refetch it.
    pub fn fetch_series(
        &self,
        descriptor: &DatasetDescriptor,
        window: DateWindow,
        api_key: &str,
    ) -> Result<(SeriesTable, bool), ExplorerError> {
        let key = (
            window.start(),
            window.end(),
            descriptor.id.clone(),
            api_key.to_string(),
        );
        let cached = lock(&self.fetches).get(&key);
        let fetched = match cached {
            Some(fetched) => fetched,
            None => {
                let request =
                    PageRequest::first(descriptor.id.clone(), window, self.options.locale);
                let fetched = series::fetch(&self.client, &request, api_key)?;
                lock(&self.fetches).insert(key, fetched.clone());
                fetched
            }
        };
        let categorical = fetched.is_categorical();
        let table = fetched.into_table(descriptor.name(Locale::En), &self.labeler)?;
        Ok((table, categorical))
    }

    /// Fetches each selection in order. A failure is retried once after the
    /// configured delay; a second failure skips only that dataset.
    pub fn fetch_selection(
        &self,
        selection: &[DatasetDescriptor],
        window: DateWindow,
        api_key: &str,
        sink: &dyn ProgressSink,
    ) -> FetchReport {
        let mut items = Vec::with_capacity(selection.len());
        for descriptor in selection {
            let name = descriptor.name(Locale::En).to_string();
            self.throttle.wait();

            if descriptor.interval_minutes() == Some(HIGH_FREQUENCY_MINUTES)
                && window.days() > HIGH_FREQUENCY_WARN_DAYS
            {
                sink.event(ProgressEvent::warn(
                    &name,
                    format!(
                        "measurement interval is {} and the fetch may take longer",
                        descriptor.data_period_en
                    ),
                ));
            }

            sink.event(ProgressEvent::info(Some(&name), "fetching"));
            let start = Instant::now();
            let mut retried = false;
            let result = match self.fetch_series(descriptor, window, api_key) {
                Ok(value) => Ok(value),
                Err(err) => {
                    retried = true;
                    tracing::warn!(dataset = %descriptor.id, error = %err, "fetch failed, retrying");
                    sink.event(ProgressEvent::warn(
                        &name,
                        format!(
                            "error fetching data: {err}. Retrying in {} ms",
                            self.options.retry_delay.as_millis()
                        ),
                    ));
                    std::thread::sleep(self.options.retry_delay);
                    self.fetch_series(descriptor, window, api_key)
                }
            };

            let outcome = match result {
                Ok((table, categorical)) => {
                    sink.event(ProgressEvent {
                        elapsed: Some(start.elapsed()),
                        ..ProgressEvent::info(Some(&name), format!("fetched {} rows", table.len()))
                    });
                    Outcome::Fetched {
                        table,
                        categorical,
                        retried,
                    }
                }
                Err(err) => {
                    tracing::warn!(dataset = %descriptor.id, error = %err, "fetch failed after retry, skipping");
                    sink.event(ProgressEvent::error(
                        &name,
                        format!("failed to fetch data after retry: {err}"),
                    ));
                    Outcome::Failed {
                        message: err.to_string(),
                    }
                }
            };
            self.throttle.finished();
            items.push(DatasetOutcome {
                descriptor: descriptor.clone(),
                outcome,
            });
        }
        FetchReport { window, items }
    }

    pub fn aggregate(
        &self,
        table: &SeriesTable,
        granularity: Granularity,
        mode: AggregationMode,
    ) -> Result<SeriesTable, ExplorerError> {
        let key = (table.fingerprint(), granularity, mode);
        if let Some(cached) = lock(&self.aggregates).get(&key) {
            return Ok(cached);
        }
        let result = aggregate::aggregate(table, granularity, mode)?;
        lock(&self.aggregates).insert(key, result.clone());
        Ok(result)
    }

    /// Combined forward-filled view; only built when more than one simple
    /// series was fetched.
    pub fn combined(
        &self,
        report: &FetchReport,
        granularity: Granularity,
    ) -> Result<Option<SeriesTable>, ExplorerError> {
        let tables: Vec<SeriesTable> = report.simple_tables().into_iter().cloned().collect();
        if tables.len() < 2 {
            return Ok(None);
        }
        let joined = SeriesTable::outer_join(&tables)?;
        self.aggregate(&joined, granularity, AggregationMode::Ffill)
            .map(Some)
    }

    pub fn api_call_url(
        &self,
        base_url: &str,
        dataset_id: &DatasetId,
        window: DateWindow,
    ) -> Result<String, ExplorerError> {
        let request = PageRequest::first(dataset_id.clone(), window, self.options.locale);
        Ok(series_url(base_url, &request)?.to_string())
    }

    pub fn cache_stats(&self) -> (CacheStats, CacheStats, CacheStats) {
        (
            lock(&self.searches).stats(),
            lock(&self.fetches).stats(),
            lock(&self.aggregates).stats(),
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    struct Silent;

    impl ProgressSink for Silent {
        fn event(&self, _event: ProgressEvent) {}
    }

    #[derive(Default)]
    struct CountingClient {
        pages: Mutex<usize>,
    }

    impl FingridClient for CountingClient {
        fn search_catalog(&self, _query: &str, _api_key: &str) -> Result<Value, ExplorerError> {
            Ok(json!({"data": []}))
        }

        fn fetch_page(&self, _request: &PageRequest, _api_key: &str) -> Result<Value, ExplorerError> {
            *self.pages.lock().unwrap() += 1;
            Ok(json!({
                "data": [["2025-01-01T00:00:00Z", "2025-01-01T00:15:00Z", 1.0]],
                "pagination": {"lastPage": 1}
            }))
        }
    }

    fn descriptor(name: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            id: "75".parse().unwrap(),
            name_en: name.to_string(),
            name_fi: String::new(),
            data_period_en: "15 min".to_string(),
            data_period_fi: String::new(),
            unit_en: "MW".to_string(),
            unit_fi: String::new(),
            search_score: 1.0,
            description_en: String::new(),
            description_fi: String::new(),
        }
    }

    #[test]
    fn renaming_reuses_cached_fetch() {
        let app = App::new(
            CountingClient::default(),
            Labeler::builtin(),
            AppOptions {
                throttle_interval: Duration::ZERO,
                retry_delay: Duration::ZERO,
                ..AppOptions::default()
            },
        );
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        )
        .unwrap();
        let (first, _) = app.fetch_series(&descriptor("Wind"), window, "key").unwrap();
        let (second, _) = app
            .fetch_series(&descriptor("Wind power"), window, "key")
            .unwrap();
        assert_eq!(first.column_names(), vec!["Wind"]);
        assert_eq!(second.column_names(), vec!["Wind power"]);
        assert_eq!(*app.client.pages.lock().unwrap(), 1);
        let report = app.fetch_selection(&[descriptor("Wind")], window, "key", &Silent);
        assert_eq!(report.succeeded().len(), 1);
    }
}
