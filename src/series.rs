use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::client::{FingridClient, PageRequest};
use crate::error::ExplorerError;
use crate::labels::Labeler;
use crate::table::{Column, PROVIDER_TZ, SeriesTable, Timestamp};

pub const VALUE_COLUMN: &str = "Value";

/// Embedded datahub keys that carry no category information.
const BOOKKEEPING_KEYS: &[&str] = &["Value", "TimeSeriesType", "Res", "Uom", "ReadTS", "Count"];

/// Concatenated rows of every page, in page order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub rows: Vec<Vec<Value>>,
    pub pages: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalRow {
    pub timestamp: Timestamp,
    pub tags: Vec<Option<String>>,
    pub value: Option<f64>,
}

/// Un-pivoted datahub series: one row per (timestamp, tag combination).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoricalSeries {
    pub tag_names: Vec<String>,
    pub rows: Vec<CategoricalRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchedSeries {
    Simple(SeriesTable),
    Categorical(CategoricalSeries),
}

impl FetchedSeries {
    pub fn is_categorical(&self) -> bool {
        matches!(self, FetchedSeries::Categorical(_))
    }

    pub fn row_count(&self) -> usize {
        match self {
            FetchedSeries::Simple(table) => table.len(),
            FetchedSeries::Categorical(series) => series.rows.len(),
        }
    }

    /// Simple series get `display_name` as their column; categorical series are
    /// pivoted into one labeled column per tag combination.
    pub fn into_table(
        self,
        display_name: &str,
        labeler: &Labeler,
    ) -> Result<SeriesTable, ExplorerError> {
        match self {
            FetchedSeries::Simple(mut table) => {
                table.rename_column(VALUE_COLUMN, display_name)?;
                Ok(table)
            }
            FetchedSeries::Categorical(series) => pivot(&series, labeler),
        }
    }
}

pub fn fetch<C: FingridClient>(
    client: &C,
    request: &PageRequest,
    api_key: &str,
) -> Result<FetchedSeries, ExplorerError> {
    let raw = fetch_raw(client, request, api_key)?;
    tracing::debug!(
        dataset = %request.dataset_id,
        pages = raw.pages,
        rows = raw.rows.len(),
        "series.fetched"
    );
    normalize(&raw)
}

pub fn fetch_raw<C: FingridClient>(
    client: &C,
    request: &PageRequest,
    api_key: &str,
) -> Result<RawSeries, ExplorerError> {
    let first = client.fetch_page(request, api_key)?;
    let mut rows = page_rows(&first)?;
    let last_page = first
        .get("pagination")
        .and_then(|v| v.get("lastPage"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ExplorerError::Decode("response has no pagination.lastPage".to_string()))?;
    let last_page = u32::try_from(last_page)
        .map_err(|_| ExplorerError::Decode(format!("page count {last_page} out of range")))?;

    for page in 2..=last_page {
        tracing::debug!(dataset = %request.dataset_id, page, last_page, "series.page");
        let body = client.fetch_page(&request.page(page), api_key)?;
        rows.extend(page_rows(&body)?);
    }

    Ok(RawSeries {
        rows,
        pages: last_page.max(1),
    })
}

fn page_rows(body: &Value) -> Result<Vec<Vec<Value>>, ExplorerError> {
    let data = body.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
        let message = body
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("response has no `data` array");
        ExplorerError::Decode(message.to_string())
    })?;
    data.iter()
        .map(|row| match row {
            Value::Array(cells) => Ok(cells.clone()),
            Value::Object(map) => Ok(map.values().cloned().collect()),
            other => Err(ExplorerError::Decode(format!("unexpected row: {other}"))),
        })
        .collect()
}

pub fn normalize(raw: &RawSeries) -> Result<FetchedSeries, ExplorerError> {
    let width = raw.rows.iter().map(|row| row.len()).max().unwrap_or(3);
    match width {
        3 => normalize_simple(&raw.rows).map(FetchedSeries::Simple),
        4 => normalize_categorical(&raw.rows),
        other => Err(ExplorerError::Decode(format!(
            "expected 3 or 4 columns per row, got {other}"
        ))),
    }
}

fn normalize_simple(rows: &[Vec<Value>]) -> Result<SeriesTable, ExplorerError> {
    let mut index: Vec<Timestamp> = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let ts = parse_timestamp(cell(row, 0))?;
        if let Some(last) = index.last() {
            if ts == *last {
                continue;
            }
            if ts < *last {
                return Err(out_of_order(ts));
            }
        }
        index.push(ts);
        values.push(parse_value(cell(row, 2))?);
    }
    SeriesTable::single(VALUE_COLUMN, index, values)
}

fn normalize_categorical(rows: &[Vec<Value>]) -> Result<FetchedSeries, ExplorerError> {
    let mut tag_names: Vec<String> = Vec::new();
    let mut parsed: Vec<(Timestamp, Map<String, Value>, Option<f64>)> =
        Vec::with_capacity(rows.len());
    for row in rows {
        let ts = parse_timestamp(cell(row, 0))?;
        if let Some((last, _, _)) = parsed.last() {
            if ts < *last {
                return Err(out_of_order(ts));
            }
        }
        let extra = embedded_document(cell(row, 3))?;
        for key in extra.keys() {
            if !BOOKKEEPING_KEYS.contains(&key.as_str()) && !tag_names.contains(key) {
                tag_names.push(key.clone());
            }
        }
        parsed.push((ts, extra, parse_value(cell(row, 2))?));
    }

    let rows: Vec<CategoricalRow> = parsed
        .into_iter()
        .map(|(timestamp, extra, value)| CategoricalRow {
            timestamp,
            tags: tag_names
                .iter()
                .map(|name| extra.get(name).and_then(tag_text))
                .collect(),
            value,
        })
        .collect();

    if tag_names.is_empty() {
        let index = rows.iter().map(|row| row.timestamp).collect();
        let values = rows.iter().map(|row| row.value).collect();
        return dedup_simple(index, values).map(FetchedSeries::Simple);
    }
    Ok(FetchedSeries::Categorical(CategoricalSeries { tag_names, rows }))
}

fn dedup_simple(
    index: Vec<Timestamp>,
    values: Vec<Option<f64>>,
) -> Result<SeriesTable, ExplorerError> {
    let mut kept_index: Vec<Timestamp> = Vec::with_capacity(index.len());
    let mut kept_values = Vec::with_capacity(values.len());
    for (ts, value) in index.into_iter().zip(values) {
        if kept_index.last() == Some(&ts) {
            continue;
        }
        kept_index.push(ts);
        kept_values.push(value);
    }
    SeriesTable::single(VALUE_COLUMN, kept_index, kept_values)
}

/// Pivot-table semantics: duplicate cells are averaged, combinations ordered by
/// raw codes, rows with a missing tag dropped, all-empty columns dropped.
pub fn pivot(series: &CategoricalSeries, labeler: &Labeler) -> Result<SeriesTable, ExplorerError> {
    let mut cells: BTreeMap<Vec<String>, BTreeMap<Timestamp, (f64, usize)>> = BTreeMap::new();
    let mut timestamps: BTreeSet<Timestamp> = BTreeSet::new();

    for row in &series.rows {
        let Some(combo) = row.tags.iter().cloned().collect::<Option<Vec<String>>>() else {
            continue;
        };
        timestamps.insert(row.timestamp);
        let column = cells.entry(combo).or_default();
        let cell = column.entry(row.timestamp).or_insert((0.0, 0));
        if let Some(value) = row.value {
            cell.0 += value;
            cell.1 += 1;
        }
    }

    let index: Vec<Timestamp> = timestamps.into_iter().collect();
    let mut columns = Vec::with_capacity(cells.len());
    for (combo, by_ts) in cells {
        let values: Vec<Option<f64>> = index
            .iter()
            .map(|ts| match by_ts.get(ts) {
                Some((sum, count)) if *count > 0 => Some(sum / *count as f64),
                _ => None,
            })
            .collect();
        if values.iter().all(Option::is_none) {
            continue;
        }
        columns.push(Column::new(labeler.combination_label(&combo)?, values));
    }
    SeriesTable::new(index, columns)
}

fn cell(row: &[Value], position: usize) -> &Value {
    row.get(position).unwrap_or(&Value::Null)
}

fn parse_timestamp(value: &Value) -> Result<Timestamp, ExplorerError> {
    let text = value
        .as_str()
        .ok_or_else(|| ExplorerError::Decode(format!("timestamp is not a string: {value}")))?;
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&PROVIDER_TZ))
        .map_err(|err| ExplorerError::Decode(format!("invalid timestamp {text}: {err}")))
}

fn parse_value(value: &Value) -> Result<Option<f64>, ExplorerError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ExplorerError::Decode(format!("value is not numeric: {text}"))),
        other => Err(ExplorerError::Decode(format!(
            "value is not numeric: {other}"
        ))),
    }
}

fn embedded_document(value: &Value) -> Result<Map<String, Value>, ExplorerError> {
    let document = match value {
        Value::String(text) => serde_json::from_str::<Value>(text)
            .map_err(|err| ExplorerError::Decode(format!("embedded JSON: {err}")))?,
        other => other.clone(),
    };
    match document {
        Value::Object(map) => Ok(map),
        other => Err(ExplorerError::Decode(format!(
            "embedded document is not an object: {other}"
        ))),
    }
}

fn tag_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn out_of_order(ts: Timestamp) -> ExplorerError {
    ExplorerError::Decode(format!("rows are not sorted by start time at {}", ts.to_rfc3339()))
}
