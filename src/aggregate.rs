use chrono::{Datelike, Duration, Months, NaiveDate, TimeZone};
use polars::prelude::*;

use crate::domain::{AggregationMode, Granularity};
use crate::error::ExplorerError;
use crate::table::{Column, PROVIDER_TZ, SeriesTable, Timestamp};

const BUCKET_COLUMN: &str = "bucket_ms";

/// Resamples every column to one row per bucket between the first and last
/// observed bucket, inclusive. Rows are grouped on their bucket label and
/// reduced by polars, then aligned onto the full bucket grid.
pub fn aggregate(
    table: &SeriesTable,
    granularity: Granularity,
    mode: AggregationMode,
) -> Result<SeriesTable, ExplorerError> {
    let names: Vec<String> = table.column_names().into_iter().map(str::to_string).collect();
    let index = table.index();
    if index.is_empty() {
        let columns = names.into_iter().map(|name| Column::new(name, Vec::new())).collect();
        return SeriesTable::new(Vec::new(), columns);
    }

    let labels = index
        .iter()
        .map(|ts| bucket_label(ts, granularity).map(|label| label.timestamp_millis()))
        .collect::<Result<Vec<i64>, _>>()?;
    let grid = bucket_range(&index, granularity)?;

    let mut frame = table.frame().clone();
    frame.with_column(Series::new(BUCKET_COLUMN, labels))?;
    let reducers: Vec<Expr> = names
        .iter()
        .map(|name| match mode {
            AggregationMode::Sum => col(name).sum(),
            AggregationMode::Mean | AggregationMode::Ffill => col(name).mean(),
        })
        .collect();
    let reduced = frame
        .lazy()
        .group_by_stable([col(BUCKET_COLUMN)])
        .agg(reducers)
        .collect()?;

    let grid_frame = DataFrame::new(vec![Series::new(
        BUCKET_COLUMN,
        grid.iter().map(|ts| ts.timestamp_millis()).collect::<Vec<i64>>(),
    )])?;
    let aligned = grid_frame.left_join(&reduced, [BUCKET_COLUMN], [BUCKET_COLUMN])?;

    let columns = names
        .iter()
        .map(|name| -> Result<Column, ExplorerError> {
            let values: Vec<Option<f64>> = aligned.column(name)?.f64()?.into_iter().collect();
            Ok(Column::new(name.as_str(), finish(values, mode)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    SeriesTable::new(grid, columns)
}

/// Outer-joins the tables, then forward-fills them onto one bucket grid.
pub fn combine(
    tables: &[SeriesTable],
    granularity: Granularity,
) -> Result<SeriesTable, ExplorerError> {
    let joined = SeriesTable::outer_join(tables)?;
    aggregate(&joined, granularity, AggregationMode::Ffill)
}

fn finish(values: Vec<Option<f64>>, mode: AggregationMode) -> Vec<Option<f64>> {
    match mode {
        AggregationMode::Mean => values.into_iter().map(|v| v.map(round_one)).collect(),
        AggregationMode::Sum => values
            .into_iter()
            .map(|v| Some(round_one(v.unwrap_or(0.0))))
            .collect(),
        AggregationMode::Ffill => {
            let mut last = None;
            values
                .into_iter()
                .map(|value| {
                    if value.is_some() {
                        last = value;
                    }
                    last
                })
                .collect()
        }
    }
}

/// One decimal, ties to even.
fn round_one(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Label of the bucket holding `ts`. Fixed widths, days and months are
/// closed on the left and labeled by their start. Weeks run from Monday
/// 00:00 (exclusive) to the next Monday 00:00 (inclusive) and are labeled
/// by that closing Monday.
pub fn bucket_label(ts: &Timestamp, granularity: Granularity) -> Result<Timestamp, ExplorerError> {
    if let Some(width) = granularity.fixed_width() {
        // Provider offsets are whole hours, so flooring the instant matches the local grid.
        let width = width.num_seconds();
        let seconds = ts.timestamp();
        let floored = seconds - seconds.rem_euclid(width);
        return PROVIDER_TZ
            .timestamp_opt(floored, 0)
            .single()
            .ok_or_else(|| ExplorerError::Decode(format!("timestamp {floored} out of range")));
    }
    let date = ts.date_naive();
    let label = match granularity {
        Granularity::Day => date,
        Granularity::Week => {
            let offset = i64::from(date.weekday().num_days_from_monday());
            let ahead = match offset {
                0 if *ts == local_midnight(date)? => 0,
                0 => 7,
                _ => 7 - offset,
            };
            date + Duration::days(ahead)
        }
        _ => date.with_day(1).unwrap_or(date),
    };
    local_midnight(label)
}

fn next_bucket(label: &Timestamp, granularity: Granularity) -> Result<Timestamp, ExplorerError> {
    if let Some(width) = granularity.fixed_width() {
        return Ok(*label + width);
    }
    let date = label.date_naive();
    let next = match granularity {
        Granularity::Day => date.succ_opt(),
        Granularity::Week => date.checked_add_signed(Duration::days(7)),
        _ => date.checked_add_months(Months::new(1)),
    }
    .ok_or_else(|| ExplorerError::Decode(format!("no bucket after {date}")))?;
    local_midnight(next)
}

fn local_midnight(date: NaiveDate) -> Result<Timestamp, ExplorerError> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| PROVIDER_TZ.from_local_datetime(&naive).earliest())
        .ok_or_else(|| ExplorerError::Decode(format!("no local midnight on {date}")))
}

fn bucket_range(
    index: &[Timestamp],
    granularity: Granularity,
) -> Result<Vec<Timestamp>, ExplorerError> {
    let (Some(first), Some(last)) = (index.first(), index.last()) else {
        return Ok(Vec::new());
    };
    let last = bucket_label(last, granularity)?;
    let mut current = bucket_label(first, granularity)?;
    let mut buckets = Vec::new();
    while current <= last {
        buckets.push(current);
        current = next_bucket(&current, granularity)?;
    }
    Ok(buckets)
}
