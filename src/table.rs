use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use polars::prelude::*;

use crate::error::ExplorerError;

pub const PROVIDER_TZ: Tz = chrono_tz::Europe::Helsinki;

/// Index column of the backing frame: epoch milliseconds.
pub const TIMESTAMP_COLUMN: &str = "timestamp_ms";

pub type Timestamp = DateTime<Tz>;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Time-indexed table over a polars frame: one Int64 millisecond index
/// column, strictly increasing, followed by Float64 value columns.
#[derive(Debug, Clone)]
pub struct SeriesTable {
    frame: DataFrame,
}

impl SeriesTable {
    pub fn new(index: Vec<Timestamp>, columns: Vec<Column>) -> Result<Self, ExplorerError> {
        if let Some(pair) = index.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(ExplorerError::Decode(format!(
                "index is not strictly increasing at {}",
                pair[1].to_rfc3339()
            )));
        }
        if let Some(column) = columns.iter().find(|c| c.values.len() != index.len()) {
            return Err(ExplorerError::Decode(format!(
                "column `{}` has {} values for {} timestamps",
                column.name,
                column.values.len(),
                index.len()
            )));
        }
        let millis: Vec<i64> = index.iter().map(|ts| ts.timestamp_millis()).collect();
        let mut series = Vec::with_capacity(columns.len() + 1);
        series.push(Series::new(TIMESTAMP_COLUMN, millis));
        series.extend(
            columns
                .iter()
                .map(|column| Series::new(&column.name, column.values.clone())),
        );
        Ok(Self {
            frame: DataFrame::new(series)?,
        })
    }

    pub fn single(
        name: impl Into<String>,
        index: Vec<Timestamp>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, ExplorerError> {
        Self::new(index, vec![Column::new(name, values)])
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn index(&self) -> Vec<Timestamp> {
        self.millis()
            .into_iter()
            .filter_map(|ms| PROVIDER_TZ.timestamp_millis_opt(ms).single())
            .collect()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.value_series()
            .map(|series| Column::new(series.name(), float_values(series)))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        self.value_series()
            .find(|series| series.name() == name)
            .map(|series| Column::new(name, float_values(series)))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.value_series().map(|series| series.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// No-op when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), ExplorerError> {
        if from == TIMESTAMP_COLUMN || !self.column_names().contains(&from) {
            return Ok(());
        }
        self.frame.rename(from, to)?;
        Ok(())
    }

    /// Content hash over index, column names and value bits.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.millis().hash(&mut hasher);
        for column in self.columns() {
            column.name.hash(&mut hasher);
            for value in &column.values {
                value.map(f64::to_bits).hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Outer join on timestamp: each table is left-joined onto the sorted
    /// union of all indexes. Columns keep input order, absent cells are `None`.
    pub fn outer_join(tables: &[SeriesTable]) -> Result<SeriesTable, ExplorerError> {
        let union: BTreeSet<i64> = tables.iter().flat_map(SeriesTable::millis).collect();
        let mut joined = DataFrame::new(vec![Series::new(
            TIMESTAMP_COLUMN,
            union.into_iter().collect::<Vec<i64>>(),
        )])?;
        for table in tables {
            joined = joined.left_join(&table.frame, [TIMESTAMP_COLUMN], [TIMESTAMP_COLUMN])?;
        }
        Ok(SeriesTable { frame: joined })
    }

    fn millis(&self) -> Vec<i64> {
        self.frame
            .column(TIMESTAMP_COLUMN)
            .and_then(|series| series.i64().map(|ca| ca.into_iter().flatten().collect()))
            .unwrap_or_default()
    }

    fn value_series(&self) -> impl Iterator<Item = &Series> {
        self.frame
            .get_columns()
            .iter()
            .filter(|series| series.name() != TIMESTAMP_COLUMN)
    }
}

fn float_values(series: &Series) -> Vec<Option<f64>> {
    series
        .f64()
        .map(|ca| ca.into_iter().collect())
        .unwrap_or_else(|_| vec![None; series.len()])
}

impl PartialEq for SeriesTable {
    fn eq(&self, other: &Self) -> bool {
        self.millis() == other.millis() && self.columns() == other.columns()
    }
}

impl Default for SeriesTable {
    fn default() -> Self {
        let frame = DataFrame::new(vec![Series::new(TIMESTAMP_COLUMN, Vec::<i64>::new())])
            .unwrap_or_default();
        Self { frame }
    }
}
