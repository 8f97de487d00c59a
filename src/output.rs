use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FetchReport, Outcome, ProgressEvent, ProgressLevel, ProgressSink, SearchResult};
use crate::domain::{DateWindow, Locale};
use crate::table::SeriesTable;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<RowView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub timestamp: String,
    pub values: Vec<Option<f64>>,
}

impl From<&SeriesTable> for TableView {
    fn from(table: &SeriesTable) -> Self {
        let columns = table.columns();
        let rows = table
            .index()
            .iter()
            .enumerate()
            .map(|(position, ts)| RowView {
                timestamp: ts.to_rfc3339(),
                values: columns.iter().map(|c| c.values[position]).collect(),
            })
            .collect();
        Self {
            columns: columns.into_iter().map(|c| c.name).collect(),
            rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchView {
    pub window: DateWindow,
    pub datasets: Vec<DatasetView>,
    pub combined: Option<TableView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub status: String,
    pub retried: bool,
    pub error: Option<String>,
    pub table: Option<TableView>,
}

impl FetchView {
    pub fn new(report: &FetchReport, tables: &[Option<SeriesTable>], combined: Option<&SeriesTable>) -> Self {
        let datasets = report
            .items
            .iter()
            .zip(tables)
            .map(|(item, table)| {
                let (status, retried, error) = match &item.outcome {
                    Outcome::Fetched { retried, .. } => ("fetched", *retried, None),
                    Outcome::Failed { message } => ("failed", true, Some(message.clone())),
                };
                DatasetView {
                    id: item.descriptor.id.to_string(),
                    name: item.descriptor.name(Locale::En).to_string(),
                    unit: item.descriptor.unit(Locale::En).to_string(),
                    status: status.to_string(),
                    retried,
                    error,
                    table: table.as_ref().map(TableView::from),
                }
            })
            .collect();
        Self {
            window: report.window,
            datasets,
            combined: combined.map(TableView::from),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(view: &FetchView) -> io::Result<()> {
        Self::print_json(view)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable output: progress on stderr, tables on stdout.
pub struct TextOutput {
    pub locale: Locale,
}

impl TextOutput {
    pub fn print_search(&self, result: &SearchResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{:>6}  {:>6}  {:<10}  {:<8}  name", "id", "score", "interval", "unit")?;
        for item in &result.results {
            writeln!(
                stdout,
                "{:>6}  {:>6.0}  {:<10}  {:<8}  {}",
                item.id,
                item.search_score,
                item.data_period(self.locale),
                item.unit(self.locale),
                item.name(self.locale)
            )?;
        }
        Ok(())
    }

    pub fn print_table(&self, title: &str, table: &SeriesTable, limit: usize) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "== {title} ({} rows)", table.len())?;
        write!(stdout, "{:<25}", "timestamp")?;
        let columns = table.columns();
        for column in &columns {
            write!(stdout, "  {}", column.name)?;
        }
        writeln!(stdout)?;
        let shown = table.len().min(limit);
        for (position, ts) in table.index().iter().take(shown).enumerate() {
            write!(stdout, "{:<25}", ts.to_rfc3339())?;
            for column in &columns {
                match column.values[position] {
                    Some(value) => write!(stdout, "  {value:.1}")?,
                    None => write!(stdout, "  -")?,
                }
            }
            writeln!(stdout)?;
        }
        if table.len() > shown {
            writeln!(stdout, "... {} more rows", table.len() - shown)?;
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        let prefix = match event.level {
            ProgressLevel::Info => "info",
            ProgressLevel::Warn => "warn",
            ProgressLevel::Error => "error",
        };
        let dataset = event
            .dataset
            .map(|name| format!("[{name}] "))
            .unwrap_or_default();
        let elapsed = event
            .elapsed
            .map(|elapsed| format!(" ({} ms)", elapsed.as_millis()))
            .unwrap_or_default();
        eprintln!("{prefix}: {dataset}{}{elapsed}", event.message);
    }
}
