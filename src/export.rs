use std::io::Write;

use camino::Utf8Path;

use crate::error::ExplorerError;
use crate::table::SeriesTable;

pub const TIMESTAMP_HEADER: &str = "Timestamp";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

pub fn write_csv<W: Write>(table: &SeriesTable, writer: W) -> Result<(), ExplorerError> {
    let mut csv = csv::Writer::from_writer(writer);
    let columns = table.columns();
    let mut header = Vec::with_capacity(columns.len() + 1);
    header.push(TIMESTAMP_HEADER.to_string());
    header.extend(columns.iter().map(|c| c.name.clone()));
    csv.write_record(&header).map_err(csv_error)?;

    for (position, ts) in table.index().iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        record.push(ts.format(TIMESTAMP_FORMAT).to_string());
        for column in &columns {
            record.push(match column.values[position] {
                Some(value) => value.to_string(),
                None => String::new(),
            });
        }
        csv.write_record(&record).map_err(csv_error)?;
    }
    csv.flush()
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Writes through a temp file in the destination directory, then renames.
pub fn write_csv_file(table: &SeriesTable, path: &Utf8Path) -> Result<(), ExplorerError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8Path::new(".").to_path_buf(),
    };
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("fgx-export")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    write_csv(table, temp.as_file_mut())?;
    temp.persist(path.as_std_path())
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    Ok(())
}

fn csv_error(err: csv::Error) -> ExplorerError {
    ExplorerError::Filesystem(format!("csv: {err}"))
}
