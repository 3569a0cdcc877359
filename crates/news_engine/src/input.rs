//! Loading work lists: archive URI listings and index query results as CSV.

use std::fs;
use std::io::Read;
use std::path::Path;

use engine_logging::engine_info;
use news_core::{IndexRow, WorkItem};
use thiserror::Error;

const REQUIRED_COLUMNS: [&str; 4] = [
    "url",
    "warc_filename",
    "warc_record_offset",
    "warc_record_length",
];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("index rows lack required column {0:?}")]
    MissingColumn(&'static str),
}

/// One archive URI per line; blank lines and `#` comments are skipped.
pub fn parse_uri_listing(text: &str) -> Vec<WorkItem> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(WorkItem::object)
        .collect()
}

pub fn read_uri_listing(path: &Path) -> Result<Vec<WorkItem>, InputError> {
    let items = parse_uri_listing(&fs::read_to_string(path)?);
    engine_info!("Loaded {} archive URIs from {:?}", items.len(), path);
    Ok(items)
}

/// Index rows with a header line. `content_charset` is optional; extra
/// columns are ignored.
pub fn parse_index_csv<R: Read>(reader: R) -> Result<Vec<WorkItem>, InputError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            return Err(InputError::MissingColumn(column));
        }
    }

    let mut items = Vec::new();
    for row in csv_reader.deserialize::<IndexRow>() {
        let mut row = row?;
        if row
            .content_charset
            .as_deref()
            .is_some_and(|charset| charset.trim().is_empty())
        {
            row.content_charset = None;
        }
        items.push(WorkItem::Range(row));
    }
    Ok(items)
}

pub fn read_index_csv(path: &Path) -> Result<Vec<WorkItem>, InputError> {
    let items = parse_index_csv(fs::File::open(path)?)?;
    engine_info!("Loaded {} index rows from {:?}", items.len(), path);
    Ok(items)
}
