use serde::{Deserialize, Serialize};

/// One row of a columnar index query: where a single capture lives inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub url: String,
    pub warc_filename: String,
    pub warc_record_offset: u64,
    pub warc_record_length: u64,
    #[serde(default)]
    pub content_charset: Option<String>,
}

impl IndexRow {
    /// Inclusive `(first, last)` byte positions of the capture.
    /// `None` for zero-length rows, which address no bytes at all.
    pub fn byte_range(&self) -> Option<(u64, u64)> {
        if self.warc_record_length == 0 {
            return None;
        }
        let last = self
            .warc_record_offset
            .checked_add(self.warc_record_length - 1)?;
        Some((self.warc_record_offset, last))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItem {
    /// A whole archive object, e.g. `s3://commoncrawl/crawl-data/.../x.warc.gz`.
    Object { uri: String },
    /// A byte range inside an archive object.
    Range(IndexRow),
}

impl WorkItem {
    pub fn object(uri: impl Into<String>) -> Self {
        WorkItem::Object { uri: uri.into() }
    }

    /// URL emitted for this item in url-only mode.
    pub fn url(&self) -> &str {
        match self {
            WorkItem::Object { uri } => uri,
            WorkItem::Range(row) => &row.url,
        }
    }
}

impl From<IndexRow> for WorkItem {
    fn from(row: IndexRow) -> Self {
        WorkItem::Range(row)
    }
}

/// Splits `items` into `partition_count` contiguous slices.
///
/// Slice sizes differ by at most one, earlier slices taking the remainder, and
/// item order is preserved. Trailing slices are empty when there are fewer items
/// than partitions.
pub fn split_work<T>(items: Vec<T>, partition_count: usize) -> Vec<Vec<T>> {
    let partition_count = partition_count.max(1);
    let base = items.len() / partition_count;
    let remainder = items.len() % partition_count;

    let mut iter = items.into_iter();
    (0..partition_count)
        .map(|index| {
            let size = base + usize::from(index < remainder);
            iter.by_ref().take(size).collect()
        })
        .collect()
}
