use std::io::Write;
use std::sync::mpsc::Receiver;

use anyhow::Result;
use chrono::{DateTime, Utc};
use news_core::JobRecord;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OutputLine<'a> {
    Article {
        title: &'a str,
        text: &'a str,
        url: &'a str,
        publish_date: Option<DateTime<Utc>>,
    },
    Url {
        url: &'a str,
    },
}

impl<'a> From<&'a JobRecord> for OutputLine<'a> {
    fn from(record: &'a JobRecord) -> Self {
        match record {
            JobRecord::Article(article) => OutputLine::Article {
                title: &article.title,
                text: &article.text,
                url: &article.url,
                publish_date: article.publish_date,
            },
            JobRecord::Url { url } => OutputLine::Url { url },
        }
    }
}

/// Writes one record as a single JSON line.
pub fn write_record<W: Write>(out: &mut W, record: &JobRecord) -> Result<()> {
    serde_json::to_writer(&mut *out, &OutputLine::from(record))?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Drains `records` into `out` until every sender is gone; returns the line count.
pub fn write_records<W: Write>(records: Receiver<JobRecord>, mut out: W) -> Result<u64> {
    let mut written = 0;
    for record in records {
        write_record(&mut out, &record)?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}
