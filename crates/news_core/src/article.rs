use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CounterSnapshot;

/// Structured fields extracted from one archived HTML page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub text: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub og_type: Option<String>,
}

/// One emitted unit of a run: a full article, or just its URL in url-only mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobRecord {
    Article(Article),
    Url { url: String },
}

impl JobRecord {
    pub fn url(&self) -> &str {
        match self {
            JobRecord::Article(article) => &article.url,
            JobRecord::Url { url } => url,
        }
    }

    pub fn as_article(&self) -> Option<&Article> {
        match self {
            JobRecord::Article(article) => Some(article),
            JobRecord::Url { .. } => None,
        }
    }
}

/// Merged output of all partitions.
///
/// `records` are concatenated in partition order; callers must not rely on any
/// ordering across partitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobResult {
    pub records: Vec<JobRecord>,
    pub counters: CounterSnapshot,
}

impl JobResult {
    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.records.iter().filter_map(JobRecord::as_article)
    }
}
