use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::JobError;

pub const DEFAULT_PARTITION_COUNT: usize = 64;

/// Article selection settings for one run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Allowed hosts; a host also matches its subdomains. Empty allows any host.
    pub hosts: BTreeSet<String>,
    /// Case-insensitive keywords, any of which must appear. Empty allows any text.
    pub keywords: BTreeSet<String>,
    /// Inclusive lower bound on the publish date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the publish date.
    pub end_date: Option<NaiveDate>,
    /// Discard articles whose publish date could not be determined.
    pub strict_date: bool,
    /// Input is already known to be news; skip the `og:type` heuristic.
    pub news_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub partition_count: usize,
    /// Cap on emitted records, split evenly (rounded up) across partitions.
    pub global_limit: Option<usize>,
    /// Emit only the URLs of the work items, without fetching anything.
    pub url_only: bool,
    pub criteria: FilterCriteria,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            global_limit: None,
            url_only: false,
            criteria: FilterCriteria::default(),
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.partition_count == 0 {
            return Err(JobError::Configuration(
                "partition_count must be greater than zero".into(),
            ));
        }
        if self.global_limit == Some(0) {
            return Err(JobError::Configuration(
                "global_limit must be greater than zero when set".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.criteria.start_date, self.criteria.end_date) {
            if start > end {
                return Err(JobError::Configuration(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        Ok(())
    }
}
