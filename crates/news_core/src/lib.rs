//! News core: pure data model, classification, filtering and bookkeeping.
mod article;
mod config;
mod counters;
mod error;
mod filter;
mod limiter;
mod record;
mod work;

pub use article::{Article, JobRecord, JobResult};
pub use config::{FilterCriteria, JobConfig, DEFAULT_PARTITION_COUNT};
pub use counters::{Counter, CounterSnapshot, Counters};
pub use error::JobError;
pub use filter::{
    ArticleFilter, DateRangeFilter, FilterChain, HostFilter, KeywordFilter, NewsTypeFilter,
    Rejection, Verdict, NEWS_OG_TYPES,
};
pub use limiter::{per_partition_quota, ResultLimiter};
pub use record::{
    is_conversion_text, is_html, is_metadata_json, is_response, HttpHeaders, RecordHeader,
    CONTENT_LENGTH, CONTENT_TYPE, HTML_TYPES, WARC_DATE, WARC_IDENTIFIED_CONTENT_CHARSET,
    WARC_IDENTIFIED_PAYLOAD_TYPE, WARC_TARGET_URI, WARC_TYPE,
};
pub use work::{split_work, IndexRow, WorkItem};
