use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::LevelFilter;
use news_core::{JobConfig, JobError, WorkItem};
use news_engine::{read_index_csv, read_uri_listing, FetchSettings};
use serde::{Deserialize, Serialize};

use crate::logging::LogDestination;

/// Where the work list comes from. Relative paths are resolved against the
/// directory of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// One archive URI per line.
    UriListing(PathBuf),
    /// Index query result as CSV.
    IndexCsv(PathBuf),
}

impl InputSource {
    fn resolve_against(self, base: &Path) -> Self {
        let join = |path: PathBuf| {
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };
        match self {
            InputSource::UriListing(path) => InputSource::UriListing(join(path)),
            InputSource::IndexCsv(path) => InputSource::IndexCsv(join(path)),
        }
    }

    pub fn load(&self) -> Result<Vec<WorkItem>> {
        let items = match self {
            InputSource::UriListing(path) => read_uri_listing(path)
                .with_context(|| format!("reading URI listing {}", path.display()))?,
            InputSource::IndexCsv(path) => read_index_csv(path)
                .with_context(|| format!("reading index rows {}", path.display()))?,
        };
        Ok(items)
    }
}

/// Object storage access; see [`FetchSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub endpoint: String,
    pub bucket: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub object_timeout_secs: u64,
    pub max_bytes: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            endpoint: defaults.endpoint,
            bucket: defaults.default_bucket,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            object_timeout_secs: defaults.object_timeout.as_secs(),
            max_bytes: defaults.max_bytes,
            max_attempts: defaults.max_attempts,
            retry_backoff_ms: u64::try_from(defaults.retry_backoff.as_millis()).unwrap_or(u64::MAX),
            scratch_dir: defaults.scratch_dir,
        }
    }
}

impl FetchConfig {
    pub fn to_settings(&self) -> FetchSettings {
        FetchSettings {
            endpoint: self.endpoint.clone(),
            default_bucket: self.bucket.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            object_timeout: Duration::from_secs(self.object_timeout_secs),
            max_bytes: self.max_bytes,
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub job: JobConfig,
    pub fetch: FetchConfig,
    pub input: Option<InputSource>,
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
    /// Also log to this file when set.
    pub log_file: Option<PathBuf>,
    /// Log to stderr; only honoured when `log_file` is set.
    pub log_to_terminal: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            job: JobConfig::default(),
            fetch: FetchConfig::default(),
            input: None,
            log_level: "info".to_string(),
            log_file: None,
            log_to_terminal: true,
        }
    }
}

impl AppSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base)
    }

    pub fn parse(text: &str, base: &Path) -> Result<Self> {
        let mut settings: AppSettings =
            ron::from_str(text).map_err(|err| anyhow!("parsing settings: {err}"))?;
        settings.input = settings.input.map(|input| input.resolve_against(base));
        settings.job.validate()?;
        Ok(settings)
    }

    pub fn input(&self) -> Result<&InputSource> {
        self.input.as_ref().ok_or_else(|| {
            JobError::Configuration("no input listing or index CSV configured".into()).into()
        })
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(self.log_level.trim())
            .map_err(|_| anyhow!("unknown log level {:?}", self.log_level))
    }

    pub fn log_destination(&self) -> LogDestination {
        match &self.log_file {
            Some(path) if self.log_to_terminal => LogDestination::Both(path.clone()),
            Some(path) => LogDestination::File(path.clone()),
            None => LogDestination::Terminal,
        }
    }
}
