use std::fs::File;
use std::future::Future;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use url::Url;

use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Base URL objects are read from, path-style: `{endpoint}/{bucket}/{key}`.
    pub endpoint: String,
    /// Bucket used for bare keys such as an index row's `warc_filename`.
    pub default_bucket: String,
    pub connect_timeout: Duration,
    /// Timeout for one ranged request.
    pub request_timeout: Duration,
    /// Timeout for downloading one whole archive object.
    pub object_timeout: Duration,
    pub max_bytes: u64,
    /// Total attempts per fetch, including the first one.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    /// Directory for scratch files; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            default_bucket: "commoncrawl".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            object_timeout: Duration::from_secs(30 * 60),
            max_bytes: 4 * 1024 * 1024 * 1024,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            scratch_dir: None,
        }
    }
}

/// A downloaded object held in an anonymous temp file.
///
/// The file is removed by the OS as soon as this value (or the `File` taken
/// out of it) is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    file: File,
    len: u64,
}

impl ScratchFile {
    /// Wraps an already written file, rewinding it.
    pub fn from_file(mut file: File) -> std::io::Result<Self> {
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The file, rewound to its first byte.
    pub fn into_file(self) -> File {
        self.file
    }
}

#[async_trait::async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Downloads a whole archive object.
    async fn fetch_object(&self, uri: &str) -> Result<ScratchFile, FetchError>;

    /// Reads `length` bytes starting at `offset` of the object at `path`.
    async fn fetch_range(&self, path: &str, offset: u64, length: u64)
        -> Result<Vec<u8>, FetchError>;
}

/// `Range` header value for `length` bytes at `offset`; both ends are inclusive.
pub fn range_header(offset: u64, length: u64) -> Option<String> {
    if length == 0 {
        return None;
    }
    let last = offset.checked_add(length - 1)?;
    Some(format!("bytes={offset}-{last}"))
}

/// Anonymous object-storage reads over HTTP.
#[derive(Debug, Clone)]
pub struct HttpArchiveFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
}

impl HttpArchiveFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Maps `s3://bucket/key`, `http(s)://...` or a bare key to a request URL.
    pub fn resolve(&self, uri: &str) -> Result<Url, FetchError> {
        let invalid = |message: String| FetchError::new(FailureKind::InvalidUri, message);
        let uri = uri.trim();

        let (bucket, key) = if let Some(rest) = uri
            .strip_prefix("s3://")
            .or_else(|| uri.strip_prefix("s3a://"))
        {
            match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => (bucket, key),
                _ => return Err(invalid(format!("invalid S3 URI: {uri}"))),
            }
        } else if uri.starts_with("http://") || uri.starts_with("https://") {
            return Url::parse(uri).map_err(|err| invalid(format!("{uri}: {err}")));
        } else if uri.contains("://") {
            return Err(invalid(format!("unsupported scheme: {uri}")));
        } else if uri.is_empty() {
            return Err(invalid("empty object path".to_string()));
        } else {
            (self.settings.default_bucket.as_str(), uri.trim_start_matches('/'))
        };

        let endpoint = self.settings.endpoint.trim_end_matches('/');
        Url::parse(&format!("{endpoint}/{bucket}/{key}"))
            .map_err(|err| invalid(format!("{uri}: {err}")))
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_transient() => {
                    engine_warn!(
                        "Attempt {}/{} for {} failed: {}; retrying",
                        attempt,
                        attempts,
                        what,
                        err
                    );
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn scratch_file(&self) -> Result<File, FetchError> {
        let file = match &self.settings.scratch_dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        };
        file.map_err(|err| FetchError::new(FailureKind::Scratch, err.to_string()))
    }

    async fn download_object(&self, url: &Url) -> Result<ScratchFile, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.settings.object_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        self.check_size(response.content_length())?;

        let scratch_err = |err: std::io::Error| FetchError::new(FailureKind::Scratch, err.to_string());
        let mut file = self.scratch_file()?;
        let mut len = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            len += chunk.len() as u64;
            self.check_size(Some(len))?;
            file.write_all(&chunk).map_err(scratch_err)?;
        }
        file.flush().map_err(scratch_err)?;
        file.seek(SeekFrom::Start(0)).map_err(scratch_err)?;

        Ok(ScratchFile { file, len })
    }

    async fn download_range(
        &self,
        url: &Url,
        range: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(RANGE, range)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(body.to_vec());
        }

        // The server ignored the Range header and sent the whole object.
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = usize::try_from(offset.saturating_add(length)).unwrap_or(usize::MAX);
        if body.len() < end {
            return Err(FetchError::new(
                FailureKind::InvalidRange,
                format!("object has {} bytes, range {range} not satisfiable", body.len()),
            ));
        }
        Ok(body[start..end].to_vec())
    }

    fn check_size(&self, len: Option<u64>) -> Result<(), FetchError> {
        match len {
            Some(len) if len > self.settings.max_bytes => Err(FetchError::new(
                FailureKind::TooLarge {
                    max_bytes: self.settings.max_bytes,
                    actual: Some(len),
                },
                "response too large",
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch_object(&self, uri: &str) -> Result<ScratchFile, FetchError> {
        let url = self.resolve(uri)?;
        engine_debug!("Downloading object {} from {}", uri, url);
        self.with_retries(uri, || self.download_object(&url)).await
    }

    async fn fetch_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let range = range_header(offset, length).ok_or_else(|| {
            FetchError::new(
                FailureKind::InvalidRange,
                format!("offset {offset} length {length}"),
            )
        })?;
        self.check_size(Some(length))?;
        let url = self.resolve(path)?;
        engine_debug!("Fetching {} of {}", range, url);
        self.with_retries(path, || self.download_range(&url, &range, offset, length))
            .await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
