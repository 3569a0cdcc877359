use std::io::Cursor;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use news_core::{
    is_html, is_response, Article, ArticleFilter, Counter, Counters, FilterChain, IndexRow,
    JobRecord, ResultLimiter, Verdict, WorkItem, WARC_IDENTIFIED_CONTENT_CHARSET,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::decode::decode_html;
use crate::extract::ArticleExtractor;
use crate::fetch::ArchiveFetcher;
use crate::sink::RecordSink;
use crate::warc::{ArchiveError, ArchiveReader, RawRecord};

/// State owned by one partition worker for the duration of its slice.
pub(crate) struct PartitionRun<'a> {
    pub counters: Counters,
    pub limiter: ResultLimiter,
    /// Chain built from the criteria of the job being run.
    pub filters: &'a FilterChain,
    pub sink: &'a dyn RecordSink,
    pub cancel: &'a CancellationToken,
}

impl<'a> PartitionRun<'a> {
    pub fn new(
        limiter: ResultLimiter,
        filters: &'a FilterChain,
        sink: &'a dyn RecordSink,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            counters: Counters::new(),
            limiter,
            filters,
            sink,
            cancel,
        }
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.limiter.is_exhausted()
    }

    fn emit(&mut self, record: JobRecord) {
        self.sink.emit(record);
        self.limiter.record_emitted();
    }
}

/// Fetch, decode, classify, extract and filter, composed from injected parts.
///
/// The criteria filters come with each run; filters added here with
/// [`Pipeline::with_filter`] apply to every run after those.
pub struct Pipeline {
    fetcher: Arc<dyn ArchiveFetcher>,
    extractor: Arc<dyn ArticleExtractor>,
    extra_filters: FilterChain,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn ArchiveFetcher>, extractor: Arc<dyn ArticleExtractor>) -> Self {
        Self {
            fetcher,
            extractor,
            extra_filters: FilterChain::new(),
        }
    }

    pub fn with_filter(mut self, filter: impl ArticleFilter + 'static) -> Self {
        self.extra_filters = self.extra_filters.with(filter);
        self
    }

    pub fn extra_filters(&self) -> &FilterChain {
        &self.extra_filters
    }

    /// Emits the URL of each item without fetching anything.
    pub(crate) fn emit_urls(&self, items: &[WorkItem], run: &mut PartitionRun<'_>) {
        for item in items {
            if run.should_stop() {
                break;
            }
            run.emit(JobRecord::Url {
                url: item.url().to_string(),
            });
        }
    }

    /// Processes a slice in order until it is done, cancelled, or the limiter is exhausted.
    pub(crate) fn process_partition(
        &self,
        runtime: &Handle,
        items: &[WorkItem],
        run: &mut PartitionRun<'_>,
    ) {
        for item in items {
            if run.should_stop() {
                break;
            }
            run.counters.increment(Counter::WarcInputProcessed);
            match item {
                WorkItem::Object { uri } => self.process_object(runtime, uri, run),
                WorkItem::Range(row) => self.process_row(runtime, row, run),
            }
        }
    }

    fn process_object(&self, runtime: &Handle, uri: &str, run: &mut PartitionRun<'_>) {
        engine_info!("Reading archive {}", uri);
        let scratch = match runtime.block_on(self.fetcher.fetch_object(uri)) {
            Ok(scratch) => scratch,
            Err(err) => {
                engine_error!("Failed to download {}: {}", uri, err);
                run.counters.increment(Counter::WarcInputFailed);
                return;
            }
        };

        let result = ArchiveReader::new(scratch.into_file())
            .and_then(|mut reader| self.process_records(&mut reader, None, run));
        if let Err(err) = result {
            engine_error!("Invalid WARC: {} - {}", uri, err);
            run.counters.increment(Counter::WarcInputFailed);
        }
    }

    fn process_row(&self, runtime: &Handle, row: &IndexRow, run: &mut PartitionRun<'_>) {
        let path = &row.warc_filename;
        let (offset, length) = (row.warc_record_offset, row.warc_record_length);
        engine_debug!("Fetching WARC record for {}", row.url);

        let bytes = match runtime.block_on(self.fetcher.fetch_range(path, offset, length)) {
            Ok(bytes) => bytes,
            Err(err) => {
                engine_error!(
                    "Failed to download: {} ({}, offset: {}, length: {}) - {}",
                    row.url,
                    path,
                    offset,
                    length,
                    err
                );
                run.counters.increment(Counter::WarcInputFailed);
                return;
            }
        };

        let result = ArchiveReader::new(Cursor::new(bytes))
            .and_then(|mut reader| self.process_records(&mut reader, Some(row), run));
        if let Err(err) = result {
            engine_error!(
                "Invalid WARC record: {} ({}, offset: {}, length: {}) - {}",
                row.url,
                path,
                offset,
                length,
                err
            );
            run.counters.increment(Counter::WarcInputFailed);
        }
    }

    fn process_records(
        &self,
        reader: &mut ArchiveReader,
        row: Option<&IndexRow>,
        run: &mut PartitionRun<'_>,
    ) -> Result<(), ArchiveError> {
        while let Some(mut record) = reader.next_record()? {
            if run.cancel.is_cancelled() {
                engine_warn!("Cancelled while reading archive");
                break;
            }
            if let Some(charset) = row.and_then(|row| row.content_charset.as_deref()) {
                record
                    .header_mut()
                    .set(WARC_IDENTIFIED_CONTENT_CHARSET, charset);
            }

            let outcome = self.process_record(record, row, run.filters, &run.counters);
            run.counters.increment(Counter::RecordsProcessed);

            if let Some(article) = outcome? {
                run.emit(JobRecord::Article(article));
                if run.limiter.is_exhausted() {
                    engine_info!(
                        "Partition limit of {:?} records reached",
                        run.limiter.quota()
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Response → HTML → article → filters; `Ok(None)` skips the record.
    fn process_record(
        &self,
        record: RawRecord<'_>,
        row: Option<&IndexRow>,
        filters: &FilterChain,
        counters: &Counters,
    ) -> Result<Option<Article>, ArchiveError> {
        let header = record.header();
        if !is_response(header) {
            return Ok(None);
        }
        if !is_html(header) {
            counters.increment(Counter::RecordsNonHtml);
            return Ok(None);
        }

        let url = row
            .map(|row| row.url.clone())
            .or_else(|| header.target_uri().map(str::to_string))
            .unwrap_or_default();
        let declared_charset = header.identified_charset().map(str::to_string);
        let content_type = header.payload_content_type().map(str::to_string);

        let payload = match record.read_payload() {
            Ok(payload) => payload,
            Err(ArchiveError::Body(err)) => {
                engine_error!("Cannot decode HTTP body of {}: {}", url, err);
                counters.increment(Counter::RecordsParsingFailed);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let decoded = decode_html(&payload, declared_charset.as_deref(), content_type.as_deref());
        if decoded.had_errors {
            engine_debug!("Lossy {} decode for {}", decoded.encoding_label, url);
        }

        let article = match self.extractor.extract(&url, &decoded.html) {
            Ok(article) => article,
            Err(err) => {
                engine_error!("Error converting HTML to article for {}: {}", url, err);
                counters.increment(Counter::RecordsParsingFailed);
                return Ok(None);
            }
        };

        let verdict = match filters.evaluate(&article) {
            Verdict::Keep => self.extra_filters.evaluate(&article),
            rejected => rejected,
        };
        match verdict {
            Verdict::Keep => Ok(Some(article)),
            Verdict::Reject(rejection) => {
                engine_debug!("Skipping {}: {}", url, rejection);
                Ok(None)
            }
        }
    }
}
