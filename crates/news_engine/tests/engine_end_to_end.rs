mod common;

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Once};

use chrono::NaiveDate;
use common::{
    chunked, encoded_response_record, gzip, gzip_members, news_page, response_record, warc_record,
};
use news_core::{
    Article, ArticleFilter, FilterCriteria, IndexRow, JobConfig, JobError, JobRecord, Rejection,
    Verdict, WorkItem,
};
use news_engine::{
    ArchiveFetcher, CancellationToken, ChannelRecordSink, Engine, FailureKind, FetchError,
    MetaTagExtractor, Pipeline, ScratchFile,
};
use pretty_assertions::assert_eq;

/// Serves archives from memory, as whole objects or byte ranges.
#[derive(Default)]
struct MemoryFetcher {
    objects: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    fn with(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.objects.insert(key.to_string(), bytes);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, key: &str) -> Result<&Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.objects.get(key).ok_or_else(|| FetchError {
            kind: FailureKind::HttpStatus(404),
            message: format!("no object {key}"),
        })
    }
}

#[async_trait::async_trait]
impl ArchiveFetcher for MemoryFetcher {
    async fn fetch_object(&self, uri: &str) -> Result<ScratchFile, FetchError> {
        let bytes = self.lookup(uri)?;
        let scratch = |err: std::io::Error| FetchError {
            kind: FailureKind::Scratch,
            message: err.to_string(),
        };
        let mut file = tempfile::tempfile().map_err(scratch)?;
        file.write_all(bytes).map_err(scratch)?;
        ScratchFile::from_file(file).map_err(scratch)
    }

    async fn fetch_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let bytes = self.lookup(path)?;
        let start = offset as usize;
        let end = start + length as usize;
        bytes.get(start..end).map(<[u8]>::to_vec).ok_or(FetchError {
            kind: FailureKind::InvalidRange,
            message: format!("{start}..{end} outside object"),
        })
    }
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn engine(fetcher: &Arc<MemoryFetcher>) -> Engine {
    init_logging();
    let fetcher: Arc<dyn ArchiveFetcher> = fetcher.clone();
    Engine::from_parts(fetcher, Arc::new(MetaTagExtractor)).expect("engine")
}

fn march_2021(keywords: &[&str]) -> JobConfig {
    JobConfig {
        partition_count: 4,
        criteria: FilterCriteria {
            keywords: keywords.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>(),
            start_date: NaiveDate::from_ymd_opt(2021, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2021, 3, 31),
            ..FilterCriteria::default()
        },
        ..JobConfig::default()
    }
}

fn story(url: &str, title: &str, date: &str, body: &str) -> Vec<u8> {
    response_record(url, "text/html; charset=utf-8", &news_page(title, date, body))
}

#[test]
fn corrupt_archive_keeps_records_read_before_the_damage() {
    let mut archive = story(
        "https://news.example.com/budget",
        "Budget passes",
        "2021-03-04T10:00:00Z",
        "The budget vote passed.",
    );
    archive.extend(response_record(
        "https://news.example.com/chart.png",
        "image/png",
        "\u{1}PNG",
    ));
    archive.extend_from_slice(b"\x00\x01 corrupted bytes \xff\r\n");

    let fetcher = Arc::new(MemoryFetcher::default().with("s3://cc/a.warc", archive));
    let config = march_2021(&["budget"]);
    let result = engine(&fetcher)
        .run(vec![WorkItem::object("s3://cc/a.warc")], &config)
        .expect("run");

    let titles: Vec<&str> = result.articles().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Budget passes"]);
    assert_eq!(result.counters.records_non_html, 1);
    assert_eq!(result.counters.warc_input_failed, 1);
    assert_eq!(result.counters.warc_input_processed, 1);
    assert_eq!(result.counters.records_processed, 2);
}

#[test]
fn failed_items_do_not_stop_the_partition() {
    let good = gzip_members(&[story(
        "https://news.example.com/ok",
        "Still here",
        "2021-03-10",
        "Budget talks continue.",
    )]);
    let fetcher = Arc::new(MemoryFetcher::default().with("good.warc.gz", good));
    let config = JobConfig {
        partition_count: 1,
        ..march_2021(&[])
    };
    let work = vec![
        WorkItem::object("missing.warc.gz"),
        WorkItem::object("good.warc.gz"),
    ];
    let result = engine(&fetcher).run(work, &config).expect("run");

    assert_eq!(result.articles().count(), 1);
    assert_eq!(result.counters.warc_input_processed, 2);
    assert_eq!(result.counters.warc_input_failed, 1);
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn filters_drop_pages_without_counting_failures() {
    let records = vec![
        // outside the date range
        story("https://a.example/1", "Old", "2021-02-28T23:59:59Z", "budget"),
        // no keyword
        story("https://a.example/2", "Other", "2021-03-02", "weather report"),
        // not a news page
        response_record(
            "https://a.example/3",
            "text/html",
            "<html><head><meta property=\"og:type\" content=\"website\">\
             <meta name=\"date\" content=\"2021-03-02\"></head>\
             <body><p>budget shop</p></body></html>",
        ),
        // nothing to extract
        response_record("https://a.example/4", "text/html", "<html><body> </body></html>"),
        story("https://a.example/5", "Kept", "2021-03-31T18:00:00Z", "New BUDGET rules"),
        warc_record(
            "request",
            &[("Content-Type", "application/http; msgtype=request")],
            b"GET / HTTP/1.1\r\n\r\n",
        ),
    ];
    let fetcher = Arc::new(MemoryFetcher::default().with("mix.warc.gz", gzip_members(&records)));
    let config = march_2021(&["budget"]);
    let result = engine(&fetcher)
        .run(vec![WorkItem::object("mix.warc.gz")], &config)
        .expect("run");

    let urls: Vec<&str> = result.records.iter().map(JobRecord::url).collect();
    assert_eq!(urls, vec!["https://a.example/5"]);
    assert_eq!(result.counters.records_processed, 6);
    assert_eq!(result.counters.records_parsing_failed, 1);
    assert_eq!(result.counters.records_non_html, 0);
    assert_eq!(result.counters.warc_input_failed, 0);
}

#[test]
fn index_rows_fetch_single_records_and_honour_charset() {
    let first = gzip_members(&[story(
        "https://news.example.com/x",
        "Budget day",
        "2021-03-03",
        "budget",
    )]);
    let latin1_body: Vec<u8> = [
        &b"<html><head><meta property=\"og:type\" content=\"news\"></head><body><h1>Caf"[..],
        &[0xE9u8][..],
        &b" budget</h1></body></html>"[..],
    ]
    .concat();
    let mut block = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n".to_vec();
    block.extend_from_slice(&latin1_body);
    let second = gzip_members(&[warc_record(
        "response",
        &[
            ("WARC-Target-URI", "https://news.example.com/y"),
            ("Content-Type", "application/http; msgtype=response"),
        ],
        &block,
    )]);

    let mut object = b"leading bytes of another record".to_vec();
    let first_offset = object.len() as u64;
    object.extend_from_slice(&first);
    let second_offset = object.len() as u64;
    object.extend_from_slice(&second);

    let fetcher = Arc::new(MemoryFetcher::default().with("crawl-data/seg/x.warc.gz", object));
    let rows = vec![
        IndexRow {
            url: "https://news.example.com/x".into(),
            warc_filename: "crawl-data/seg/x.warc.gz".into(),
            warc_record_offset: first_offset,
            warc_record_length: first.len() as u64,
            content_charset: None,
        },
        IndexRow {
            url: "https://news.example.com/y".into(),
            warc_filename: "crawl-data/seg/x.warc.gz".into(),
            warc_record_offset: second_offset,
            warc_record_length: second.len() as u64,
            content_charset: Some("ISO-8859-1".into()),
        },
        IndexRow {
            url: "https://news.example.com/z".into(),
            warc_filename: "crawl-data/seg/x.warc.gz".into(),
            warc_record_offset: 1 << 40,
            warc_record_length: 10,
            content_charset: None,
        },
    ];
    let config = JobConfig {
        partition_count: 2,
        criteria: FilterCriteria {
            keywords: ["budget".to_string()].into_iter().collect(),
            ..FilterCriteria::default()
        },
        ..JobConfig::default()
    };
    let work = rows.into_iter().map(WorkItem::from).collect();
    let result = engine(&fetcher).run(work, &config).expect("run");

    let titles: Vec<&str> = result.articles().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Budget day", "Café budget"]);
    assert_eq!(result.counters.warc_input_processed, 3);
    assert_eq!(result.counters.warc_input_failed, 1);
    assert_eq!(result.counters.records_processed, 2);
}

#[test]
fn url_only_mode_fetches_nothing() {
    let fetcher = Arc::new(MemoryFetcher::default());
    let config = JobConfig {
        partition_count: 2,
        url_only: true,
        ..JobConfig::default()
    };
    let work: Vec<WorkItem> = (0..5)
        .map(|i| WorkItem::object(format!("s3://cc/{i}.warc.gz")))
        .collect();
    let result = engine(&fetcher).run(work, &config).expect("run");

    let urls: Vec<&str> = result.records.iter().map(JobRecord::url).collect();
    assert_eq!(
        urls,
        vec![
            "s3://cc/0.warc.gz",
            "s3://cc/1.warc.gz",
            "s3://cc/2.warc.gz",
            "s3://cc/3.warc.gz",
            "s3://cc/4.warc.gz",
        ]
    );
    assert!(result.records.iter().all(|r| r.as_article().is_none()));
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn limit_caps_each_partition() {
    let archive = |prefix: &str| {
        let records: Vec<Vec<u8>> = (0..3)
            .map(|i| {
                story(
                    &format!("https://{prefix}.example/{i}"),
                    &format!("{prefix} {i}"),
                    "2021-03-05",
                    "budget",
                )
            })
            .collect();
        gzip_members(&records)
    };
    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with("a", archive("a"))
            .with("b", archive("b")),
    );

    let single = JobConfig {
        partition_count: 1,
        global_limit: Some(2),
        ..march_2021(&[])
    };
    let result = engine(&fetcher)
        .run(vec![WorkItem::object("a"), WorkItem::object("b")], &single)
        .expect("run");
    let titles: Vec<&str> = result.articles().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["a 0", "a 1"]);
    // The second archive is never opened once the quota is used up.
    assert_eq!(result.counters.warc_input_processed, 1);

    // ceil(3 / 2) = 2 per partition
    let split = JobConfig {
        partition_count: 2,
        global_limit: Some(3),
        ..march_2021(&[])
    };
    let result = engine(&fetcher)
        .run(vec![WorkItem::object("a"), WorkItem::object("b")], &split)
        .expect("run");
    let titles: Vec<&str> = result.articles().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["a 0", "a 1", "b 0", "b 1"]);
}

#[test]
fn streaming_run_delivers_records_to_the_sink() {
    let fetcher = Arc::new(MemoryFetcher::default().with(
        "a",
        gzip_members(&[
            story("https://a.example/1", "One", "2021-03-01", "budget"),
            story("https://a.example/2", "Two", "2021-03-02", "budget"),
        ]),
    ));
    let config = march_2021(&["budget"]);
    let (tx, rx) = mpsc::channel();
    let sink = ChannelRecordSink::new(tx);
    let counters = engine(&fetcher)
        .run_streaming(
            vec![WorkItem::object("a")],
            &config,
            &sink,
            &CancellationToken::new(),
        )
        .expect("run");
    drop(sink);

    let urls: Vec<String> = rx.iter().map(|record| record.url().to_string()).collect();
    assert_eq!(urls, vec!["https://a.example/1", "https://a.example/2"]);
    assert_eq!(counters.records_processed, 2);
}

#[test]
fn cancelled_run_does_no_work() {
    let fetcher = Arc::new(MemoryFetcher::default().with("a", Vec::new()));
    let config = march_2021(&[]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, rx) = mpsc::channel();
    let sink = ChannelRecordSink::new(tx);

    let counters = engine(&fetcher)
        .run_streaming(vec![WorkItem::object("a")], &config, &sink, &cancel)
        .expect("run");
    drop(sink);

    assert_eq!(rx.iter().count(), 0);
    assert_eq!(counters.warc_input_processed, 0);
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn invalid_runs_are_rejected_up_front() {
    let fetcher = Arc::new(MemoryFetcher::default());
    let config = JobConfig::default();
    let engine = engine(&fetcher);

    assert!(matches!(
        engine.run(Vec::new(), &config),
        Err(JobError::Validation)
    ));

    let zero_partitions = JobConfig {
        partition_count: 0,
        ..JobConfig::default()
    };
    assert!(matches!(
        engine.run(vec![WorkItem::object("a")], &zero_partitions),
        Err(JobError::Configuration(_))
    ));

    let zero_limit = JobConfig {
        global_limit: Some(0),
        ..JobConfig::default()
    };
    assert!(matches!(
        engine.run(vec![WorkItem::object("a")], &zero_limit),
        Err(JobError::Configuration(_))
    ));
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn encoded_http_bodies_are_extracted() {
    let page = news_page("Budget passes", "2021-03-04", "The budget vote passed.");
    let records = vec![
        encoded_response_record(
            "https://news.example.com/gz",
            &[("Content-Type", "text/html"), ("Content-Encoding", "gzip")],
            &gzip(page.as_bytes()),
        ),
        encoded_response_record(
            "https://news.example.com/chunked",
            &[("Content-Type", "text/html"), ("Transfer-Encoding", "chunked")],
            &chunked(page.as_bytes(), 60),
        ),
        encoded_response_record(
            "https://news.example.com/broken",
            &[("Content-Type", "text/html"), ("Content-Encoding", "gzip")],
            page.as_bytes(),
        ),
    ];
    let fetcher = Arc::new(MemoryFetcher::default().with("enc.warc.gz", gzip_members(&records)));
    let config = march_2021(&["budget"]);
    let result = engine(&fetcher)
        .run(vec![WorkItem::object("enc.warc.gz")], &config)
        .expect("run");

    let urls: Vec<&str> = result.records.iter().map(JobRecord::url).collect();
    assert_eq!(
        urls,
        vec!["https://news.example.com/gz", "https://news.example.com/chunked"]
    );
    assert_eq!(result.counters.records_processed, 3);
    assert_eq!(result.counters.records_parsing_failed, 1);
    assert_eq!(result.counters.warc_input_failed, 0);
}

#[test]
fn each_run_uses_its_own_criteria() {
    let archive = gzip_members(&[story(
        "https://news.example.com/rain",
        "Rain",
        "2021-03-05",
        "Weather report.",
    )]);
    let fetcher = Arc::new(MemoryFetcher::default().with("a.warc.gz", archive));
    let engine = engine(&fetcher);
    let work = || vec![WorkItem::object("a.warc.gz")];

    let open = engine.run(work(), &march_2021(&[])).expect("run");
    assert_eq!(open.articles().count(), 1);

    let budget_only = engine.run(work(), &march_2021(&["budget"])).expect("run");
    assert_eq!(budget_only.articles().count(), 0);
}

struct NoRain;

impl ArticleFilter for NoRain {
    fn name(&self) -> &'static str {
        "no_rain"
    }

    fn check(&self, article: &Article) -> Verdict {
        if article.title.contains("Rain") {
            Verdict::Reject(Rejection::Other("rain".into()))
        } else {
            Verdict::Keep
        }
    }
}

#[test]
fn pipeline_filters_apply_after_the_criteria() {
    init_logging();
    let archive = gzip_members(&[
        story("https://a.example/rain", "Rain", "2021-03-05", "budget"),
        story("https://a.example/sun", "Sun", "2021-03-06", "budget"),
    ]);
    let fetcher: Arc<dyn ArchiveFetcher> =
        Arc::new(MemoryFetcher::default().with("a.warc.gz", archive));
    let pipeline = Pipeline::new(fetcher, Arc::new(MetaTagExtractor)).with_filter(NoRain);
    let engine = Engine::new(pipeline).expect("engine");

    let result = engine
        .run(vec![WorkItem::object("a.warc.gz")], &march_2021(&["budget"]))
        .expect("run");
    let urls: Vec<&str> = result.records.iter().map(JobRecord::url).collect();
    assert_eq!(urls, vec!["https://a.example/sun"]);
}
