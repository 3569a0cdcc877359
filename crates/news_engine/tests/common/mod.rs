#![allow(dead_code)]

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

/// A serialized WARC record with the given type, extra header fields and block.
pub fn warc_record(record_type: &str, fields: &[(&str, &str)], block: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.0\r\n");
    out.extend_from_slice(format!("WARC-Type: {record_type}\r\n").as_bytes());
    for (name, value) in fields {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", block.len()).as_bytes());
    out.extend_from_slice(block);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// An HTTP response message with the given content type and body.
pub fn http_block(content_type: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nServer: test\r\n\r\n{body}"
    )
    .into_bytes()
}

/// A WARC response record carrying an HTTP response.
pub fn response_record(url: &str, content_type: &str, body: &str) -> Vec<u8> {
    warc_record(
        "response",
        &[
            ("WARC-Target-URI", url),
            ("WARC-Date", "2021-03-04T10:00:00Z"),
            ("Content-Type", "application/http; msgtype=response"),
        ],
        &http_block(content_type, body),
    )
}

/// A WARC response record whose HTTP message carries `headers` and the raw `body`.
pub fn encoded_response_record(url: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut block = b"HTTP/1.1 200 OK\r\n".to_vec();
    for (name, value) in headers {
        block.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    block.extend_from_slice(b"\r\n");
    block.extend_from_slice(body);
    warc_record(
        "response",
        &[
            ("WARC-Target-URI", url),
            ("WARC-Date", "2021-03-04T10:00:00Z"),
            ("Content-Type", "application/http; msgtype=response"),
        ],
        &block,
    )
}

/// `body` in chunked transfer coding, split into two chunks at `split`.
pub fn chunked(body: &[u8], split: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for part in [&body[..split], &body[split..]] {
        out.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// Each record compressed as its own gzip member, as crawl archives are.
pub fn gzip_members(records: &[Vec<u8>]) -> Vec<u8> {
    records.iter().flat_map(|record| gzip(record)).collect()
}

pub fn news_page(title: &str, date: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title>\
         <meta property=\"og:type\" content=\"article\">\
         <meta property=\"article:published_time\" content=\"{date}\">\
         </head><body><article><h1>{title}</h1><p>{body}</p></article></body></html>"
    )
}
