//! Streaming reader for WARC files and legacy ARC files, gzipped or not.
//!
//! Records are handed out one at a time and borrow the reader, so the payload
//! of a record has to be consumed (or dropped) before the next one is read.
//! Legacy ARC records are rewritten into WARC header fields on the fly.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};

use chrono::NaiveDateTime;
use flate2::bufread::MultiGzDecoder;
use news_core::{
    HttpHeaders, RecordHeader, CONTENT_LENGTH, CONTENT_TYPE, WARC_DATE, WARC_TARGET_URI,
    WARC_TYPE,
};

use crate::body::{decode_http_body, BodyError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_LINE: u64 = 64 * 1024;
const ARC_VERSION: &str = "ARC/1";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid record version line {0:?}")]
    InvalidVersion(String),
    #[error("malformed header: {0}")]
    InvalidHeader(String),
    #[error("record has no valid Content-Length")]
    MissingContentLength,
    #[error("record truncated, {missing} bytes missing")]
    Truncated { missing: u64 },
    #[error("unrecognized archive format")]
    UnknownFormat,
    /// The record itself was read; only its HTTP body could not be decoded.
    #[error(transparent)]
    Body(#[from] BodyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Warc,
    /// Legacy Internet Archive ARC, upgraded to WARC fields while reading.
    Arc,
}

struct Source {
    stream: Box<dyn BufRead>,
    /// Unread bytes left in the current record block.
    remaining: u64,
}

impl Source {
    /// Reads one line of at most `limit` bytes, without the line terminator.
    /// `None` at end of input.
    fn read_line(&mut self, limit: u64) -> Result<Option<String>, ArchiveError> {
        let mut buf = Vec::new();
        let read = (&mut self.stream).take(limit).read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') && read as u64 == limit {
            return Err(ArchiveError::InvalidHeader(format!(
                "line longer than {limit} bytes"
            )));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Reads one line that belongs to the current block.
    fn read_block_line(&mut self) -> Result<Option<String>, ArchiveError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let mut buf = Vec::new();
        let limit = self.remaining.min(MAX_LINE);
        let read = (&mut self.stream).take(limit).read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Err(ArchiveError::Truncated {
                missing: self.remaining,
            });
        }
        self.remaining -= read as u64;
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn block_starts_with(&mut self, prefix: &[u8]) -> Result<bool, ArchiveError> {
        if self.remaining < prefix.len() as u64 {
            return Ok(false);
        }
        Ok(self.stream.fill_buf()?.starts_with(prefix))
    }

    fn skip_remaining(&mut self) -> Result<(), ArchiveError> {
        if self.remaining == 0 {
            return Ok(());
        }
        let wanted = self.remaining;
        let skipped = io::copy(&mut (&mut self.stream).take(wanted), &mut io::sink())?;
        self.remaining = 0;
        if skipped < wanted {
            return Err(ArchiveError::Truncated {
                missing: wanted - skipped,
            });
        }
        Ok(())
    }
}

/// Forward-only reader over the records of one archive.
///
/// After the first error every further call to [`ArchiveReader::next_record`]
/// returns `Ok(None)`: a corrupt archive is abandoned, never resynchronized.
pub struct ArchiveReader {
    source: Source,
    format: Option<ArchiveFormat>,
    finished: bool,
    records_read: u64,
}

impl ArchiveReader {
    /// Wraps `reader`, transparently inflating gzip input (one or many members).
    pub fn new<R: Read + 'static>(reader: R) -> Result<Self, ArchiveError> {
        let mut buffered = BufReader::new(reader);
        let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
        let stream: Box<dyn BufRead> = if is_gzip {
            Box::new(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };
        Ok(Self {
            source: Source {
                stream,
                remaining: 0,
            },
            format: None,
            finished: false,
            records_read: 0,
        })
    }

    pub fn format(&self) -> Option<ArchiveFormat> {
        self.format
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Reads the next record, discarding whatever is left of the previous one.
    pub fn next_record(&mut self) -> Result<Option<RawRecord<'_>>, ArchiveError> {
        if self.finished {
            return Ok(None);
        }
        match self.read_header() {
            Ok(Some(header)) => {
                self.records_read += 1;
                Ok(Some(RawRecord {
                    header,
                    payload: PayloadReader {
                        source: &mut self.source,
                    },
                }))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(err) => {
                self.finished = true;
                Err(err)
            }
        }
    }

    fn read_header(&mut self) -> Result<Option<RecordHeader>, ArchiveError> {
        self.source.skip_remaining()?;

        let first = loop {
            match self.source.read_line(MAX_LINE)? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        let format = match self.format {
            Some(format) => format,
            None => {
                let detected = if first.starts_with("WARC/") {
                    ArchiveFormat::Warc
                } else if ArcHeader::parse(&first).is_some() {
                    ArchiveFormat::Arc
                } else {
                    return Err(ArchiveError::UnknownFormat);
                };
                self.format = Some(detected);
                detected
            }
        };

        let mut header = match format {
            ArchiveFormat::Warc => self.read_warc_header(first)?,
            ArchiveFormat::Arc => self.read_arc_header(&first)?,
        };

        if carries_http_response(&header) && self.source.block_starts_with(b"HTTP/")? {
            header.http = Some(self.read_http_headers()?);
        }
        Ok(Some(header))
    }

    fn read_warc_header(&mut self, version: String) -> Result<RecordHeader, ArchiveError> {
        if !version.starts_with("WARC/") {
            return Err(ArchiveError::InvalidVersion(version));
        }

        let mut fields: Vec<(String, String)> = Vec::new();
        loop {
            let line = self.source.read_line(MAX_LINE)?.ok_or_else(|| {
                ArchiveError::InvalidHeader("end of input inside record header".into())
            })?;
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                match fields.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                        continue;
                    }
                    None => return Err(ArchiveError::InvalidHeader(line)),
                }
            }
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    fields.push((name.trim().to_string(), value.trim().to_string()));
                }
                _ => return Err(ArchiveError::InvalidHeader(line)),
            }
        }

        let header = RecordHeader {
            version,
            fields,
            http: None,
        };
        self.source.remaining = header
            .content_length()
            .ok_or(ArchiveError::MissingContentLength)?;
        Ok(header)
    }

    fn read_arc_header(&mut self, line: &str) -> Result<RecordHeader, ArchiveError> {
        let arc = ArcHeader::parse(line)
            .ok_or_else(|| ArchiveError::InvalidHeader(format!("ARC record header {line:?}")))?;
        self.source.remaining = arc.length;
        Ok(arc.into_warc())
    }

    fn read_http_headers(&mut self) -> Result<HttpHeaders, ArchiveError> {
        let status_line = self.source.read_block_line()?.unwrap_or_default();
        let mut fields: Vec<(String, String)> = Vec::new();
        while let Some(line) = self.source.read_block_line()? {
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            // Servers send all kinds of junk; lines without a colon are dropped.
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        Ok(HttpHeaders {
            status_line,
            fields,
        })
    }
}

impl fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("format", &self.format)
            .field("finished", &self.finished)
            .field("records_read", &self.records_read)
            .finish()
    }
}

fn carries_http_response(header: &RecordHeader) -> bool {
    header.record_type() == "response"
        && header
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/http"))
}

/// One record: its header, and a payload that can be read once.
pub struct RawRecord<'a> {
    header: RecordHeader,
    payload: PayloadReader<'a>,
}

impl<'a> RawRecord<'a> {
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }

    /// Bytes still unread in this record's payload.
    pub fn payload_len(&self) -> u64 {
        self.payload.source.remaining
    }

    pub fn into_payload(self) -> PayloadReader<'a> {
        self.payload
    }

    /// Reads the whole payload. For HTTP responses this is the entity body,
    /// with chunked transfer coding and gzip/deflate content coding undone.
    pub fn read_payload(self) -> Result<Vec<u8>, ArchiveError> {
        let RawRecord { header, mut payload } = self;
        let mut bytes = Vec::new();
        payload.read_to_end(&mut bytes).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                ArchiveError::Truncated {
                    missing: payload.source.remaining,
                }
            } else {
                ArchiveError::Io(err)
            }
        })?;
        match &header.http {
            Some(http) => Ok(decode_http_body(http, bytes)?),
            None => Ok(bytes),
        }
    }
}

impl fmt::Debug for RawRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRecord")
            .field("header", &self.header)
            .field("payload_len", &self.payload_len())
            .finish()
    }
}

/// Reader limited to the unread part of the current record block.
pub struct PayloadReader<'a> {
    source: &'a mut Source,
}

impl Read for PayloadReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.source.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.source.remaining).unwrap_or(usize::MAX));
        let read = self.source.stream.read(&mut buf[..max])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside a record",
            ));
        }
        self.source.remaining -= read as u64;
        Ok(read)
    }
}

/// Header line of a legacy ARC record (version 1 or 2).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArcHeader {
    url: String,
    ip: String,
    date: String,
    content_type: String,
    length: u64,
}

impl ArcHeader {
    /// `URL IP date content-type length` (v1) or the ten-field v2 layout,
    /// whose last field is the length as well.
    fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 && parts.len() != 10 {
            return None;
        }
        let date = parts[2];
        if date.len() < 12 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let length = parts[parts.len() - 1].parse().ok()?;
        Some(Self {
            url: parts[0].to_string(),
            ip: parts[1].to_string(),
            date: date.to_string(),
            content_type: parts[3].to_string(),
            length,
        })
    }

    fn warc_date(&self) -> String {
        let padded = format!("{:0<14}", self.date);
        NaiveDateTime::parse_from_str(&padded[..14], "%Y%m%d%H%M%S")
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|_| self.date.clone())
    }

    fn into_warc(self) -> RecordHeader {
        let lower = self.url.to_ascii_lowercase();
        let (record_type, content_type) = if lower.starts_with("filedesc://") {
            ("warcinfo", self.content_type.clone())
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            ("response", "application/http; msgtype=response".to_string())
        } else {
            ("resource", self.content_type.clone())
        };

        let mut fields = vec![
            (WARC_TYPE.to_string(), record_type.to_string()),
            (WARC_DATE.to_string(), self.warc_date()),
            (CONTENT_TYPE.to_string(), content_type),
            (CONTENT_LENGTH.to_string(), self.length.to_string()),
        ];
        if record_type != "warcinfo" {
            fields.push((WARC_TARGET_URI.to_string(), self.url.clone()));
        }
        if self.ip != "0.0.0.0" && !self.ip.is_empty() {
            fields.push(("WARC-IP-Address".to_string(), self.ip.clone()));
        }
        fields.push(("WARC-Upgraded-From".to_string(), ARC_VERSION.to_string()));

        RecordHeader {
            version: "WARC/1.0".to_string(),
            fields,
            http: None,
        }
    }
}
