//! Archive record headers and the classification predicates over them.

pub const HTML_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

pub const WARC_TYPE: &str = "WARC-Type";
pub const WARC_TARGET_URI: &str = "WARC-Target-URI";
pub const WARC_DATE: &str = "WARC-Date";
pub const WARC_IDENTIFIED_PAYLOAD_TYPE: &str = "WARC-Identified-Payload-Type";
pub const WARC_IDENTIFIED_CONTENT_CHARSET: &str = "WARC-Identified-Content-Charset";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Header names are matched case-insensitively; the first occurrence wins.
fn find_field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Status line and headers of an HTTP message stored inside a record block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpHeaders {
    pub status_line: String,
    pub fields: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn get(&self, name: &str) -> Option<&str> {
        find_field(&self.fields, name)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }
}

/// Named header fields of one WARC record (legacy ARC records are upgraded first).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub version: String,
    pub fields: Vec<(String, String)>,
    pub http: Option<HttpHeaders>,
}

impl RecordHeader {
    pub fn get(&self, name: &str) -> Option<&str> {
        find_field(&self.fields, name)
    }

    /// Replaces every existing value of `name`, or appends it.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.fields.push((name.to_string(), value.into()));
    }

    pub fn record_type(&self) -> &str {
        self.get(WARC_TYPE).unwrap_or_default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    pub fn payload_type(&self) -> Option<&str> {
        self.get(WARC_IDENTIFIED_PAYLOAD_TYPE)
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.get(WARC_TARGET_URI)
    }

    pub fn identified_charset(&self) -> Option<&str> {
        self.get(WARC_IDENTIFIED_CONTENT_CHARSET)
            .map(str::trim)
            .filter(|charset| !charset.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH)
            .and_then(|value| value.trim().parse().ok())
    }

    /// Content type describing the payload: the HTTP header when the block was
    /// an HTTP message, the record's own content type otherwise.
    pub fn payload_content_type(&self) -> Option<&str> {
        match &self.http {
            Some(http) => http.content_type(),
            None => self.content_type(),
        }
    }
}

fn mime_essence(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}

pub fn is_response(header: &RecordHeader) -> bool {
    header.record_type() == "response"
}

/// WET extracted-text record.
pub fn is_conversion_text(header: &RecordHeader) -> bool {
    header.record_type() == "conversion"
        && header
            .content_type()
            .is_some_and(|ct| mime_essence(ct).eq_ignore_ascii_case("text/plain"))
}

/// WAT metadata record.
pub fn is_metadata_json(header: &RecordHeader) -> bool {
    header.record_type() == "metadata"
        && header
            .content_type()
            .is_some_and(|ct| mime_essence(ct).eq_ignore_ascii_case("application/json"))
}

/// A present identified payload type is authoritative; only its absence falls
/// back to a substring check of the payload content type.
pub fn is_html(header: &RecordHeader) -> bool {
    if let Some(payload_type) = header.payload_type() {
        let essence = mime_essence(payload_type);
        return HTML_TYPES
            .iter()
            .any(|html| essence.eq_ignore_ascii_case(html));
    }
    header.payload_content_type().is_some_and(|content_type| {
        let lower = content_type.to_ascii_lowercase();
        HTML_TYPES.iter().any(|html| lower.contains(html))
    })
}
