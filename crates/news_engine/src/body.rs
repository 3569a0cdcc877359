//! Undoes the transfer and content codings of an archived HTTP response body.

use std::io::{self, Read};

use engine_logging::engine_debug;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use news_core::HttpHeaders;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("malformed chunked body: {0}")]
    Chunked(String),
    #[error("cannot undo {encoding} content encoding: {source}")]
    ContentEncoding {
        encoding: String,
        #[source]
        source: io::Error,
    },
}

/// Returns the entity body of `raw`: dechunked when the response says
/// `Transfer-Encoding: chunked`, then inflated per `Content-Encoding`.
///
/// A body whose first chunk-size line does not parse is taken as not chunked,
/// since archives often keep the header after storing the dechunked body.
/// Unsupported content codings are passed through unchanged.
pub fn decode_http_body(headers: &HttpHeaders, raw: Vec<u8>) -> Result<Vec<u8>, BodyError> {
    let mut body = raw;
    if has_token(headers.get("Transfer-Encoding"), "chunked") {
        if let Some(dechunked) = dechunk(&body)? {
            body = dechunked;
        }
    }

    let Some(codings) = headers.get("Content-Encoding") else {
        return Ok(body);
    };
    // Codings are listed in the order they were applied.
    for coding in codings.rsplit(',').map(str::trim) {
        body = match coding.to_ascii_lowercase().as_str() {
            "" | "identity" => body,
            "gzip" | "x-gzip" => inflate(MultiGzDecoder::new(&body[..]), coding)?,
            "deflate" => match inflate(ZlibDecoder::new(&body[..]), coding) {
                Ok(inflated) => inflated,
                // Some servers send raw deflate without the zlib wrapper.
                Err(_) => inflate(DeflateDecoder::new(&body[..]), coding)?,
            },
            other => {
                engine_debug!("Leaving body with {} content encoding as is", other);
                return Ok(body);
            }
        };
    }
    Ok(body)
}

fn has_token(value: Option<&str>, token: &str) -> bool {
    value.is_some_and(|value| {
        value
            .split(',')
            .any(|part| part.trim().eq_ignore_ascii_case(token))
    })
}

fn inflate<R: Read>(mut decoder: R, coding: &str) -> Result<Vec<u8>, BodyError> {
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|source| BodyError::ContentEncoding {
            encoding: coding.to_string(),
            source,
        })?;
    Ok(out)
}

/// `Ok(None)` when `raw` does not start with a chunk-size line.
///
/// A stream that ends after a complete chunk without the final zero-size
/// chunk is accepted; a chunk cut short is not.
fn dechunk(raw: &[u8]) -> Result<Option<Vec<u8>>, BodyError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    let mut first = true;

    while !rest.is_empty() {
        let Some(line_end) = rest.iter().position(|&b| b == b'\n') else {
            if first {
                return Ok(None);
            }
            return Err(BodyError::Chunked("unterminated chunk-size line".into()));
        };
        let line = String::from_utf8_lossy(&rest[..line_end]);
        let size_field = line.trim().split(';').next().unwrap_or_default().trim();
        let size = match usize::from_str_radix(size_field, 16) {
            Ok(size) if !size_field.is_empty() => size,
            _ if first => return Ok(None),
            _ => return Err(BodyError::Chunked(format!("bad chunk size {size_field:?}"))),
        };
        first = false;
        rest = &rest[line_end + 1..];
        if size == 0 {
            // Trailer fields are not part of the body.
            break;
        }
        if rest.len() < size {
            return Err(BodyError::Chunked(format!(
                "chunk of {size} bytes has only {} left",
                rest.len()
            )));
        }
        out.extend_from_slice(&rest[..size]);
        rest = &rest[size..];
        rest = rest
            .strip_prefix(b"\r\n")
            .or_else(|| rest.strip_prefix(b"\n"))
            .unwrap_or(rest);
    }
    Ok(Some(out))
}
