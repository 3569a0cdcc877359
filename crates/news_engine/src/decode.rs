use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// Bytes fed to the encoding detector; the head of a page is enough.
const DETECTION_WINDOW: usize = 64 * 1024;
/// Bytes searched for a `<meta>` charset declaration.
const META_PRESCAN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

/// Decode raw bytes into UTF-8 using: declared charset -> BOM -> Content-Type
/// charset -> `<meta>` charset -> chardetng detection -> UTF-8.
///
/// Unknown or empty labels fall through to the next step. Decoding is lossy.
pub fn decode_html(
    bytes: &[u8],
    declared_charset: Option<&str>,
    content_type: Option<&str>,
) -> DecodedHtml {
    // 1) Charset identified upstream (index row or WARC header)
    if let Some(enc) = declared_charset.and_then(encoding_for_label) {
        return decode_with(bytes, enc);
    }

    // 2) BOM aware decode using encoding_rs helper
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    // 3) Content-Type header charset
    if let Some(enc) = content_type.and_then(extract_charset).and_then(encoding_for_label) {
        return decode_with(bytes, enc);
    }

    // 4) <meta charset> or http-equiv Content-Type near the top of the page
    if let Some(enc) = meta_charset(bytes) {
        return decode_with(bytes, enc);
    }

    // 5) chardetng detection over the head of the page
    if bytes.is_empty() {
        return decode_with(bytes, UTF_8);
    }
    let window = &bytes[..bytes.len().min(DETECTION_WINDOW)];
    let mut detector = EncodingDetector::new();
    detector.feed(window, window.len() == bytes.len());
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    Encoding::for_label(label.as_bytes())
}

fn extract_charset(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches([' ', '"', '\'']))
        })
        .next()
}

/// Charset declared by a `<meta>` tag in the first [`META_PRESCAN`] bytes.
///
/// Covers `<meta charset=...>` and `<meta http-equiv="Content-Type"
/// content="...; charset=...">`. A UTF-16 label found by a byte scan cannot be
/// right, so it is read as UTF-8.
fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_PRESCAN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    let mut rest = head.as_str();
    while let Some(start) = rest.find("<meta") {
        let tag = &rest[start + 5..];
        let end = tag.find('>').unwrap_or(tag.len());
        let (attrs, after) = tag.split_at(end);
        rest = after;

        let Some(pos) = attrs.find("charset") else {
            continue;
        };
        let value = attrs[pos + "charset".len()..].trim_start();
        let Some(value) = value.strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start().trim_start_matches(['"', '\'']);
        let label_end = value
            .find(|c: char| matches!(c, '"' | '\'' | ';' | '/' | '>') || c.is_whitespace())
            .unwrap_or(value.len());
        if let Some(enc) = encoding_for_label(&value[..label_end]) {
            return Some(if enc == UTF_16LE || enc == UTF_16BE {
                UTF_8
            } else {
                enc
            });
        }
    }
    None
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, actual, had_errors) = enc.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: actual.name().to_string(),
        had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_parameter_parsing() {
        assert_eq!(extract_charset("text/html; charset=UTF-8"), Some("UTF-8"));
        assert_eq!(extract_charset("text/html;Charset=\"latin1\""), Some("latin1"));
        assert_eq!(extract_charset("text/html"), None);
    }

    #[test]
    fn meta_charset_forms() {
        let tag = b"<html><head><meta charset=\"ISO-8859-2\"></head>";
        assert_eq!(meta_charset(tag).map(|e| e.name()), Some("ISO-8859-2"));

        let http_equiv = b"<meta http-equiv='Content-Type' content='text/html; charset=Shift_JIS'>";
        assert_eq!(meta_charset(http_equiv).map(|e| e.name()), Some("Shift_JIS"));

        assert_eq!(meta_charset(b"<meta charset=utf-16>"), Some(UTF_8));
        assert_eq!(meta_charset(b"<meta name=\"charset\" content=\"x\">"), None);
        assert_eq!(meta_charset(b"<p>charset=latin2</p>"), None);
    }

    #[test]
    fn meta_charset_beyond_the_prescan_is_ignored() {
        let mut page = vec![b' '; META_PRESCAN];
        page.extend_from_slice(b"<meta charset=\"koi8-r\">");
        assert_eq!(meta_charset(&page), None);
    }

    #[test]
    fn meta_charset_decides_before_detection() {
        // 0xE6 is "ć" in ISO-8859-2 and "æ" in windows-1252.
        let mut page = b"<html><head><meta charset=\"iso-8859-2\"></head><body>".to_vec();
        page.extend_from_slice(b"Kra\xe6</body></html>");
        let decoded = decode_html(&page, None, Some("text/html"));
        assert_eq!(decoded.encoding_label, "ISO-8859-2");
        assert!(decoded.html.contains("Kra\u{107}"));

        // The Content-Type header still wins over the page.
        let decoded = decode_html(&page, None, Some("text/html; charset=windows-1252"));
        assert!(decoded.html.contains("Kra\u{e6}"));
    }

    #[test]
    fn empty_declared_charset_is_ignored() {
        let decoded = decode_html(b"caf\xc3\xa9", Some("  "), None);
        assert_eq!(decoded.html, "café");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }
}
