use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use news_core::Article;
use scraper::{ElementRef, Html, Selector};

use crate::text::{document_text, element_text};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no title or text found")]
    Empty,
}

pub trait ArticleExtractor: Send + Sync {
    fn extract(&self, url: &str, html: &str) -> Result<Article, ExtractError>;
}

/// Meta names and properties that carry a publish date, most specific first.
const DATE_META_KEYS: [&str; 9] = [
    "article:published_time",
    "og:published_time",
    "datepublished",
    "pubdate",
    "publishdate",
    "publish-date",
    "date",
    "dc.date",
    "dcterms.created",
];

/// Article extractor driven by page metadata:
/// - title from `og:title`, then `<title>`, then the first `<h1>`
/// - text of `<article>` if present, otherwise of the whole document
/// - publish date from date meta tags, then the first `<time datetime>`
/// - `og:type` as declared by the page.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaTagExtractor;

impl ArticleExtractor for MetaTagExtractor {
    fn extract(&self, url: &str, html: &str) -> Result<Article, ExtractError> {
        let doc = Html::parse_document(html);
        let metas = collect_meta(&doc);

        let title = meta_value(&metas, "og:title")
            .map(str::to_string)
            .or_else(|| first_text(&doc, "title"))
            .or_else(|| first_text(&doc, "h1"))
            .unwrap_or_default();

        let text = first_element(&doc, "article")
            .map(element_text)
            .unwrap_or_else(|| document_text(&doc));

        if title.is_empty() && text.is_empty() {
            return Err(ExtractError::Empty);
        }

        let publish_date = DATE_META_KEYS
            .iter()
            .filter_map(|key| meta_value(&metas, key))
            .find_map(parse_date)
            .or_else(|| time_element_date(&doc));

        let og_type = meta_value(&metas, "og:type").map(|value| value.to_ascii_lowercase());

        Ok(Article {
            url: url.to_string(),
            title,
            text,
            publish_date,
            og_type,
        })
    }
}

/// `(key, content)` pairs from `<meta>` tags, keyed by `property`, `name` or
/// `itemprop` (lowercased). `itemprop` elements may carry `datetime` instead.
fn collect_meta(doc: &Html) -> Vec<(String, String)> {
    let Ok(selector) = Selector::parse("meta, [itemprop]") else {
        return Vec::new();
    };
    doc.select(&selector)
        .filter_map(|element| {
            let attrs = element.value();
            let key = attrs
                .attr("property")
                .or_else(|| attrs.attr("name"))
                .or_else(|| attrs.attr("itemprop"))?;
            let content = attrs.attr("content").or_else(|| attrs.attr("datetime"))?;
            let content = content.trim();
            (!content.is_empty()).then(|| (key.trim().to_ascii_lowercase(), content.to_string()))
        })
        .collect()
}

fn meta_value<'a>(metas: &'a [(String, String)], key: &str) -> Option<&'a str> {
    metas
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

fn first_element<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector).next()
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    first_element(doc, selector)
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

fn time_element_date(doc: &Html) -> Option<DateTime<Utc>> {
    let selector = Selector::parse("time[datetime]").ok()?;
    doc.select(&selector)
        .filter_map(|element| element.value().attr("datetime"))
        .find_map(parse_date)
}

/// Parses the date formats found in news page metadata.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }
    None
}
