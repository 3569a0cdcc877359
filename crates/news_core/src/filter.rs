//! Article predicates applied after extraction, in a fixed order.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use url::Url;

use crate::{Article, FilterCriteria};

/// `og:type` values accepted as a news signal.
pub const NEWS_OG_TYPES: [&str; 3] = ["article", "news", "newsarticle"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotNews { og_type: Option<String> },
    OutsideDateRange { date: NaiveDate },
    UnknownDate,
    NoKeyword,
    HostNotAllowed { host: Option<String> },
    Other(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotNews { og_type } => write!(f, "not a news page (og:type {og_type:?})"),
            Rejection::OutsideDateRange { date } => write!(f, "publish date {date} outside range"),
            Rejection::UnknownDate => write!(f, "publish date unknown"),
            Rejection::NoKeyword => write!(f, "no keyword found"),
            Rejection::HostNotAllowed { host } => write!(f, "host {host:?} not allowed"),
            Rejection::Other(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Reject(Rejection),
}

impl Verdict {
    pub fn is_keep(&self) -> bool {
        matches!(self, Verdict::Keep)
    }
}

pub trait ArticleFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, article: &Article) -> Verdict;
}

/// Requires the page to declare itself as an article through `og:type`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewsTypeFilter;

impl ArticleFilter for NewsTypeFilter {
    fn name(&self) -> &'static str {
        "news_type"
    }

    fn check(&self, article: &Article) -> Verdict {
        let recognized = article.og_type.as_deref().is_some_and(|og_type| {
            NEWS_OG_TYPES
                .iter()
                .any(|news| og_type.trim().eq_ignore_ascii_case(news))
        });
        if recognized {
            Verdict::Keep
        } else {
            Verdict::Reject(Rejection::NotNews {
                og_type: article.og_type.clone(),
            })
        }
    }
}

/// Inclusive publish-date window; either bound may be open.
///
/// Publish dates are held in UTC, so the day compared is the UTC day: a page
/// stamped `2021-03-01T00:30:00+02:00` falls on 2021-02-28.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub strict: bool,
}

impl DateRangeFilter {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| start <= date) && self.end.is_none_or(|end| date <= end)
    }
}

impl ArticleFilter for DateRangeFilter {
    fn name(&self) -> &'static str {
        "date_range"
    }

    fn check(&self, article: &Article) -> Verdict {
        match article.publish_date {
            Some(published) => {
                let date = published.date_naive();
                if self.contains(date) {
                    Verdict::Keep
                } else {
                    Verdict::Reject(Rejection::OutsideDateRange { date })
                }
            }
            None if self.strict => Verdict::Reject(Rejection::UnknownDate),
            None => Verdict::Keep,
        }
    }
}

/// Case-insensitive substring match of any keyword against title and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<'a>(keywords: impl IntoIterator<Item = &'a String>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl ArticleFilter for KeywordFilter {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn check(&self, article: &Article) -> Verdict {
        if self.keywords.is_empty() {
            return Verdict::Keep;
        }
        let title = article.title.to_lowercase();
        let text = article.text.to_lowercase();
        let found = self
            .keywords
            .iter()
            .any(|keyword| title.contains(keyword) || text.contains(keyword));
        if found {
            Verdict::Keep
        } else {
            Verdict::Reject(Rejection::NoKeyword)
        }
    }
}

/// Host allow-list; an entry also admits all of its subdomains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFilter {
    hosts: BTreeSet<String>,
}

impl HostFilter {
    pub fn new<'a>(hosts: impl IntoIterator<Item = &'a String>) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|host| normalize_host(host))
            .filter(|host| !host.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn allows_host(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn normalize_host(entry: &str) -> String {
    let entry = entry.trim().trim_end_matches('.').to_ascii_lowercase();
    let entry = entry.trim_start_matches('.');
    entry.strip_prefix("www.").unwrap_or(entry).to_string()
}

impl ArticleFilter for HostFilter {
    fn name(&self) -> &'static str {
        "host"
    }

    fn check(&self, article: &Article) -> Verdict {
        if self.hosts.is_empty() {
            return Verdict::Keep;
        }
        let host = Url::parse(&article.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));
        match host {
            Some(host) if self.allows_host(&host) => Verdict::Keep,
            host => Verdict::Reject(Rejection::HostNotAllowed { host }),
        }
    }
}

/// Ordered article predicates; the first rejection short-circuits the rest.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn ArticleFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// News type (unless `news_only`), date range, keywords, hosts.
    pub fn from_criteria(criteria: &FilterCriteria) -> Self {
        let mut chain = Self::new();
        if !criteria.news_only {
            chain = chain.with(NewsTypeFilter);
        }
        chain
            .with(DateRangeFilter {
                start: criteria.start_date,
                end: criteria.end_date,
                strict: criteria.strict_date,
            })
            .with(KeywordFilter::new(&criteria.keywords))
            .with(HostFilter::new(&criteria.hosts))
    }

    pub fn with(mut self, filter: impl ArticleFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    pub fn evaluate(&self, article: &Article) -> Verdict {
        for filter in &self.filters {
            if let Verdict::Reject(rejection) = filter.check(article) {
                return Verdict::Reject(rejection);
            }
        }
        Verdict::Keep
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}
