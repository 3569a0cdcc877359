use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failures worth another attempt: timeouts, connection trouble, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => code == 429 || (500..600).contains(&code),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUri,
    InvalidRange,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Scratch,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUri => write!(f, "invalid uri"),
            FailureKind::InvalidRange => write!(f, "invalid byte range"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Scratch => write!(f, "scratch file error"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
