use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Classification of a failed endpoint fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transport-level failure: DNS, connect, timeout.
    Network,
    /// Upstream rejected the request (4xx). Not retried.
    HttpClient,
    /// Upstream failed (5xx). Retried, then surfaced.
    HttpServer,
    /// Response body could not be decoded into the expected shape.
    Parse,
    /// 2xx response carrying a server-embedded error payload.
    UpstreamDegraded,
    /// Local storage read/write failure reported through the cache path.
    Storage,
    /// Every source for the endpoint was exhausted without a usable payload.
    NoData,
}

/// Structured fetch error used by the source chain and surfaced per endpoint.
///
/// `Clone` so a deduplicated snapshot fetch can hand the same settled outcome
/// to every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    /// Classify a non-2xx HTTP status: 4xx is terminal, 5xx is retryable.
    pub fn http_status(status: u16) -> Self {
        if (400..500).contains(&status) {
            Self {
                kind: FetchErrorKind::HttpClient,
                message: format!("upstream rejected request with status {status}"),
                retryable: false,
            }
        } else {
            Self {
                kind: FetchErrorKind::HttpServer,
                message: format!("upstream returned status {status}"),
                retryable: true,
            }
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn upstream_degraded(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::UpstreamDegraded,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Storage,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::NoData,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::HttpClient => "fetch.http_client",
            FetchErrorKind::HttpServer => "fetch.http_server",
            FetchErrorKind::Parse => "fetch.parse",
            FetchErrorKind::UpstreamDegraded => "fetch.upstream_degraded",
            FetchErrorKind::Storage => "fetch.storage",
            FetchErrorKind::NoData => "fetch.no_data",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Failures reported by the key-value storage backend. These never escape the
/// cache store: reads degrade to a miss, writes to a no-op.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
