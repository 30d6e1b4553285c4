//! Primary open-data API client.
//!
//! Outside an approved origin the API is only reachable through public CORS
//! relays, so the client can wrap every target URL through an ordered ring
//! of relay templates. The ring cursor sticks to the last relay that
//! worked and is advanced before any suspension point, so concurrent calls
//! observe a consistent rotation.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::endpoint::EndpointKey;
use crate::error::FetchError;
use crate::http::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::sources::{request_json_with_retry, FetchParams, SourceFetcher};

pub const DEFAULT_API_BASE: &str = "https://open.waterauthority.gov.cy/api";

/// Relay templates in rotation order; `{url}` is replaced with the
/// percent-encoded target.
pub const DEFAULT_RELAYS: [&str; 3] = [
    "https://api.allorigins.win/raw?url={url}",
    "https://corsproxy.io/?{url}",
    "https://api.codetabs.com/v1/proxy?quest={url}",
];

pub struct PrimaryApiClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    relay_mode: bool,
    relays: Vec<String>,
    cursor: AtomicUsize,
    retry: RetryConfig,
}

impl PrimaryApiClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>, relay_mode: bool) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            relay_mode,
            relays: DEFAULT_RELAYS.iter().map(|s| (*s).to_owned()).collect(),
            cursor: AtomicUsize::new(0),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn target_url(&self, endpoint: EndpointKey, params: &FetchParams) -> String {
        format!(
            "{}/{}{}",
            self.base_url.trim_end_matches('/'),
            endpoint.api_path(),
            params.query_string()
        )
    }

    fn wrap(template: &str, target: &str) -> String {
        template.replace("{url}", &urlencoding::encode(target))
    }

    /// Tries every relay at most once, starting from the sticky cursor and
    /// wrapping around. Each relay gets the full per-relay retry budget;
    /// a 4xx skips straight to the next relay.
    async fn fetch_via_relays(&self, target: &str) -> Result<Value, FetchError> {
        debug_assert!(!self.relays.is_empty());
        if self.relays.is_empty() {
            return Err(FetchError::no_data("no relay templates configured"));
        }

        let start = self.cursor.load(Ordering::Acquire);
        let mut last_error: Option<FetchError> = None;

        for offset in 0..self.relays.len() {
            let index = (start + offset) % self.relays.len();
            let wrapped = Self::wrap(&self.relays[index], target);

            match request_json_with_retry(&self.http, HttpRequest::get(wrapped), &self.retry).await
            {
                Ok(value) => {
                    // Keep using the relay that worked.
                    self.cursor.store(index, Ordering::Release);
                    return Ok(value);
                }
                Err(error) => {
                    debug!(relay = index, error = %error, "relay attempt failed; rotating");
                    // Advance before the next await so concurrent callers
                    // start from the following relay.
                    self.cursor
                        .store((index + 1) % self.relays.len(), Ordering::Release);
                    last_error = Some(error);
                }
            }
        }

        warn!(target, "every relay exhausted for primary API call");
        Err(last_error.unwrap_or_else(|| FetchError::no_data("no relay produced a response")))
    }
}

impl SourceFetcher for PrimaryApiClient {
    fn name(&self) -> &'static str {
        "primary-api"
    }

    fn fetch<'a>(
        &'a self,
        endpoint: EndpointKey,
        params: &'a FetchParams,
    ) -> Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let target = self.target_url(endpoint, params);
            if self.relay_mode {
                self.fetch_via_relays(&target).await
            } else {
                request_json_with_retry(&self.http, HttpRequest::get(target), &self.retry).await
            }
        })
    }
}
