//! reqwest-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS,
};
use reqwest::redirect::Policy;
use slotwatch_core::{FetchError, FetchOptions, FetchResponse, Fetcher};
use tracing::{debug, warn};

use crate::error::Result;

/// Desktop browser user agent; the target site serves challenge pages to
/// obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 5;

/// Fetcher holding one pooled HTTP client for the process lifetime.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Build a fetcher whose requests time out after `timeout` unless the
    /// caller overrides it per request.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout.as_millis() as u64)
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Request(err.to_string())
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    /// Any status below 500 is returned with its body; 5xx is an error.
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> std::result::Result<FetchResponse, FetchError> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let mut request = self.client.get(url).timeout(timeout);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(accept) = &options.accept {
            request = request.header(ACCEPT, accept.as_str());
        }

        let response = request.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        if status >= 500 {
            warn!(url = %url, status, "server error");
            return Err(FetchError::Status(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| classify(e, timeout))?;
        debug!(
            url = %url,
            status,
            content_type = %content_type,
            content_length = body.len(),
            "response received"
        );

        Ok(FetchResponse::new(status, body))
    }
}
