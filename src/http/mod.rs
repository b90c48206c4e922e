//! HTTP fetch capability
//!
//! Probes depend on the `Fetcher` trait rather than a concrete client so the
//! test suite can substitute deterministic fakes for live network targets.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::app::config::ScannerConfig;
use crate::error::ProbeError;

/// Maximum body bytes a probe will read; content checks need only the page
/// head and script text.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// How redirects are handled for a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Follow up to the configured redirect depth
    Follow,
    /// Return the redirect response itself (the transport probe inspects
    /// Location headers)
    Stop,
}

/// One fetched HTTP response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names lowercased; values as received
    pub headers: HashMap<String, String>,
    pub body: String,
    /// URL after any followed redirects
    pub final_url: String,
}

impl FetchResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|v| v.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Capability interface for HTTP(S) requests
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, redirects: RedirectMode) -> Result<FetchResponse, ProbeError>;
}

/// Production fetcher backed by reqwest with rustls
pub struct ReqwestFetcher {
    /// Redirect-following client
    following: reqwest::Client,
    /// Redirect-stopping client
    stopping: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &ScannerConfig) -> Result<Self, ProbeError> {
        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout))
                .connect_timeout(Duration::from_secs(config.request_timeout))
                .redirect(policy)
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| ProbeError::network(format!("failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            following: build(reqwest::redirect::Policy::limited(config.max_redirects))?,
            stopping: build(reqwest::redirect::Policy::none())?,
        })
    }

    fn classify(err: &reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::timeout(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ProbeError::network(format!("connection failed: {}", err))
        } else if err.is_decode() || err.is_body() {
            ProbeError::parse_failure(format!("response could not be read: {}", err))
        } else {
            ProbeError::network(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, redirects: RedirectMode) -> Result<FetchResponse, ProbeError> {
        let client = match redirects {
            RedirectMode::Follow => &self.following,
            RedirectMode::Stop => &self.stopping,
        };

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_lowercase(), v.to_string());
            }
        }

        let bytes = response.bytes().await.map_err(|e| Self::classify(&e))?;
        let slice = &bytes[..bytes.len().min(MAX_BODY_BYTES)];
        let body = String::from_utf8_lossy(slice).into_owned();

        Ok(FetchResponse {
            status,
            headers,
            body,
            final_url,
        })
    }
}
