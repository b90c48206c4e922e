//! Probe set
//!
//! Four independent, stateless probes, each examining one compliance
//! dimension of a single target. A probe is a function of a target plus a
//! time budget; it never shares mutable state with other probes and every
//! failure mode is converted into a classified `ProbeError` at this boundary.

pub mod component;
pub mod exposure;
pub mod headers;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::app::config::{PolicyConfig, ScannerConfig};
use crate::engine::model::Target;
use crate::error::ProbeError;
use crate::http::Fetcher;
use crate::render::Renderer;

pub use component::ComponentFindings;
pub use exposure::ExposureFindings;
pub use headers::HeaderFindings;
pub use transport::TransportFindings;

/// Probe identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Transport,
    Component,
    Exposure,
    Headers,
}

impl ProbeKind {
    pub const ALL: &'static [ProbeKind] = &[
        ProbeKind::Transport,
        ProbeKind::Component,
        ProbeKind::Exposure,
        ProbeKind::Headers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Transport => "transport",
            ProbeKind::Component => "component",
            ProbeKind::Exposure => "exposure",
            ProbeKind::Headers => "headers",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw findings, probe-specific
#[derive(Debug, Clone)]
pub enum ProbeFindings {
    Transport(TransportFindings),
    Component(ComponentFindings),
    Exposure(ExposureFindings),
    Headers(HeaderFindings),
}

/// One probe invocation against one target. Immutable after creation; owned
/// by the evaluator step that consumes it.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub kind: ProbeKind,
    pub findings: Option<ProbeFindings>,
    pub error: Option<ProbeError>,
    pub duration_ms: u64,
}

impl ProbeResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.findings.is_some()
    }

    pub fn failed(kind: ProbeKind, error: ProbeError, duration_ms: u64) -> Self {
        Self {
            kind,
            findings: None,
            error: Some(error),
            duration_ms,
        }
    }
}

/// Retry a probe body while it reports transient errors, with exponential
/// backoff. Definitive protocol outcomes are returned on the first attempt.
pub async fn with_retries<F, Fut, T>(
    attempts: u32,
    base_backoff: Duration,
    mut body: F,
) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProbeError>>,
{
    let mut backoff = base_backoff;
    let mut tries = 0u32;

    loop {
        match body().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && tries < attempts => {
                tries += 1;
                tracing::debug!(error = %err, attempt = tries, "transient probe error, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}

/// The full probe set, wired with its capability dependencies
pub struct ProbeSet {
    transport: transport::TransportProbe,
    component: component::ComponentProbe,
    exposure: exposure::ExposureProbe,
    headers: headers::HeaderProbe,
    retry_count: u32,
    retry_backoff: Duration,
}

impl ProbeSet {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        tls: Arc<dyn transport::TlsProber>,
        scanner: &ScannerConfig,
        policy: &PolicyConfig,
    ) -> Self {
        Self {
            transport: transport::TransportProbe::new(
                Arc::clone(&fetcher),
                tls,
                scanner.request_budget(),
            ),
            component: component::ComponentProbe::new(
                Arc::clone(&fetcher),
                Arc::clone(&renderer),
                scanner.probe_budget(),
            ),
            exposure: exposure::ExposureProbe::new(Arc::clone(&fetcher), renderer, policy, scanner.probe_budget()),
            headers: headers::HeaderProbe::new(fetcher),
            retry_count: scanner.retry_count,
            retry_backoff: scanner.retry_backoff(),
        }
    }

    /// Run one probe against one target, converting every failure into a
    /// failed `ProbeResult`.
    pub async fn run(&self, kind: ProbeKind, target: &Target) -> ProbeResult {
        let start = Instant::now();

        let outcome = with_retries(self.retry_count, self.retry_backoff, || async {
            match kind {
                ProbeKind::Transport => self
                    .transport
                    .probe(target)
                    .await
                    .map(ProbeFindings::Transport),
                ProbeKind::Component => self
                    .component
                    .probe(target)
                    .await
                    .map(ProbeFindings::Component),
                ProbeKind::Exposure => self
                    .exposure
                    .probe(target)
                    .await
                    .map(ProbeFindings::Exposure),
                ProbeKind::Headers => {
                    self.headers.probe(target).await.map(ProbeFindings::Headers)
                }
            }
        })
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(findings) => ProbeResult {
                kind,
                findings: Some(findings),
                error: None,
                duration_ms,
            },
            Err(error) => {
                tracing::warn!(probe = %kind, url = %target.url, error = %error, "probe failed");
                ProbeResult::failed(kind, error, duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProbeError::network("reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_definitive_outcomes() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProbeError::protocol_rejected("handshake alert")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProbeError::timeout("deadline")) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
