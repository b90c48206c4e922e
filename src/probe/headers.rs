//! Header probe
//!
//! One GET against the target, following redirects, capturing the response
//! headers of the final hop. Evaluation of individual headers lives in the
//! rule table; this probe only collects.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::model::Target;
use crate::error::ProbeError;
use crate::http::{Fetcher, RedirectMode};

/// Raw findings of the header probe. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct HeaderFindings {
    pub status: u16,
    pub final_url: String,
    pub headers: BTreeMap<String, String>,
}

impl HeaderFindings {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// The header probe
pub struct HeaderProbe {
    fetcher: Arc<dyn Fetcher>,
}

impl HeaderProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn probe(&self, target: &Target) -> Result<HeaderFindings, ProbeError> {
        let response = self.fetcher.fetch(&target.url, RedirectMode::Follow).await?;

        Ok(HeaderFindings {
            status: response.status,
            final_url: response.final_url.clone(),
            headers: response
                .headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetcher;

    #[tokio::test]
    async fn captures_final_hop_headers() {
        let url = "https://example.com/";
        let fetcher = FakeFetcher::new().with(
            url,
            FakeFetcher::respond(
                200,
                &[
                    ("X-Frame-Options", "DENY"),
                    ("Strict-Transport-Security", "max-age=31536000"),
                ],
                "<html></html>",
                url,
            ),
        );

        let findings = HeaderProbe::new(Arc::new(fetcher))
            .probe(&Target::new(url))
            .await
            .unwrap();

        assert_eq!(findings.status, 200);
        assert_eq!(findings.header("x-frame-options"), Some("DENY"));
        assert_eq!(findings.header("X-Frame-Options"), Some("DENY"));
        assert!(findings.header("content-security-policy").is_none());
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let err = HeaderProbe::new(Arc::new(FakeFetcher::new()))
            .probe(&Target::new("https://down.example.com/"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
