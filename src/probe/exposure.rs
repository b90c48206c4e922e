//! Exposure probe
//!
//! Looks for information-leak surfaces: directory listings, exposed login
//! forms, leaked credential material, reachable sensitive paths, and a
//! Server banner that discloses software versions. Signature lists and path
//! lists come from the policy configuration so deployments can extend them
//! without a rebuild.
//!
//! robots.txt is read for context only. A Disallow entry points at a path
//! the operator wants hidden, but listing it is not itself a failure; the
//! failure is the path answering 200 when requested directly.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::app::config::PolicyConfig;
use crate::engine::model::Target;
use crate::error::ProbeError;
use crate::http::{Fetcher, RedirectMode};
use crate::render::Renderer;

/// Signature category a page matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakCategory {
    DirectoryListing,
    LoginSurface,
    PasswordMaterial,
}

impl LeakCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeakCategory::DirectoryListing => "directory-listing",
            LeakCategory::LoginSurface => "login-surface",
            LeakCategory::PasswordMaterial => "password-material",
        }
    }
}

/// One signature match with where it was seen
#[derive(Debug, Clone)]
pub struct LeakHit {
    pub category: LeakCategory,
    pub signature: String,
    pub url: String,
}

/// A sensitive path that answered when requested directly
#[derive(Debug, Clone)]
pub struct AccessiblePath {
    pub path: String,
    pub status: u16,
}

/// Raw findings of the exposure probe
#[derive(Debug, Clone)]
pub struct ExposureFindings {
    /// Disallow entries from robots.txt, informational
    pub robots_disallows: Vec<String>,
    pub leak_hits: Vec<LeakHit>,
    pub accessible_paths: Vec<AccessiblePath>,
    /// Raw Server header of the landing page, if any
    pub server_banner: Option<String>,
    pub banner_discloses_version: bool,
}

impl ExposureFindings {
    pub fn hits_in(&self, category: LeakCategory) -> Vec<&LeakHit> {
        self.leak_hits
            .iter()
            .filter(|h| h.category == category)
            .collect()
    }
}

fn banner_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "nginx/1.18.0", "Apache/2.4.41 (Ubuntu)", "PHP/7.4.3"
    RE.get_or_init(|| Regex::new(r"[A-Za-z][\w.-]*/\d+(?:\.\d+)+").unwrap())
}

pub fn banner_discloses_version(banner: &str) -> bool {
    banner_version_re().is_match(banner)
}

/// The exposure probe
pub struct ExposureProbe {
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    directory_listing_signatures: Vec<String>,
    login_signatures: Vec<String>,
    password_signatures: Vec<String>,
    sensitive_paths: Vec<String>,
    budget: Duration,
}

impl ExposureProbe {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        policy: &PolicyConfig,
        budget: Duration,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            directory_listing_signatures: policy.directory_listing_signatures.clone(),
            login_signatures: policy.login_signatures.clone(),
            password_signatures: policy.password_signatures.clone(),
            sensitive_paths: policy.sensitive_paths.clone(),
            budget,
        }
    }

    pub async fn probe(&self, target: &Target) -> Result<ExposureFindings, ProbeError> {
        let base = url::Url::parse(&target.url)
            .map_err(|e| ProbeError::parse_failure(format!("invalid target URL: {}", e)))?;

        // The landing page must be reachable for the probe to say anything
        // useful; its failure is the probe's failure.
        let page = self.renderer.render(&target.url, self.budget).await?;

        let mut leak_hits = Vec::new();
        self.match_signatures(&page.dom, &page.final_url, &mut leak_hits);

        let robots_disallows = self.read_robots(&base).await;

        let mut accessible_paths = Vec::new();
        let mut server_banner = None;

        for path in &self.sensitive_paths {
            let probe_url = match base.join(path) {
                Ok(u) => u,
                Err(_) => continue,
            };
            match self.fetcher.fetch(probe_url.as_str(), RedirectMode::Stop).await {
                Ok(response) if response.status == 200 => {
                    self.match_signatures(&response.body, probe_url.as_str(), &mut leak_hits);
                    accessible_paths.push(AccessiblePath {
                        path: path.clone(),
                        status: response.status,
                    });
                }
                // A blocked or missing path is the desired state
                Ok(_) | Err(_) => {}
            }
        }

        // Server banner from a plain landing-page request; the rendered DOM
        // carries no headers.
        if let Ok(response) = self.fetcher.fetch(base.as_str(), RedirectMode::Follow).await {
            server_banner = response.header("server").map(|s| s.to_string());
        }

        let banner_discloses = server_banner
            .as_deref()
            .map(banner_discloses_version)
            .unwrap_or(false);

        Ok(ExposureFindings {
            robots_disallows,
            leak_hits,
            accessible_paths,
            server_banner,
            banner_discloses_version: banner_discloses,
        })
    }

    fn match_signatures(&self, body: &str, url: &str, hits: &mut Vec<LeakHit>) {
        let lowered = body.to_lowercase();
        let groups = [
            (LeakCategory::DirectoryListing, &self.directory_listing_signatures),
            (LeakCategory::LoginSurface, &self.login_signatures),
            (LeakCategory::PasswordMaterial, &self.password_signatures),
        ];

        for (category, signatures) in groups {
            for signature in signatures {
                if lowered.contains(&signature.to_lowercase()) {
                    let already = hits
                        .iter()
                        .any(|h| h.category == category && h.signature == *signature && h.url == url);
                    if !already {
                        hits.push(LeakHit {
                            category,
                            signature: signature.clone(),
                            url: url.to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn read_robots(&self, base: &url::Url) -> Vec<String> {
        let robots_url = match base.join("/robots.txt") {
            Ok(u) => u,
            Err(_) => return Vec::new(),
        };

        let response = match self.fetcher.fetch(robots_url.as_str(), RedirectMode::Stop).await {
            Ok(r) if r.status == 200 => r,
            _ => return Vec::new(),
        };

        response
            .body
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                let rest = line
                    .strip_prefix("Disallow:")
                    .or_else(|| line.strip_prefix("disallow:"))?;
                let value = rest.trim();
                (!value.is_empty()).then(|| value.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetcher;
    use crate::render::fake::FakeRenderer;

    fn policy() -> PolicyConfig {
        PolicyConfig::default()
    }

    fn probe(fetcher: FakeFetcher, renderer: FakeRenderer) -> ExposureProbe {
        ExposureProbe::new(
            Arc::new(fetcher),
            Arc::new(renderer),
            &policy(),
            Duration::from_secs(5),
        )
    }

    fn target() -> Target {
        Target::new("https://example.com/")
    }

    #[test]
    fn version_banner_detection() {
        assert!(banner_discloses_version("nginx/1.18.0"));
        assert!(banner_discloses_version("Apache/2.4.41 (Ubuntu)"));
        assert!(!banner_discloses_version("nginx"));
        assert!(!banner_discloses_version("cloudflare"));
    }

    #[tokio::test]
    async fn directory_listing_signature_on_landing_page() {
        let renderer = FakeRenderer::page(
            "https://example.com/",
            "<html><title>Index of /backup</title></html>",
            &[],
        );
        let findings = probe(FakeFetcher::new(), renderer)
            .probe(&target())
            .await
            .unwrap();

        let hits = findings.hits_in(LeakCategory::DirectoryListing);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com/");
    }

    #[tokio::test]
    async fn accessible_sensitive_path_recorded() {
        let env_url = "https://example.com/.env";
        let fetcher = FakeFetcher::new().with(
            env_url,
            FakeFetcher::respond(200, &[], "DB_PASSWORD=hunter2", env_url),
        );
        let renderer = FakeRenderer::page("https://example.com/", "<html></html>", &[]);

        let findings = probe(fetcher, renderer).probe(&target()).await.unwrap();
        assert_eq!(findings.accessible_paths.len(), 1);
        assert_eq!(findings.accessible_paths[0].path, "/.env");
    }

    #[tokio::test]
    async fn blocked_sensitive_paths_are_clean() {
        // FakeFetcher answers unknown URLs with a network error, which the
        // probe treats as the path being unreachable.
        let renderer = FakeRenderer::page("https://example.com/", "<html></html>", &[]);
        let findings = probe(FakeFetcher::new(), renderer)
            .probe(&target())
            .await
            .unwrap();
        assert!(findings.accessible_paths.is_empty());
    }

    #[tokio::test]
    async fn robots_disallows_are_informational() {
        let robots_url = "https://example.com/robots.txt";
        let fetcher = FakeFetcher::new().with(
            robots_url,
            FakeFetcher::respond(
                200,
                &[],
                "User-agent: *\nDisallow: /admin/\nDisallow: /secret/\n",
                robots_url,
            ),
        );
        let renderer = FakeRenderer::page("https://example.com/", "<html></html>", &[]);

        let findings = probe(fetcher, renderer).probe(&target()).await.unwrap();
        assert_eq!(findings.robots_disallows, vec!["/admin/", "/secret/"]);
        assert!(findings.leak_hits.is_empty());
    }

    #[tokio::test]
    async fn server_banner_captured_from_landing_request() {
        let landing = "https://example.com/";
        let fetcher = FakeFetcher::new().with(
            landing,
            FakeFetcher::respond(200, &[("Server", "Apache/2.4.41")], "<html></html>", landing),
        );
        let renderer = FakeRenderer::page(landing, "<html></html>", &[]);

        let findings = probe(fetcher, renderer).probe(&target()).await.unwrap();
        assert_eq!(findings.server_banner.as_deref(), Some("Apache/2.4.41"));
        assert!(findings.banner_discloses_version);
    }

    #[tokio::test]
    async fn render_failure_propagates() {
        let renderer = FakeRenderer::failing(ProbeError::network("refused"));
        let err = probe(FakeFetcher::new(), renderer)
            .probe(&target())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
