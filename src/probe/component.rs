//! Component probe
//!
//! Renders the target page, collects the script URLs it loads, and works out
//! whether jQuery is present and at which version. Version strings are read
//! leniently ("3.5", "v3.5.1", "3.5.1-rc1" all parse) and padded to a full
//! x.y.z for ordering. Absence of jQuery is a valid finding, not an error.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::engine::model::Target;
use crate::error::ProbeError;
use crate::http::{Fetcher, RedirectMode};
use crate::render::Renderer;

/// A library version parsed leniently from a URL or source banner. Keeps the
/// raw text for evidence while comparisons happen on the padded semver form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryVersion {
    pub raw: String,
    pub parsed: semver::Version,
}

impl LibraryVersion {
    /// Accepts "3.5.1", "v3.5", "3.5.1-rc1", "3"; anything shorter than
    /// x.y.z is padded with zeros.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_start_matches(['v', 'V']);
        if trimmed.is_empty() || !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        // Split off any pre-release suffix before padding
        let (numeric, suffix) = match trimmed.find(['-', '+']) {
            Some(idx) => trimmed.split_at(idx),
            None => (trimmed, ""),
        };

        let mut parts: Vec<&str> = numeric.split('.').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
            return None;
        }
        while parts.len() < 3 {
            parts.push("0");
        }

        let padded = format!("{}.{}.{}{}", parts[0], parts[1], parts[2], suffix);
        let parsed = semver::Version::parse(&padded).ok()?;

        Some(Self {
            raw: raw.trim().to_string(),
            parsed,
        })
    }

    pub fn at_least(&self, minimum: &semver::Version) -> bool {
        self.parsed >= *minimum
    }
}

impl std::fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Where and how jQuery was identified on the page
#[derive(Debug, Clone)]
pub struct JqueryDetection {
    /// `None` when jQuery is present but the version cannot be identified
    pub version: Option<LibraryVersion>,
    /// Script URL the detection came from
    pub source: String,
}

/// Raw findings of the component probe
#[derive(Debug, Clone)]
pub struct ComponentFindings {
    pub jquery: Option<JqueryDetection>,
    pub script_urls: Vec<String>,
}

fn url_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // jquery-3.5.1.min.js, jquery.3.5.1.js
        Regex::new(r"(?i)jquery[-.](\d+(?:\.\d+){0,2})").unwrap()
    })
}

fn query_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // jquery.min.js?ver=3.5.1 (WordPress style)
        Regex::new(r"(?i)[?&](?:ver|version|v)=(\d+(?:\.\d+){0,2})").unwrap()
    })
}

fn banner_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "jQuery v3.5.1" header comment or jquery:"3.5.1" in the source
        Regex::new(r#"(?i)jQuery(?: JavaScript Library)? v(\d+(?:\.\d+){0,2}(?:-[0-9A-Za-z.]+)?)|jquery["']?\s*[:=]\s*["'](\d+(?:\.\d+){0,2})"#).unwrap()
    })
}

fn is_jquery_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    file.contains("jquery") && !file.contains("jquery-ui") && !file.contains("jquery.ui")
}

/// The component probe
pub struct ComponentProbe {
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    budget: Duration,
}

impl ComponentProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>, renderer: Arc<dyn Renderer>, budget: Duration) -> Self {
        Self {
            fetcher,
            renderer,
            budget,
        }
    }

    pub async fn probe(&self, target: &Target) -> Result<ComponentFindings, ProbeError> {
        let page = self.renderer.render(&target.url, self.budget).await?;

        let mut detection: Option<JqueryDetection> = None;

        for url in &page.script_urls {
            if !is_jquery_url(url) {
                continue;
            }

            if let Some(version) = Self::version_from_url(url) {
                detection = Some(JqueryDetection {
                    version: Some(version),
                    source: url.clone(),
                });
                break;
            }

            // jQuery-looking script with no version in its URL: read the
            // source banner.
            let from_body = self.version_from_source(url).await;
            let found_version = from_body.is_some();
            detection = Some(JqueryDetection {
                version: from_body,
                source: url.clone(),
            });
            if found_version {
                break;
            }
        }

        // The page may bundle jQuery without a telltale filename; the DOM
        // banner check catches inline and concatenated builds.
        if detection.is_none() {
            if let Some(version) = Self::version_from_text(&page.dom) {
                detection = Some(JqueryDetection {
                    version: Some(version),
                    source: page.final_url.clone(),
                });
            }
        }

        Ok(ComponentFindings {
            jquery: detection,
            script_urls: page.script_urls,
        })
    }

    fn version_from_url(url: &str) -> Option<LibraryVersion> {
        if let Some(caps) = url_version_re().captures(url) {
            if let Some(version) = LibraryVersion::parse(&caps[1]) {
                return Some(version);
            }
        }
        if let Some(caps) = query_version_re().captures(url) {
            return LibraryVersion::parse(&caps[1]);
        }
        None
    }

    fn version_from_text(text: &str) -> Option<LibraryVersion> {
        let caps = banner_version_re().captures(text)?;
        let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
        LibraryVersion::parse(raw)
    }

    async fn version_from_source(&self, url: &str) -> Option<LibraryVersion> {
        match self.fetcher.fetch(url, RedirectMode::Follow).await {
            Ok(response) if response.status < 400 => Self::version_from_text(&response.body),
            Ok(_) | Err(_) => None,
        }
    }
}
