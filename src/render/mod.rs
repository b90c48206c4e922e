//! Page renderer capability
//!
//! The engine asks a renderer for "final DOM text plus the list of loaded
//! script resource URLs". Two implementations: a plain HTTP fetch with markup
//! extraction, and a headless Chrome wrapper for JavaScript-heavy targets.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ProbeError;
use crate::http::{Fetcher, RedirectMode};

/// A rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL after redirects
    pub final_url: String,
    /// Final DOM text
    pub dom: String,
    /// Absolute URLs of script resources referenced by the page
    pub script_urls: Vec<String>,
}

/// Capability interface for page rendering
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, ProbeError>;
}

fn script_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<script[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap())
}

/// Extract script resource URLs from markup, resolved against the page URL
pub fn extract_script_urls(base_url: &str, html: &str) -> Vec<String> {
    let base = match url::Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    let mut urls = Vec::new();
    for caps in script_src_regex().captures_iter(html) {
        if let Some(src) = caps.get(1) {
            if let Ok(resolved) = base.join(src.as_str()) {
                let resolved = resolved.to_string();
                if !urls.contains(&resolved) {
                    urls.push(resolved);
                }
            }
        }
    }
    urls
}

/// Renderer that fetches markup over HTTP and extracts script references.
/// Suits server-rendered pages; script URLs injected at runtime are missed.
pub struct HttpRenderer {
    fetcher: Arc<dyn Fetcher>,
}

impl HttpRenderer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, ProbeError> {
        let response = tokio::time::timeout(timeout, self.fetcher.fetch(url, RedirectMode::Follow))
            .await
            .map_err(|_| ProbeError::timeout(format!("render of {} timed out", url)))??;

        let script_urls = extract_script_urls(&response.final_url, &response.body);

        Ok(RenderedPage {
            final_url: response.final_url,
            dom: response.body,
            script_urls,
        })
    }
}

/// Renderer backed by a headless Chrome/Chromium binary (`--dump-dom`)
pub struct ChromeRenderer {
    chrome: PathBuf,
    user_agent: String,
}

impl ChromeRenderer {
    pub fn new(user_agent: &str) -> Result<Self, ProbeError> {
        let chrome = find_chrome().ok_or_else(|| {
            ProbeError::network("no Chrome/Chromium binary found (set CHROME_PATH)")
        })?;

        Ok(Self {
            chrome,
            user_agent: user_agent.to_string(),
        })
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, ProbeError> {
        let mut command = tokio::process::Command::new(&self.chrome);
        command
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--dump-dom")
            .arg(format!("--user-agent={}", self.user_agent))
            .arg(format!(
                "--virtual-time-budget={}",
                timeout.as_millis().min(30_000)
            ))
            .arg(url)
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| ProbeError::timeout(format!("chrome render of {} timed out", url)))?
            .map_err(|e| ProbeError::network(format!("failed to launch chrome: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::network(format!(
                "chrome exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let dom = String::from_utf8_lossy(&output.stdout).into_owned();
        if dom.trim().is_empty() {
            return Err(ProbeError::parse_failure("chrome produced an empty DOM"));
        }

        let script_urls = extract_script_urls(url, &dom);

        Ok(RenderedPage {
            final_url: url.to_string(),
            dom,
            script_urls,
        })
    }
}

/// Find a Chrome/Chromium binary, preferring the CHROME_PATH override
pub fn find_chrome() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let candidates = [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_script_urls() {
        let html = r#"
            <script src="/js/app.js"></script>
            <script type="text/javascript" src='https://cdn.example.net/jquery-3.5.1.min.js'></script>
            <script>inline()</script>
        "#;
        let urls = extract_script_urls("https://example.com/index.html", html);
        assert_eq!(
            urls,
            vec![
                "https://example.com/js/app.js".to_string(),
                "https://cdn.example.net/jquery-3.5.1.min.js".to_string(),
            ]
        );
    }

    #[test]
    fn duplicate_scripts_listed_once() {
        let html = r#"<script src="/a.js"></script><script src="/a.js"></script>"#;
        let urls = extract_script_urls("https://example.com/", html);
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn http_renderer_uses_fetcher_body() {
        use crate::http::fake::FakeFetcher;

        let fetcher = FakeFetcher::new().with(
            "https://example.com/",
            FakeFetcher::respond(
                200,
                &[],
                r#"<html><script src="/main.js"></script></html>"#,
                "https://example.com/",
            ),
        );

        let renderer = HttpRenderer::new(Arc::new(fetcher));
        let page = renderer
            .render("https://example.com/", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(page.script_urls, vec!["https://example.com/main.js"]);
        assert!(page.dom.contains("main.js"));
    }
}
