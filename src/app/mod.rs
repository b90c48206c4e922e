//! Application wiring
//!
//! Builds the production probe set from configuration, runs the audit, and
//! hands the batch result to the report emitters. This is the only module
//! that knows concrete fetcher/renderer/prober types; everything below it
//! works against the capability traits.

pub mod config;

pub use config::Config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::model::{BatchResult, Target, VerdictStatus};
use crate::engine::AuditEngine;
use crate::error::AncileError;
use crate::http::{Fetcher, ReqwestFetcher};
use crate::input;
use crate::probe::transport::RustlsProber;
use crate::probe::ProbeSet;
use crate::render::{ChromeRenderer, HttpRenderer, Renderer};
use crate::reporting;

/// The audit application
pub struct App {
    config: Config,
    output_dir: PathBuf,
}

impl App {
    pub fn new(config: Config, output_dir: PathBuf) -> Self {
        Self { config, output_dir }
    }

    /// Audit every target in the input CSV and emit reports.
    pub async fn run_batch(&self, input_path: &Path) -> Result<BatchResult, AncileError> {
        let list = input::load_targets(input_path)?;
        self.audit(list.targets).await
    }

    /// Audit a single URL, bypassing the input file.
    pub async fn run_single(&self, raw_url: &str) -> Result<BatchResult, AncileError> {
        let url = input::normalize_url(raw_url)
            .map_err(crate::error::InputError::InvalidTarget)?;
        self.audit(vec![Target::new(url)]).await
    }

    async fn audit(&self, targets: Vec<Target>) -> Result<BatchResult, AncileError> {
        let engine = self.build_engine()?;

        // Periodic progress line for long batches; stops with the batch.
        let progress = engine.progress();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
            interval.tick().await;
            loop {
                interval.tick().await;
                let snapshot = progress.snapshot();
                tracing::info!(
                    recorded = snapshot.recorded,
                    probing = snapshot.probing,
                    total = snapshot.total,
                    "batch progress"
                );
            }
        });

        let result = engine.run(targets).await;
        ticker.abort();

        let written = reporting::write_reports(&result, &self.output_dir, &self.config.reporting)?;
        for path in &written {
            println!("Report written: {}", path.display());
        }

        Ok(result)
    }

    fn build_engine(&self) -> Result<AuditEngine, AncileError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            ReqwestFetcher::new(&self.config.scanner)
                .map_err(|e| AncileError::Client(e.to_string()))?,
        );

        // A configured but unavailable chrome renderer is fatal up front,
        // not a per-target surprise halfway through the batch.
        let renderer: Arc<dyn Renderer> = match self.config.scanner.renderer.as_str() {
            "chrome" => Arc::new(
                ChromeRenderer::new(&self.config.scanner.user_agent)
                    .map_err(|e| AncileError::Renderer(e.to_string()))?,
            ),
            _ => Arc::new(HttpRenderer::new(Arc::clone(&fetcher))),
        };

        let probes = ProbeSet::new(
            fetcher,
            renderer,
            Arc::new(RustlsProber),
            &self.config.scanner,
            &self.config.policy,
        );

        Ok(AuditEngine::new(probes, self.config.clone()))
    }

    /// Console summary after the batch, one line per target plus totals.
    pub fn print_summary(&self, result: &BatchResult) {
        println!();
        println!("Audit complete ({} targets, {}s)", result.records.len(), result.duration_secs());
        println!();

        for record in &result.records {
            let marker = match record.overall() {
                VerdictStatus::Passed => "PASS",
                VerdictStatus::Failed => "FAIL",
                VerdictStatus::Indeterminate => "????",
            };
            let failed_codes: Vec<&str> = record
                .verdicts
                .iter()
                .filter(|v| v.status == VerdictStatus::Failed)
                .map(|v| v.code.as_str())
                .collect();

            if failed_codes.is_empty() {
                println!("  [{}] {}", marker, record.target.display_name);
            } else {
                println!(
                    "  [{}] {} ({})",
                    marker,
                    record.target.display_name,
                    failed_codes.join(", ")
                );
            }
        }

        println!();
        println!(
            "Fully compliant: {}/{}",
            result.summary.fully_compliant_targets, result.summary.total_targets
        );
        if result.summary.targets_with_probe_errors > 0 {
            println!(
                "Targets with probe errors: {}",
                result.summary.targets_with_probe_errors
            );
        }
    }
}
