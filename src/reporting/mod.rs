//! Report emission
//!
//! Pure renderers over the finished `BatchResult`, one per output format,
//! plus the writer that lays the rendered reports down in the results
//! directory. Emitters never mutate the batch result and never perform
//! network I/O.

pub mod formats;

use std::path::{Path, PathBuf};

use crate::app::config::ReportingConfig;
use crate::engine::model::BatchResult;
use crate::error::ReportError;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Markdown => "md",
        }
    }
}

/// Render one report in the requested format.
pub fn render(format: ReportFormat, result: &BatchResult) -> Result<String, ReportError> {
    match format {
        ReportFormat::Json => formats::json::render(result),
        ReportFormat::Csv => formats::csv::render(result),
        ReportFormat::Markdown => formats::markdown::render(result),
    }
}

/// Write every configured report format into `dir`, returning the written
/// paths. A missing results directory is created first; failure to do so is
/// fatal to emission as a whole.
pub fn write_reports(
    result: &BatchResult,
    dir: &Path,
    config: &ReportingConfig,
) -> Result<Vec<PathBuf>, ReportError> {
    std::fs::create_dir_all(dir).map_err(|e| ReportError::DirectoryError {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let stamp = result.finished_at.format("%Y%m%d-%H%M%S");
    let mut written = Vec::new();

    for name in &config.formats {
        let format = match ReportFormat::parse(name) {
            Some(f) => f,
            None => {
                tracing::warn!(format = %name, "unknown report format, skipping");
                continue;
            }
        };

        let rendered = render(format, result)?;
        let path = dir.join(format!(
            "{}-{}.{}",
            config.basename,
            stamp,
            format.extension()
        ));

        std::fs::write(&path, rendered).map_err(|e| ReportError::WriteError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), "report written");
        written.push(path);
    }

    Ok(written)
}

/// Escape a value for a CSV cell.
pub(crate) fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
