//! Target list input
//!
//! Loads the batch target list from a CSV file with a `url,site_name,
//! priority,notes` header. Rows that fail validation are reported with
//! their line number and skipped; the load only fails outright when the
//! file is missing, unreadable, or yields no valid target at all.
//!
//! The parser handles quoted fields with embedded commas and doubled
//! quotes, which is as much CSV as audit sheets exported from office tools
//! actually use.

use std::path::Path;

use crate::engine::model::{Priority, Target};
use crate::error::InputError;

/// A row the loader rejected, with why and where
#[derive(Debug, Clone)]
pub struct RejectedRow {
    pub line: usize,
    pub reason: String,
}

/// Outcome of loading a target list
#[derive(Debug)]
pub struct TargetList {
    pub targets: Vec<Target>,
    pub rejected: Vec<RejectedRow>,
}

/// Load and validate targets from a CSV file.
pub fn load_targets(path: &Path) -> Result<TargetList, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| InputError::ReadError(format!("{}: {}", path.display(), e)))?;

    if content.trim().is_empty() {
        return Err(InputError::Empty(path.display().to_string()));
    }

    let list = parse_targets(&content);

    for rejected in &list.rejected {
        tracing::warn!(line = rejected.line, reason = %rejected.reason, "skipping input row");
    }

    if list.targets.is_empty() {
        return Err(InputError::NoValidTargets);
    }

    tracing::info!(
        targets = list.targets.len(),
        rejected = list.rejected.len(),
        path = %path.display(),
        "loaded target list"
    );

    Ok(list)
}

/// Parse CSV content into targets. Line numbers are 1-based and count the
/// header.
pub fn parse_targets(content: &str) -> TargetList {
    let mut targets = Vec::new();
    let mut rejected = Vec::new();
    let mut seen_urls: Vec<String> = Vec::new();
    let mut before_first_row = true;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields = split_csv_row(trimmed);

        // Header row, with or without the optional columns; recognized on
        // the first content line wherever blank or comment lines sit above
        // it.
        let is_first_row = before_first_row;
        before_first_row = false;
        if is_first_row && fields.first().map(|f| f.eq_ignore_ascii_case("url")).unwrap_or(false) {
            continue;
        }

        let raw_url = match fields.first() {
            Some(url) if !url.is_empty() => url.clone(),
            _ => {
                rejected.push(RejectedRow {
                    line: line_no,
                    reason: "empty URL field".to_string(),
                });
                continue;
            }
        };

        let url = match normalize_url(&raw_url) {
            Ok(url) => url,
            Err(reason) => {
                rejected.push(RejectedRow {
                    line: line_no,
                    reason,
                });
                continue;
            }
        };

        if seen_urls.contains(&url) {
            rejected.push(RejectedRow {
                line: line_no,
                reason: format!("duplicate target {}", url),
            });
            continue;
        }
        seen_urls.push(url.clone());

        let mut target = Target::new(url);
        if let Some(name) = fields.get(1).filter(|n| !n.is_empty()) {
            target.display_name = name.clone();
        }
        if let Some(priority) = fields.get(2).filter(|p| !p.is_empty()) {
            target.priority = Priority::parse(priority);
        }
        if let Some(notes) = fields.get(3) {
            target.notes = notes.clone();
        }

        targets.push(target);
    }

    TargetList { targets, rejected }
}

/// Bare hostnames get an https:// scheme; anything that still fails to
/// parse as an absolute http(s) URL is rejected. Also used for the single
/// `--target` form of the CLI.
pub fn normalize_url(raw: &str) -> Result<String, String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let parsed =
        url::Url::parse(&candidate).map_err(|e| format!("invalid URL {:?}: {}", raw, e))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {:?} in {:?}", other, raw)),
    }

    if parsed.host_str().is_none() {
        return Err(format!("URL {:?} has no host", raw));
    }

    Ok(parsed.to_string())
}

fn split_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                // doubled quote inside a quoted field is a literal quote
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field = String::new();
            }
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}
