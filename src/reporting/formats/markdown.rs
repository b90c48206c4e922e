//! Markdown report format
//!
//! The human-readable narrative: batch summary, per-code statistics, then a
//! section per target with its verdicts, probe errors, and remediation
//! advice for whatever failed.

use std::fmt::Write;

use crate::engine::model::{BatchResult, ComplianceCode, TargetAuditRecord, VerdictStatus};
use crate::error::ReportError;

pub fn render(result: &BatchResult) -> Result<String, ReportError> {
    let mut out = String::new();

    let render_err = |e: std::fmt::Error| ReportError::RenderError {
        format: "markdown".to_string(),
        reason: e.to_string(),
    };

    writeln!(out, "# Website Compliance Audit Report\n").map_err(render_err)?;
    writeln!(out, "- Policy version: {}", result.policy_version).map_err(render_err)?;
    writeln!(
        out,
        "- Started: {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
    .map_err(render_err)?;
    writeln!(
        out,
        "- Finished: {} ({}s)",
        result.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        result.duration_secs()
    )
    .map_err(render_err)?;
    writeln!(out, "- Targets audited: {}", result.summary.total_targets).map_err(render_err)?;
    writeln!(
        out,
        "- Fully compliant: {}",
        result.summary.fully_compliant_targets
    )
    .map_err(render_err)?;
    if result.summary.targets_with_probe_errors > 0 {
        writeln!(
            out,
            "- Targets with probe errors: {}",
            result.summary.targets_with_probe_errors
        )
        .map_err(render_err)?;
    }

    writeln!(out, "\n## Compliance by code\n").map_err(render_err)?;
    writeln!(out, "| Code | Passed | Failed | Indeterminate | Rate |").map_err(render_err)?;
    writeln!(out, "|------|--------|--------|---------------|------|").map_err(render_err)?;
    for (code, summary) in &result.summary.by_code {
        writeln!(
            out,
            "| {} | {} | {} | {} | {:.0}% |",
            code,
            summary.passed,
            summary.failed,
            summary.indeterminate,
            summary.compliance_rate * 100.0
        )
        .map_err(render_err)?;
    }

    for record in &result.records {
        render_target(&mut out, record).map_err(render_err)?;
    }

    Ok(out)
}

fn render_target(out: &mut String, record: &TargetAuditRecord) -> Result<(), std::fmt::Error> {
    writeln!(out, "\n## {}\n", record.target.display_name)?;
    writeln!(out, "- URL: {}", record.target.url)?;
    writeln!(out, "- Priority: {}", record.target.priority.as_str())?;
    writeln!(out, "- Overall: **{}**", record.overall().as_str())?;
    writeln!(out, "- Audit time: {}ms", record.duration_ms)?;
    if !record.target.notes.is_empty() {
        writeln!(out, "- Notes: {}", record.target.notes)?;
    }

    writeln!(out, "\n| Code | Status | Evidence |")?;
    writeln!(out, "|------|--------|----------|")?;
    for verdict in &record.verdicts {
        writeln!(
            out,
            "| {} | {} | {} |",
            verdict.code,
            verdict.status.as_str(),
            verdict.evidence.replace('|', "\\|").replace('\n', " ")
        )?;
    }

    if !record.probe_errors.is_empty() {
        writeln!(out, "\n### Probe errors\n")?;
        for error in &record.probe_errors {
            writeln!(out, "- {}", error)?;
        }
    }

    let failed: Vec<ComplianceCode> = record
        .verdicts
        .iter()
        .filter(|v| v.status == VerdictStatus::Failed)
        .map(|v| v.code)
        .collect();
    if !failed.is_empty() {
        writeln!(out, "\n### Recommendations\n")?;
        for code in failed {
            writeln!(out, "- **{}**: {}", code, recommendation(code))?;
        }
    }

    Ok(())
}

fn recommendation(code: ComplianceCode) -> &'static str {
    match code {
        ComplianceCode::S1_1 | ComplianceCode::S1_2 => {
            "Upgrade jQuery to a currently supported release and pin the version in the asset URL."
        }
        ComplianceCode::S2 => {
            "Close port 80 or configure the web server to redirect all plaintext requests to HTTPS."
        }
        ComplianceCode::S3 => "Enable TLS 1.3 in the web server or load balancer configuration.",
        ComplianceCode::S4 => {
            "Disable TLS 1.0 and 1.1; clients that still need them are themselves out of support."
        }
        ComplianceCode::S6_1 => {
            "Disable directory indexing (e.g. `Options -Indexes` or `autoindex off`)."
        }
        ComplianceCode::S6_2 => {
            "Move administrative login pages behind access restrictions or a VPN."
        }
        ComplianceCode::S6_3 => {
            "Remove credential and backup files from the document root and rotate any exposed secrets."
        }
        ComplianceCode::S7 => {
            "Block direct access to sensitive paths and strip version details from the Server header."
        }
        ComplianceCode::S8_1 => "Send `X-Frame-Options: DENY` or `SAMEORIGIN` on every response.",
        ComplianceCode::S8_2 => {
            "Send `Strict-Transport-Security` with a max-age of at least one year."
        }
        ComplianceCode::S8_3 => {
            "Define a Content-Security-Policy; start with `default-src 'self'` and extend as needed."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::tests::sample_result;

    #[test]
    fn narrative_covers_summary_and_targets() {
        let md = render(&sample_result()).unwrap();

        assert!(md.contains("# Website Compliance Audit Report"));
        assert!(md.contains("## Compliance by code"));
        assert!(md.contains("## example.com"));
        assert!(md.contains("| S2 | failed |"));
    }

    #[test]
    fn failed_codes_get_recommendations() {
        let md = render(&sample_result()).unwrap();
        assert!(md.contains("### Recommendations"));
        assert!(md.contains("**S2**"));
        // passing codes get none
        assert!(!md.contains("**S3**:"));
    }
}
