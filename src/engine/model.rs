//! Audit data model
//!
//! Records are immutable once produced: a verdict is never retracted or
//! overwritten, and the batch result is the sole handoff to report emitters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProbeError;

/// Priority of a target within the batch. Informational only; scheduling is
/// strictly input-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Accepts English names and the legacy Japanese single-character forms.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "高" => Priority::High,
            "low" | "低" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// One website under audit. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Normalized absolute HTTPS/HTTP URL (identity)
    pub url: String,

    /// Display name; defaults to the host when the input leaves it blank
    pub display_name: String,

    /// Batch priority
    pub priority: Priority,

    /// Free-form operator notes
    pub notes: String,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        let mut target = Self {
            url: url.into(),
            display_name: String::new(),
            priority: Priority::default(),
            notes: String::new(),
        };
        target.display_name = target.host();
        target
    }

    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Enumerated compliance codes. Each code has exactly one owning rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComplianceCode {
    #[serde(rename = "S1-1")]
    S1_1,
    #[serde(rename = "S1-2")]
    S1_2,
    #[serde(rename = "S2")]
    S2,
    #[serde(rename = "S3")]
    S3,
    #[serde(rename = "S4")]
    S4,
    #[serde(rename = "S6-1")]
    S6_1,
    #[serde(rename = "S6-2")]
    S6_2,
    #[serde(rename = "S6-3")]
    S6_3,
    #[serde(rename = "S7")]
    S7,
    #[serde(rename = "S8-1")]
    S8_1,
    #[serde(rename = "S8-2")]
    S8_2,
    #[serde(rename = "S8-3")]
    S8_3,
}

impl ComplianceCode {
    pub const ALL: &'static [ComplianceCode] = &[
        ComplianceCode::S1_1,
        ComplianceCode::S1_2,
        ComplianceCode::S2,
        ComplianceCode::S3,
        ComplianceCode::S4,
        ComplianceCode::S6_1,
        ComplianceCode::S6_2,
        ComplianceCode::S6_3,
        ComplianceCode::S7,
        ComplianceCode::S8_1,
        ComplianceCode::S8_2,
        ComplianceCode::S8_3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceCode::S1_1 => "S1-1",
            ComplianceCode::S1_2 => "S1-2",
            ComplianceCode::S2 => "S2",
            ComplianceCode::S3 => "S3",
            ComplianceCode::S4 => "S4",
            ComplianceCode::S6_1 => "S6-1",
            ComplianceCode::S6_2 => "S6-2",
            ComplianceCode::S6_3 => "S6-3",
            ComplianceCode::S7 => "S7",
            ComplianceCode::S8_1 => "S8-1",
            ComplianceCode::S8_2 => "S8-2",
            ComplianceCode::S8_3 => "S8-3",
        }
    }
}

impl fmt::Display for ComplianceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict state for one (target, code) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Passed,
    Failed,
    /// The dependent probe could not produce a reliable finding
    Indeterminate,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Passed => "passed",
            VerdictStatus::Failed => "failed",
            VerdictStatus::Indeterminate => "indeterminate",
        }
    }

    /// Matrix cell rendering: 1 / 0 / "-"
    pub fn matrix_cell(&self) -> &'static str {
        match self {
            VerdictStatus::Passed => "1",
            VerdictStatus::Failed => "0",
            VerdictStatus::Indeterminate => "-",
        }
    }
}

/// Deterministic evaluation of one compliance code against one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub code: ComplianceCode,
    pub status: VerdictStatus,
    /// What the verdict was based on; the probe error for indeterminate
    pub evidence: String,
}

impl ComplianceVerdict {
    pub fn passed(code: ComplianceCode, evidence: impl Into<String>) -> Self {
        Self {
            code,
            status: VerdictStatus::Passed,
            evidence: evidence.into(),
        }
    }

    pub fn failed(code: ComplianceCode, evidence: impl Into<String>) -> Self {
        Self {
            code,
            status: VerdictStatus::Failed,
            evidence: evidence.into(),
        }
    }

    pub fn indeterminate(code: ComplianceCode, error: &ProbeError) -> Self {
        Self {
            code,
            status: VerdictStatus::Indeterminate,
            evidence: error.to_string(),
        }
    }
}

/// All verdicts for one target, finalized once its probes complete or time out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAuditRecord {
    pub target: Target,
    /// One verdict per defined compliance code, in code order
    pub verdicts: Vec<ComplianceVerdict>,
    /// Probe errors in probe order, for the error section of reports
    pub probe_errors: Vec<ProbeError>,
    /// Wall-clock time spent on this target in milliseconds
    pub duration_ms: u64,
}

impl TargetAuditRecord {
    pub fn verdict(&self, code: ComplianceCode) -> Option<&ComplianceVerdict> {
        self.verdicts.iter().find(|v| v.code == code)
    }

    /// Worst-of rollup across the target's verdicts
    pub fn overall(&self) -> VerdictStatus {
        if self
            .verdicts
            .iter()
            .any(|v| v.status == VerdictStatus::Failed)
        {
            VerdictStatus::Failed
        } else if self
            .verdicts
            .iter()
            .any(|v| v.status == VerdictStatus::Indeterminate)
        {
            VerdictStatus::Indeterminate
        } else {
            VerdictStatus::Passed
        }
    }
}

/// Per-code tally across the batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeSummary {
    pub passed: usize,
    pub failed: usize,
    pub indeterminate: usize,
    /// passed / (passed + failed); indeterminate targets are excluded
    pub compliance_rate: f64,
}

/// Batch-level statistics, derived by the aggregator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_targets: usize,
    pub fully_compliant_targets: usize,
    pub targets_with_probe_errors: usize,
    pub by_code: BTreeMap<ComplianceCode, CodeSummary>,
}

/// The engine's final output; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Records in input order, one per target, always
    pub records: Vec<TargetAuditRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Policy revision the batch was evaluated against
    pub policy_version: String,
    pub summary: BatchSummary,
}

impl BatchResult {
    pub fn duration_secs(&self) -> i64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_seconds()
    }
}

/// Pure reduction of per-target records into batch statistics
pub fn summarize(records: &[TargetAuditRecord]) -> BatchSummary {
    let mut by_code: BTreeMap<ComplianceCode, CodeSummary> = BTreeMap::new();

    for record in records {
        for verdict in &record.verdicts {
            let entry = by_code.entry(verdict.code).or_default();
            match verdict.status {
                VerdictStatus::Passed => entry.passed += 1,
                VerdictStatus::Failed => entry.failed += 1,
                VerdictStatus::Indeterminate => entry.indeterminate += 1,
            }
        }
    }

    for summary in by_code.values_mut() {
        let determined = summary.passed + summary.failed;
        summary.compliance_rate = if determined == 0 {
            0.0
        } else {
            summary.passed as f64 / determined as f64
        };
    }

    BatchSummary {
        total_targets: records.len(),
        fully_compliant_targets: records
            .iter()
            .filter(|r| r.overall() == VerdictStatus::Passed)
            .count(),
        targets_with_probe_errors: records.iter().filter(|r| !r.probe_errors.is_empty()).count(),
        by_code,
    }
}
