//! Custom error types for ancile
//!
//! Probe errors are classified by kind so the evaluator and reports can
//! distinguish "could not determine" from "determined non-compliant".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for ancile operations
#[derive(Error, Debug)]
pub enum AncileError {
    /// Target-input errors
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Report emission errors
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// HTTP client construction errors (engine-fatal)
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Renderer acquisition errors (engine-fatal)
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Target-input errors. These abort the run only when no usable target
/// survives; individual bad rows are reported and skipped.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input file not found: {0}")]
    NotFound(String),

    #[error("Input file is empty: {0}")]
    Empty(String),

    #[error("Input file contains no valid targets")]
    NoValidTargets,

    #[error("Failed to read input file: {0}")]
    ReadError(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

/// Report emission errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create results directory {path}: {reason}")]
    DirectoryError { path: String, reason: String },

    #[error("Failed to write report {path}: {reason}")]
    WriteError { path: String, reason: String },

    #[error("Failed to render {format} report: {reason}")]
    RenderError { format: String, reason: String },
}

/// Classification for probe-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeErrorKind {
    /// DNS failure, connection refused, connection reset
    Network,
    /// Probe or request exceeded its time budget
    Timeout,
    /// The remote end gave a definitive protocol-level refusal
    ProtocolRejected,
    /// A response was received but could not be interpreted
    ParseFailure,
}

impl ProbeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::Network => "network",
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::ProtocolRejected => "protocol-rejected",
            ProbeErrorKind::ParseFailure => "parse-failure",
        }
    }
}

/// A probe-level failure. Never escalates past the probe boundary; the
/// scheduler converts it into a failed `ProbeResult` and the evaluator into
/// indeterminate verdicts.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{} error: {message}", kind.as_str())]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Timeout, message)
    }

    pub fn protocol_rejected(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::ProtocolRejected, message)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::ParseFailure, message)
    }

    /// Transient errors are worth retrying with backoff; definitive protocol
    /// answers and parse failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ProbeErrorKind::Network | ProbeErrorKind::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProbeError::network("reset").is_transient());
        assert!(ProbeError::timeout("deadline").is_transient());
        assert!(!ProbeError::protocol_rejected("alert").is_transient());
        assert!(!ProbeError::parse_failure("bad header").is_transient());
    }

    #[test]
    fn probe_error_display_includes_kind() {
        let err = ProbeError::timeout("after 10s");
        assert_eq!(err.to_string(), "timeout error: after 10s");
    }
}
