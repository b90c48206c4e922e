//! JSON report format
//!
//! The machine-readable export: the whole batch result, pretty-printed.
//! Downstream tooling keys on the serde names of the model types, so those
//! are the stable contract.

use crate::engine::model::BatchResult;
use crate::error::ReportError;

pub fn render(result: &BatchResult) -> Result<String, ReportError> {
    serde_json::to_string_pretty(result).map_err(|e| ReportError::RenderError {
        format: "json".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::tests::sample_result;

    #[test]
    fn renders_codes_and_statuses_by_name() {
        let json = render(&sample_result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["policy_version"], "2024.1");
        let verdicts = value["records"][0]["verdicts"].as_array().unwrap();
        assert_eq!(verdicts[0]["code"], "S1-1");
        assert_eq!(verdicts[0]["status"], "passed");
        assert_eq!(verdicts[2]["code"], "S2");
        assert_eq!(verdicts[2]["status"], "failed");
    }

    #[test]
    fn round_trips_through_serde() {
        let json = render(&sample_result()).unwrap();
        let parsed: BatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].verdicts.len(), 12);
    }
}
