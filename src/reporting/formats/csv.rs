//! CSV report format
//!
//! A compliance matrix, one row per target and one column per code, in the
//! shape audit spreadsheets expect: 1 for pass, 0 for fail, "-" for
//! indeterminate.

use crate::engine::model::{BatchResult, ComplianceCode, VerdictStatus};
use crate::error::ReportError;
use crate::reporting::csv_escape;

pub fn render(result: &BatchResult) -> Result<String, ReportError> {
    let mut out = String::new();

    out.push_str("site_name,url,priority");
    for code in ComplianceCode::ALL {
        out.push(',');
        out.push_str(code.as_str());
    }
    out.push_str(",overall\n");

    for record in &result.records {
        out.push_str(&csv_escape(&record.target.display_name));
        out.push(',');
        out.push_str(&csv_escape(&record.target.url));
        out.push(',');
        out.push_str(record.target.priority.as_str());

        for &code in ComplianceCode::ALL {
            out.push(',');
            let cell = record
                .verdict(code)
                .map(|v| v.status.matrix_cell())
                .unwrap_or(VerdictStatus::Indeterminate.matrix_cell());
            out.push_str(cell);
        }

        out.push(',');
        out.push_str(record.overall().as_str());
        out.push('\n');
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::tests::sample_result;

    #[test]
    fn one_row_per_target_with_full_matrix() {
        let csv = render(&sample_result()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);

        let header: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(header[0], "site_name");
        assert_eq!(header[3], "S1-1");
        assert_eq!(*header.last().unwrap(), "overall");

        let row: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(row.len(), header.len());
        // S2 (third code column) failed in the sample
        assert_eq!(row[3], "1");
        assert_eq!(row[5], "0");
        assert_eq!(*row.last().unwrap(), "failed");
    }
}
