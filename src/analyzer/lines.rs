//! Code-size measurement through an external line counter (cloc)

use crate::error::{PipelineError, PipelineResult};
use serde_json::Value as JsonValue;

/// Entries in a cloc JSON report that are not languages
const NON_LANGUAGE_KEYS: &[&str] = &["header", "SUM"];

/// Sum the `code` metric over every language of a `cloc --json` report.
///
/// The `SUM` aggregate and the `header` block are excluded. Empty output
/// (cloc prints nothing when it finds no source files) counts as zero.
pub fn sum_code_lines(report: &str) -> PipelineResult<u64> {
    if report.trim().is_empty() {
        return Ok(0);
    }

    let value: JsonValue =
        serde_json::from_str(report).map_err(|e| PipelineError::parse("cloc report", e))?;
    let languages = value
        .as_object()
        .ok_or_else(|| PipelineError::parse("cloc report", "top level is not an object"))?;

    Ok(languages
        .iter()
        .filter(|(name, _)| !NON_LANGUAGE_KEYS.contains(&name.as_str()))
        .filter_map(|(_, stats)| stats.get("code").and_then(JsonValue::as_u64))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_excludes_aggregate_and_header() {
        let report = r#"{
            "header": {"cloc_version": "1.98", "n_files": 3, "code": 999},
            "Rust": {"nFiles": 2, "blank": 10, "comment": 5, "code": 120},
            "TOML": {"nFiles": 1, "blank": 1, "comment": 0, "code": 30},
            "SUM": {"blank": 11, "comment": 5, "code": 150, "nFiles": 3}
        }"#;
        assert_eq!(sum_code_lines(report).unwrap(), 150);
    }

    #[test]
    fn test_empty_report_is_zero() {
        assert_eq!(sum_code_lines("").unwrap(), 0);
        assert_eq!(sum_code_lines("  \n").unwrap(), 0);
    }

    #[test]
    fn test_malformed_report_is_parse_error() {
        assert!(matches!(
            sum_code_lines("not json"),
            Err(PipelineError::Parse { .. })
        ));
        assert!(matches!(
            sum_code_lines("[1, 2]"),
            Err(PipelineError::Parse { .. })
        ));
    }
}
