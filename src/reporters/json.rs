//! JSON reporter
//!
//! Outputs one object per repository/year, for piping to jq.

use super::YearRow;
use anyhow::Result;

/// Render rows as JSON
pub fn render(rows: &[YearRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}
