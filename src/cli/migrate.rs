//! Migrate command - upgrade a legacy state file

use crate::state::migrate_file;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Run the migrate command
pub fn run(input: &Path, output: Option<&Path>) -> Result<()> {
    let report = migrate_file(input, output)
        .with_context(|| format!("Failed to migrate {}", input.display()))?;

    let target = output.unwrap_or(input);
    println!(
        "{} Migrated {} repositories ({} years) into {}",
        style("✓").green(),
        report.repositories,
        report.years,
        style(target.display()).cyan()
    );
    if let Some(backup) = &report.backup {
        println!("  Original kept at {}", style(backup.display()).cyan());
    }
    if !report.dropped_flat.is_empty() {
        println!(
            "{} Dropped {} entries without a year: {}",
            style("!").yellow(),
            report.dropped_flat.len(),
            report.dropped_flat.join(", ")
        );
    }
    if report.dropped_years > 0 {
        println!(
            "{} Dropped {} unreadable year entries",
            style("!").yellow(),
            report.dropped_years
        );
    }
    Ok(())
}
