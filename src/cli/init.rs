//! Init command - write an example project config

use crate::config::PipelineConfig;
use anyhow::Result;
use console::style;
use std::path::Path;

/// Run the init command
pub fn run() -> Result<()> {
    let (path, created) = PipelineConfig::init_project_config(Path::new("."))?;
    if created {
        println!(
            "{} Created {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    } else {
        println!(
            "{} Already exists: {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }
    Ok(())
}
