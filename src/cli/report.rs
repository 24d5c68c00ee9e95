//! Report command - summarize a state file

use crate::config::PipelineConfig;
use crate::reporters::{report_with_format, OutputFormat};
use crate::state::StateStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Run the report command
pub fn run(
    input: Option<PathBuf>,
    format: &str,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let path = match input.or_else(|| output.map(Path::to_path_buf)) {
        Some(p) => p,
        None => PipelineConfig::load(config)?.output(),
    };
    if !path.exists() {
        anyhow::bail!("State file not found: {}", path.display());
    }

    let store = StateStore::load(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let format: OutputFormat = format.parse()?;
    let rendered = report_with_format(store.entries(), format, console::colors_enabled())?;
    print!("{}", rendered);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}
