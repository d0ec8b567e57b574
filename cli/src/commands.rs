pub mod mismatch;
pub mod opportunity;
pub mod preprocess;
pub mod run;

use anyhow::{Context, Result};
use zebmatch::PipelineConfig;

use crate::cli::{Cli, RankArgs};

/// Load the config file (or defaults) and apply command-line overrides.
pub fn load_config(cli: &Cli, rank: Option<&RankArgs>) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let paths = &cli.paths;
    if let Some(dir) = &paths.raw_dir { config.raw_dir = dir.clone() }
    if let Some(dir) = &paths.processed_dir { config.processed_dir = dir.clone() }
    if let Some(dir) = &paths.reports_dir { config.reports_dir = dir.clone() }
    if let Some(dir) = &paths.figures_dir { config.figures_dir = dir.clone() }
    if paths.no_figures { config.render_figures = false }
    if let Some(weights) = rank.and_then(|rank| rank.weights.clone()) { config.weights = weights }

    config.validate()?;
    Ok(config)
}
