use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, layer::{Crs, SourceLabel}, rescale::OutputRange};

/// Number of criteria in the indicator matrix (supply, demand, environment).
pub const NUM_CRITERIA: usize = 3;

/// Run-wide settings, passed explicitly into every stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub figures_dir: PathBuf,

    /// Project-wide coordinate reference every layer is normalized into.
    pub target_epsg: u32,

    /// Attribute/column holding the administrative-unit name.
    pub region_key: String,

    /// TOPSIS weights for [supply_ratio, demand_ratio, env_constraint_ratio].
    pub weights: Vec<f64>,

    /// Column indices treated as benefit criteria; all others are costs.
    pub benefit_criteria: Vec<usize>,

    /// Presentation range of the opportunity index.
    pub index_range: OutputRange,

    pub render_figures: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            reports_dir: PathBuf::from("output/reports"),
            figures_dir: PathBuf::from("output/figures"),
            target_epsg: 5179,
            region_key: "SIDO_NM".to_string(),
            weights: vec![0.4, 0.4, 0.2],
            benefit_criteria: vec![0, 1],
            index_range: OutputRange::PERCENT,
            render_figures: true,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("[config] Failed to open {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("[config] Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the target reference, weight/criteria shapes, and the output range.
    pub fn validate(&self) -> Result<()> {
        if !self.target_crs().is_known() {
            return Err(PipelineError::InvalidInput(format!(
                "target reference EPSG:{} is not registered", self.target_epsg
            )).into());
        }
        if self.weights.len() != NUM_CRITERIA {
            return Err(PipelineError::InvalidInput(format!(
                "expected {NUM_CRITERIA} weights, got {}", self.weights.len()
            )).into());
        }
        if let Some(&bad) = self.benefit_criteria.iter().find(|&&i| i >= NUM_CRITERIA) {
            return Err(PipelineError::InvalidInput(format!(
                "benefit criterion index {bad} out of range 0..{NUM_CRITERIA}"
            )).into());
        }
        if !(self.index_range.min < self.index_range.max) {
            return Err(PipelineError::InvalidInput(format!(
                "index range [{}, {}] is empty", self.index_range.min, self.index_range.max
            )).into());
        }
        Ok(())
    }

    #[inline] pub fn target_crs(&self) -> Crs { Crs::new(self.target_epsg) }

    /// Raw source directory for a layer category.
    pub fn category_dir(&self, label: SourceLabel) -> PathBuf {
        let rel = match label {
            SourceLabel::Supply => "02_geospatial_layers/supply",
            SourceLabel::Demand => "02_geospatial_layers/demand",
            SourceLabel::Environment => "02_geospatial_layers/environment",
            SourceLabel::AdminBoundary => "03_administrative_boundaries",
            SourceLabel::ResearchComplex => "04_research_complexes",
        };
        self.raw_dir.join(rel)
    }

    pub fn all_layers_path(&self) -> PathBuf { self.processed_dir.join("LSMD_CONT_ALL.geojson") }

    pub fn admin_path(&self) -> PathBuf { self.processed_dir.join("LSMD_CONT_ADMIN_ALL.geojson") }

    pub fn research_complex_path(&self) -> PathBuf { self.processed_dir.join("LSMD_CONT_RESEARCH_COMPLEX.geojson") }

    pub fn opportunity_csv_path(&self) -> PathBuf { self.reports_dir.join("zeb_opportunity_index.csv") }

    pub fn supply_csv_path(&self) -> PathBuf { self.reports_dir.join("comprehensive_paper_analysis.csv") }

    pub fn mismatch_csv_path(&self) -> PathBuf { self.reports_dir.join("zeb_mismatch_analysis_results.csv") }

    pub fn opportunity_map_path(&self) -> PathBuf { self.figures_dir.join("zeb_opportunity_map.svg") }

    pub fn mismatch_map_path(&self) -> PathBuf { self.figures_dir.join("mismatch_analysis_charts.svg") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_target_is_rejected() {
        let config = PipelineConfig { target_epsg: 32652, ..PipelineConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.target_crs(), Crs::new(5179));
        assert_eq!(
            config.category_dir(SourceLabel::Demand),
            PathBuf::from("data/raw/02_geospatial_layers/demand")
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "region_key": "SIG_KOR_NM", "weights": [0.5, 0.3, 0.2] }"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.region_key, "SIG_KOR_NM");
        assert_eq!(config.weights, vec![0.5, 0.3, 0.2]);
        assert_eq!(config.benefit_criteria, vec![0, 1]);
        assert_eq!(config.target_epsg, 5179);
    }

    #[test]
    fn wrong_weight_count_is_rejected() {
        let config = PipelineConfig { weights: vec![1.0, 1.0], ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn out_of_range_benefit_index_is_rejected() {
        let config = PipelineConfig { benefit_criteria: vec![0, 3], ..Default::default() };
        assert!(config.validate().is_err());
    }
}
