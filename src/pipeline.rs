//! The batch stages, each consuming the previous stage's artifacts.

use std::{collections::HashMap, fmt, path::PathBuf};

use anyhow::{Context, Result};
use geo::MultiPolygon;
use tracing::{info, warn};

use crate::{
    common::{ensure_dir_exists, require_file_exists},
    config::PipelineConfig,
    error::PipelineError,
    io::{csv, geojson, svg::{write_choropleth_svg, ChoroplethStyle}},
    layer::{LayerNormalizer, NoDataReason, NormalizeOutcome, NormalizedLayerSet, SourceLabel},
    mcda::{opportunity_index, IndicatorMatrix, Topsis},
    mismatch::analyze,
    region::AdminRegion,
    zonal::compute_ratios,
};

const CATEGORIES: [SourceLabel; 5] = [
    SourceLabel::Supply,
    SourceLabel::Demand,
    SourceLabel::Environment,
    SourceLabel::AdminBoundary,
    SourceLabel::ResearchComplex,
];

#[derive(Clone, Debug)]
pub struct PreprocessSummary {
    /// Feature count per category that produced a layer set.
    pub layers: Vec<(SourceLabel, usize)>,
    pub skipped: Vec<(SourceLabel, NoDataReason)>,
    pub all_layers_path: PathBuf,
    pub admin_path: PathBuf,
    pub research_complex_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct OpportunitySummary {
    pub regions: usize,
    /// Regions whose closeness fell back to 0.5.
    pub degenerate: usize,
    /// Highest-scoring region and its index.
    pub top: Option<(String, f64)>,
    pub csv_path: PathBuf,
    pub figure_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct MismatchSummary {
    pub regions: usize,
    pub unassigned_rows: usize,
    pub unknown_regions: Vec<String>,
    pub filled_regions: Vec<String>,
    pub csv_path: PathBuf,
    pub figure_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub preprocess: PreprocessSummary,
    pub opportunity: OpportunitySummary,
    pub mismatch: MismatchSummary,
}

/// Normalize every raw category and write the layer containers.
///
/// Fails with `MissingInput`, before writing anything, when no indicator
/// category or no admin boundary category yields data.
pub fn preprocess(config: &PipelineConfig) -> Result<PreprocessSummary> {
    config.validate()?;
    let normalizer = LayerNormalizer::new(config.target_crs());

    let mut sets: Vec<NormalizedLayerSet> = Vec::new();
    let mut skipped = Vec::new();
    for label in CATEGORIES {
        match normalizer.normalize_dir(&config.category_dir(label), label)? {
            NormalizeOutcome::Layer(set) => sets.push(set),
            NormalizeOutcome::NoData(reason) => {
                warn!("[preprocess] no {label} data ({reason:?})");
                skipped.push((label, reason));
            }
        }
    }

    let of = |label: SourceLabel| sets.iter().filter(move |set| set.label() == label);
    let indicators = SourceLabel::INDICATORS.iter()
        .flat_map(|&label| of(label))
        .collect::<Vec<_>>();
    if indicators.is_empty() {
        return Err(PipelineError::MissingInput {
            what: "supply, demand, or environment layers",
            path: config.category_dir(SourceLabel::Supply).parent().map(PathBuf::from).unwrap_or_default(),
        }.into());
    }
    let admin = of(SourceLabel::AdminBoundary).collect::<Vec<_>>();
    if admin.is_empty() {
        return Err(PipelineError::MissingInput {
            what: "administrative boundaries",
            path: config.category_dir(SourceLabel::AdminBoundary),
        }.into());
    }
    let research = of(SourceLabel::ResearchComplex).collect::<Vec<_>>();

    ensure_dir_exists(&config.processed_dir)?;
    let crs = normalizer.target();
    let all_layers_path = config.all_layers_path();
    geojson::write_layer_container(&all_layers_path, crs, &indicators)?;
    let admin_path = config.admin_path();
    geojson::write_layer_container(&admin_path, crs, &admin)?;
    let research_complex_path = if research.is_empty() {
        None
    } else {
        let path = config.research_complex_path();
        geojson::write_layer_container(&path, crs, &research)?;
        Some(path)
    };

    let layers = sets.iter().map(|set| (set.label(), set.len())).collect();
    info!("[preprocess] done");
    Ok(PreprocessSummary { layers, skipped, all_layers_path, admin_path, research_complex_path })
}

/// Read the admin container and build regions keyed by `config.region_key`.
fn load_regions(config: &PipelineConfig) -> Result<Vec<AdminRegion>> {
    let admin_path = config.admin_path();
    require_file_exists(&admin_path, "admin boundary container")?;
    let admin = geojson::read_layer_container(&admin_path)?
        .into_iter()
        .find(|set| set.label() == SourceLabel::AdminBoundary)
        .ok_or(PipelineError::MissingInput { what: "administrative boundaries", path: admin_path })?;
    AdminRegion::from_layer(&admin, &config.region_key)
}

/// Overlay indicator layers on regions, rank them, and write the opportunity table.
pub fn opportunity(config: &PipelineConfig) -> Result<OpportunitySummary> {
    config.validate()?;
    let all_layers_path = config.all_layers_path();
    require_file_exists(&all_layers_path, "layer container")?;
    let regions = load_regions(config)?;
    let layer_sets = geojson::read_layer_container(&all_layers_path)?;

    let indicators = compute_ratios(&regions, &layer_sets)?;
    let matrix = IndicatorMatrix::from_records(&indicators);
    let results = Topsis::new(config.weights.clone(), config.benefit_criteria.clone())
        .rank(&matrix)
        .context("[opportunity] TOPSIS ranking failed")?;
    let degenerate = results.iter().filter(|result| result.degenerate).count();
    let records = opportunity_index(indicators, &results, config.index_range)?;

    ensure_dir_exists(&config.reports_dir)?;
    let csv_path = config.opportunity_csv_path();
    csv::write_opportunity_table(&csv_path, &config.region_key, &records)?;

    let figure_path = if config.render_figures {
        let path = config.opportunity_map_path();
        ensure_dir_exists(&config.figures_dir)?;
        let geoms = regions.iter().map(|region| region.geometry.clone()).collect::<Vec<_>>();
        let values = records.iter().map(|record| record.opportunity_index).collect::<Vec<_>>();
        write_choropleth_svg(&path, &geoms, &values, &ChoroplethStyle::opportunity())?;
        Some(path)
    } else {
        None
    };

    let top = records.iter()
        .max_by(|a, b| a.opportunity_index.total_cmp(&b.opportunity_index))
        .map(|record| (record.indicators.region_id.clone(), record.opportunity_index));

    info!("[opportunity] ranked {} regions", records.len());
    Ok(OpportunitySummary { regions: records.len(), degenerate, top, csv_path, figure_path })
}

/// Fuse the opportunity table with the supply table and write the mismatch table.
///
/// The figure is drawn only when the admin container is present.
pub fn mismatch(config: &PipelineConfig) -> Result<MismatchSummary> {
    config.validate()?;
    let demand_path = config.opportunity_csv_path();
    let supply_path = config.supply_csv_path();
    require_file_exists(&demand_path, "opportunity table")?;
    require_file_exists(&supply_path, "supply table")?;

    let demand = csv::read_demand_table(&demand_path, &config.region_key)?;
    let items = csv::read_supply_table(&supply_path, &config.region_key)?;
    let report = analyze(&demand, &items);

    // Load regions before any write: a bad admin container must leave no output.
    let regions = if config.render_figures && config.admin_path().is_file() {
        Some(load_regions(config)?)
    } else {
        None
    };

    ensure_dir_exists(&config.reports_dir)?;
    let csv_path = config.mismatch_csv_path();
    csv::write_mismatch_table(&csv_path, &config.region_key, &report.records)?;

    let figure_path = match regions {
        Some(regions) => {
            let by_region = report.records.iter()
                .map(|record| (record.region_id.as_str(), record.mismatch_index))
                .collect::<HashMap<_, _>>();
            let (geoms, values): (Vec<MultiPolygon<f64>>, Vec<f64>) = regions.into_iter()
                .map(|region| {
                    let value = by_region.get(region.id.as_str()).copied().unwrap_or(f64::NAN);
                    (region.geometry, value)
                })
                .unzip();

            let path = config.mismatch_map_path();
            ensure_dir_exists(&config.figures_dir)?;
            write_choropleth_svg(&path, &geoms, &values, &ChoroplethStyle::mismatch())?;
            Some(path)
        }
        None => None,
    };

    Ok(MismatchSummary {
        regions: report.records.len(),
        unassigned_rows: report.unassigned_rows,
        unknown_regions: report.unknown_regions,
        filled_regions: report.filled_regions,
        csv_path,
        figure_path,
    })
}

/// Run every stage in order, stopping at the first failure.
pub fn run_all(config: &PipelineConfig) -> Result<RunSummary> {
    let preprocess = preprocess(config).context("[run] preprocess stage failed")?;
    let opportunity = opportunity(config).context("[run] opportunity stage failed")?;
    let mismatch = mismatch(config).context("[run] mismatch stage failed")?;
    Ok(RunSummary { preprocess, opportunity, mismatch })
}

impl fmt::Display for PreprocessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, count) in &self.layers {
            writeln!(f, "{label}: {count} features")?;
        }
        for (label, reason) in &self.skipped {
            writeln!(f, "{label}: no data ({reason:?})")?;
        }
        writeln!(f, "layers  -> {}", self.all_layers_path.display())?;
        write!(f, "regions -> {}", self.admin_path.display())?;
        if let Some(path) = &self.research_complex_path {
            write!(f, "\nresearch complexes -> {}", path.display())?;
        }
        Ok(())
    }
}

impl fmt::Display for OpportunitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} regions ranked", self.regions)?;
        if self.degenerate > 0 {
            write!(f, " ({} tied at 0.5)", self.degenerate)?;
        }
        if let Some((region, index)) = &self.top {
            write!(f, "\nhighest opportunity: {region} ({index:.1})")?;
        }
        write!(f, "\ntable  -> {}", self.csv_path.display())?;
        if let Some(path) = &self.figure_path {
            write!(f, "\nfigure -> {}", path.display())?;
        }
        Ok(())
    }
}

impl fmt::Display for MismatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} regions fused", self.regions)?;
        if !self.filled_regions.is_empty() {
            write!(f, "\nno supply data (filled with 0): {}", self.filled_regions.join(", "))?;
        }
        if self.unassigned_rows > 0 {
            write!(f, "\nunassigned supply rows: {}", self.unassigned_rows)?;
        }
        if !self.unknown_regions.is_empty() {
            write!(f, "\nsupply regions not in demand: {}", self.unknown_regions.join(", "))?;
        }
        write!(f, "\ntable  -> {}", self.csv_path.display())?;
        if let Some(path) = &self.figure_path {
            write!(f, "\nfigure -> {}", path.display())?;
        }
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[preprocess]\n{}", self.preprocess)?;
        writeln!(f, "[opportunity]\n{}", self.opportunity)?;
        write!(f, "[mismatch]\n{}", self.mismatch)
    }
}
