mod index;

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::{error::PipelineError, layer::{NormalizedLayerSet, SourceLabel}, region::AdminRegion};

pub(crate) use index::FeatureIndex;

/// Per-region share of area covered by each indicator category.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndicatorRecord {
    pub region_id: String,
    pub supply_ratio: f64,
    pub demand_ratio: f64,
    pub env_constraint_ratio: f64,
}

impl IndicatorRecord {
    /// Criterion values in matrix column order.
    #[inline]
    pub fn values(&self) -> [f64; 3] {
        [self.supply_ratio, self.demand_ratio, self.env_constraint_ratio]
    }
}

/// Overlay every indicator layer set onto every region.
///
/// Sets with a non-indicator label are ignored; several sets with the same
/// label are pooled. A category with no set contributes 0 everywhere, as
/// does every category of a region whose area is 0. All regions and sets
/// must share one coordinate reference.
pub fn compute_ratios(regions: &[AdminRegion], layer_sets: &[NormalizedLayerSet]) -> Result<Vec<IndicatorRecord>> {
    let reference = regions.first().map(|region| region.crs)
        .or_else(|| layer_sets.first().map(|set| set.crs()));
    if let Some(expected) = reference {
        let found = regions.iter().map(|region| region.crs)
            .chain(layer_sets.iter().map(|set| set.crs()))
            .find(|&crs| crs != expected);
        if let Some(found) = found {
            return Err(PipelineError::CrsMismatch { expected, found }.into());
        }
    }

    let [supply, demand, environment] = SourceLabel::INDICATORS.map(|label| {
        let index = FeatureIndex::new(
            layer_sets.iter()
                .filter(|set| set.label() == label)
                .flat_map(|set| set.geometries())
        );
        debug!("[zonal] indexed {} {} features", index.len(), label);
        index
    });

    let records = regions.par_iter()
        .map(|region| {
            let area = region.area();
            if area <= 0.0 {
                debug!("[zonal] region {} has zero area, ratios set to 0", region.id);
                return IndicatorRecord {
                    region_id: region.id.clone(),
                    supply_ratio: 0.0,
                    demand_ratio: 0.0,
                    env_constraint_ratio: 0.0,
                };
            }
            let ratio = |index: &FeatureIndex| index.covered_area(&region.geometry) / area;
            IndicatorRecord {
                region_id: region.id.clone(),
                supply_ratio: ratio(&supply),
                demand_ratio: ratio(&demand),
                env_constraint_ratio: ratio(&environment),
            }
        })
        .collect::<Vec<_>>();

    info!("[zonal] computed indicator ratios for {} regions", records.len());
    Ok(records)
}
