use std::collections::HashMap;

use anyhow::Result;
use geo::{Area, BooleanOps, MultiPolygon};
use tracing::warn;

use crate::{error::PipelineError, layer::{Crs, NormalizedLayerSet, SourceLabel}};

/// A named administrative unit polygon.
#[derive(Clone, Debug, PartialEq)]
pub struct AdminRegion {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

impl AdminRegion {
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>, crs: Crs) -> Self {
        Self { id: id.into(), geometry, crs }
    }

    /// Planar area in squared target-CRS units.
    #[inline] pub fn area(&self) -> f64 { self.geometry.unsigned_area() }

    /// Build one region per distinct `key` value of an admin boundary layer set.
    ///
    /// Regions keep first-seen order; features sharing a key are unioned into
    /// one geometry. Features without a text key are skipped.
    pub fn from_layer(set: &NormalizedLayerSet, key: &str) -> Result<Vec<Self>> {
        if set.label() != SourceLabel::AdminBoundary {
            return Err(PipelineError::InvalidInput(format!(
                "regions must come from an AdminBoundary layer set, got {}", set.label()
            )).into());
        }
        if !set.is_empty() && set.records().iter().all(|record| !record.attributes.contains_key(key)) {
            return Err(PipelineError::SchemaMismatch {
                table: "admin boundaries".to_string(),
                column: key.to_string(),
            }.into());
        }

        let mut regions: Vec<Self> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (i, record) in set.records().iter().enumerate() {
            let Some(id) = record.text(key).filter(|id| !id.is_empty()) else {
                warn!("[region] feature {i} from {} has no {key} label, skipping", record.archive);
                continue;
            };
            match index.get(id) {
                Some(&j) => {
                    let merged = regions[j].geometry.union(&record.geometry);
                    regions[j].geometry = merged;
                }
                None => {
                    index.insert(id.to_string(), regions.len());
                    regions.push(Self::new(id, record.geometry.clone(), set.crs()));
                }
            }
        }

        Ok(regions)
    }
}
