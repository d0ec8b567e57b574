mod topsis;

use anyhow::Result;
use ndarray::Array2;

use crate::{config::NUM_CRITERIA, error::PipelineError, rescale::{rescale, OutputRange}, zonal::IndicatorRecord};

pub use topsis::{DecisionResult, Topsis};

/// Region-ordered criterion values (rows = regions, columns = criteria).
#[derive(Clone, Debug, PartialEq)]
pub struct IndicatorMatrix {
    region_ids: Vec<String>,
    values: Array2<f64>,
}

impl IndicatorMatrix {
    /// Wrap an array, checking that every row has a region id.
    pub fn new(region_ids: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if region_ids.len() != values.nrows() {
            return Err(PipelineError::InvalidInput(format!(
                "{} region ids for a matrix with {} rows", region_ids.len(), values.nrows()
            )).into());
        }
        Ok(Self { region_ids, values })
    }

    /// Columns are `[supply_ratio, demand_ratio, env_constraint_ratio]`.
    pub fn from_records(records: &[IndicatorRecord]) -> Self {
        let values = Array2::from_shape_fn((records.len(), NUM_CRITERIA), |(i, j)| records[i].values()[j]);
        Self {
            region_ids: records.iter().map(|record| record.region_id.clone()).collect(),
            values,
        }
    }

    #[inline] pub fn region_ids(&self) -> &[String] { &self.region_ids }

    #[inline] pub fn values(&self) -> &Array2<f64> { &self.values }

    #[inline] pub fn num_regions(&self) -> usize { self.values.nrows() }

    #[inline] pub fn num_criteria(&self) -> usize { self.values.ncols() }
}

/// A region's indicators with its closeness and the rescaled opportunity index.
#[derive(Clone, Debug, PartialEq)]
pub struct OpportunityRecord {
    pub indicators: IndicatorRecord,
    pub closeness: f64,
    pub opportunity_index: f64,
}

/// Rescale closeness scores onto `range` and attach them to their indicator rows.
///
/// `results` must be in the same region order as `records`.
pub fn opportunity_index(records: Vec<IndicatorRecord>, results: &[DecisionResult], range: OutputRange) -> Result<Vec<OpportunityRecord>> {
    if records.len() != results.len()
        || records.iter().zip(results).any(|(record, result)| record.region_id != result.region_id)
    {
        return Err(PipelineError::InvalidInput(
            "decision results do not line up with indicator records".to_string()
        ).into());
    }

    let closeness = results.iter().map(|result| result.closeness).collect::<Vec<_>>();
    let index = rescale(&closeness, range);

    Ok(records.into_iter()
        .zip(closeness.into_iter().zip(index))
        .map(|(indicators, (closeness, opportunity_index))| OpportunityRecord { indicators, closeness, opportunity_index })
        .collect())
}
