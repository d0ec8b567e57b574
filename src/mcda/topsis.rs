use anyhow::Result;
use ndarray::{parallel::prelude::*, Array1, ArrayView1, Axis, Zip};
use serde::Serialize;
use tracing::debug;

use super::IndicatorMatrix;
use crate::error::PipelineError;

/// Closeness of one region to the ideal solution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionResult {
    pub region_id: String,
    /// In [0, 1]; higher is nearer the ideal point.
    pub closeness: f64,
    /// Set when the region coincides with both reference points and the
    /// closeness fell back to 0.5.
    pub degenerate: bool,
}

/// TOPSIS ranking with vector normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct Topsis {
    pub weights: Vec<f64>,
    /// Column indices where larger is better; every other column is a cost.
    pub benefit: Vec<usize>,
}

impl Topsis {
    pub fn new(weights: Vec<f64>, benefit: Vec<usize>) -> Self {
        Self { weights, benefit }
    }

    fn validate(&self, matrix: &IndicatorMatrix) -> Result<()> {
        let cols = matrix.num_criteria();
        if matrix.num_regions() == 0 {
            return Err(PipelineError::InvalidInput("cannot rank an empty matrix".to_string()).into());
        }
        if self.weights.len() != cols {
            return Err(PipelineError::InvalidInput(format!(
                "{} weights for {cols} criteria", self.weights.len()
            )).into());
        }
        if let Some(&bad) = self.benefit.iter().find(|&&j| j >= cols) {
            return Err(PipelineError::InvalidInput(format!(
                "benefit criterion {bad} out of range 0..{cols}"
            )).into());
        }
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::InvalidInput("weights must be finite".to_string()).into());
        }
        if matrix.values().iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::InvalidInput("indicator matrix holds a non-finite value".to_string()).into());
        }
        Ok(())
    }

    /// Score every region of `matrix`, in row order.
    pub fn rank(&self, matrix: &IndicatorMatrix) -> Result<Vec<DecisionResult>> {
        self.validate(matrix)?;

        // Vector-normalize and weight each column; an all-zero column stays zero.
        let mut weighted = matrix.values().clone();
        for (j, mut column) in weighted.axis_iter_mut(Axis(1)).enumerate() {
            let norm = column.dot(&column).sqrt();
            let scale = if norm > 0.0 { self.weights[j] / norm } else { 0.0 };
            column.mapv_inplace(|v| v * scale);
        }

        let column_max = weighted.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));
        let column_min = weighted.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));

        let mut ideal = Array1::<f64>::zeros(weighted.ncols());
        let mut anti_ideal = Array1::<f64>::zeros(weighted.ncols());
        for j in 0..weighted.ncols() {
            if self.benefit.contains(&j) {
                ideal[j] = column_max[j];
                anti_ideal[j] = column_min[j];
            } else {
                ideal[j] = column_min[j];
                anti_ideal[j] = column_max[j];
            }
        }

        let distances = weighted.axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| (distance(row, ideal.view()), distance(row, anti_ideal.view())))
            .collect::<Vec<_>>();

        Ok(matrix.region_ids().iter()
            .zip(distances)
            .map(|(region_id, (to_ideal, to_anti))| {
                let total = to_ideal + to_anti;
                if total > 0.0 {
                    DecisionResult { region_id: region_id.clone(), closeness: to_anti / total, degenerate: false }
                } else {
                    debug!("[topsis] region {region_id} coincides with both reference points, closeness 0.5");
                    DecisionResult { region_id: region_id.clone(), closeness: 0.5, degenerate: true }
                }
            })
            .collect())
    }
}

/// Euclidean distance between two equally long vectors.
fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    Zip::from(a).and(b)
        .fold(0.0, |acc, &x, &y| acc + (x - y) * (x - y))
        .sqrt()
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};
    use proptest::prelude::*;

    use super::*;

    fn matrix(values: Array2<f64>) -> IndicatorMatrix {
        let ids = (0..values.nrows()).map(|i| format!("r{}", i + 1)).collect();
        IndicatorMatrix::new(ids, values).unwrap()
    }

    fn standard() -> Topsis { Topsis::new(vec![0.4, 0.4, 0.2], vec![0, 1]) }

    #[test]
    fn symmetric_regions_tie_and_balanced_region_trails() {
        let m = matrix(array![[0.8, 0.2, 0.1], [0.2, 0.8, 0.1], [0.5, 0.5, 0.5]]);
        let results = standard().rank(&m).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].region_id, "r1");
        assert!((results[0].closeness - results[1].closeness).abs() < 1e-12);
        assert!(results[2].closeness < results[0].closeness);
        assert!(results[2].closeness < results[1].closeness);
        assert!(results.iter().all(|r| !r.degenerate && (0.0..=1.0).contains(&r.closeness)));
    }

    #[test]
    fn dominant_region_scores_one() {
        let m = matrix(array![[1.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let results = standard().rank(&m).unwrap();
        assert!((results[0].closeness - 1.0).abs() < 1e-12);
        assert!(results[1].closeness.abs() < 1e-12);
    }

    #[test]
    fn zero_column_is_not_a_fault() {
        let m = matrix(array![[0.0, 0.3, 0.1], [0.0, 0.6, 0.1]]);
        let results = standard().rank(&m).unwrap();
        assert!(results.iter().all(|r| r.closeness.is_finite()));
        assert!(results[1].closeness > results[0].closeness);
    }

    #[test]
    fn identical_regions_are_degenerate() {
        let m = matrix(array![[0.5, 0.5, 0.5], [0.5, 0.5, 0.5]]);
        let results = standard().rank(&m).unwrap();
        assert!(results.iter().all(|r| r.degenerate && r.closeness == 0.5));
    }

    #[test]
    fn single_region_is_degenerate() {
        let results = standard().rank(&matrix(array![[0.2, 0.3, 0.4]])).unwrap();
        assert!(results[0].degenerate);
        assert_eq!(results[0].closeness, 0.5);
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        let m = matrix(array![[0.1, 0.2, 0.3]]);
        let is_invalid = |result: Result<Vec<DecisionResult>>| matches!(
            result.unwrap_err().downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidInput(_))
        );

        assert!(is_invalid(Topsis::new(vec![0.5, 0.5], vec![0]).rank(&m)));
        assert!(is_invalid(Topsis::new(vec![0.4, 0.4, 0.2], vec![3]).rank(&m)));
        assert!(is_invalid(standard().rank(&matrix(Array2::zeros((0, 3))))));
        assert!(is_invalid(standard().rank(&matrix(array![[f64::NAN, 0.2, 0.3]]))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn closeness_is_monotone_in_each_criterion(
            rows in prop::collection::vec(prop::collection::vec(0.0..1.0f64, 3), 2..8),
            weights in prop::collection::vec(0.05..1.0f64, 3),
            region in 0usize..8,
            criterion in 0usize..3,
            bump in 0.01..1.0f64,
        ) {
            let n = rows.len();
            let region = region % n;
            let values = Array2::from_shape_fn((n, 3), |(i, j)| rows[i][j]);
            let mut bumped = values.clone();
            bumped[[region, criterion]] += bump;

            let topsis = Topsis::new(weights, vec![0, 1]);
            let before = topsis.rank(&matrix(values)).unwrap()[region].closeness;
            let after = topsis.rank(&matrix(bumped)).unwrap()[region].closeness;

            prop_assert!((0.0..=1.0).contains(&before) && (0.0..=1.0).contains(&after));
            if criterion < 2 {
                prop_assert!(after >= before - 1e-9, "benefit bump lowered closeness: {before} -> {after}");
            } else {
                prop_assert!(after <= before + 1e-9, "cost bump raised closeness: {before} -> {after}");
            }
        }
    }
}
