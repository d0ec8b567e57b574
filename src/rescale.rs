use serde::{Deserialize, Serialize};
use tracing::debug;

/// A closed target interval for min-max rescaling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRange {
    pub min: f64,
    pub max: f64,
}

impl OutputRange {
    /// Presentation range of the opportunity index.
    pub const PERCENT: OutputRange = OutputRange { min: 0.0, max: 100.0 };

    /// Range used before computing the mismatch index.
    pub const UNIT: OutputRange = OutputRange { min: 0.0, max: 1.0 };

    #[inline] pub const fn new(min: f64, max: f64) -> Self { Self { min, max } }

    #[inline] pub fn midpoint(&self) -> f64 { (self.min + self.max) / 2.0 }

    #[inline] pub fn contains(&self, value: f64) -> bool { self.min <= value && value <= self.max }
}

impl Default for OutputRange {
    fn default() -> Self { Self::PERCENT }
}

/// Linearly map `values` so the smallest lands on `range.min` and the largest on `range.max`.
///
/// A constant input maps every element to the range midpoint. NaN entries are
/// ignored when finding the bounds and stay NaN in the output.
pub fn rescale(values: &[f64], range: OutputRange) -> Vec<f64> {
    let (lo, hi) = values.iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if lo > hi {
        return values.to_vec();
    }
    if hi == lo {
        debug!("[rescale] constant input of {} values, using midpoint {}", values.len(), range.midpoint());
        return values.iter()
            .map(|v| if v.is_nan() { f64::NAN } else { range.midpoint() })
            .collect();
    }

    let span = range.max - range.min;
    values.iter()
        .map(|&v| {
            if v.is_nan() { return f64::NAN }
            let t = (v - lo) / (hi - lo);
            if t == 1.0 { range.max } else { (range.min + t * span).min(range.max) }
        })
        .collect()
}
