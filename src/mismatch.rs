use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::rescale::{rescale, OutputRange};

/// One row of the supply-side table: a scored item and the region it belongs to, if known.
#[derive(Clone, Debug, PartialEq)]
pub struct SupplyItem {
    pub region: Option<String>,
    pub supply_index: Option<f64>,
}

/// Per-region mean supply plus the rows that could not be attributed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SupplyAggregation {
    /// Mean `Technology_Supply_Index` per region key.
    pub by_region: BTreeMap<String, f64>,
    /// Rows with a null or empty region key.
    pub unassigned: usize,
    /// Keys naming no demand region, in sorted order.
    pub unknown_regions: Vec<String>,
}

/// Average supply scores per region.
///
/// Rows without a region go to the unassigned bucket instead of being
/// attributed to any region. Rows without a score are ignored for the mean.
pub fn aggregate_supply<'a>(items: &[SupplyItem], demand_regions: impl IntoIterator<Item = &'a str>) -> SupplyAggregation {
    let known = demand_regions.into_iter().collect::<HashSet<_>>();

    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut unknown = BTreeSet::new();
    let mut unassigned = 0;

    for item in items {
        let Some(region) = item.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) else {
            unassigned += 1;
            continue;
        };
        if !known.contains(region) {
            unknown.insert(region.to_string());
        }
        if let Some(score) = item.supply_index.filter(|v| v.is_finite()) {
            let entry = sums.entry(region.to_string()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    if unassigned > 0 {
        warn!("[mismatch] {unassigned} supply rows have no region and stay unassigned");
    }
    if !unknown.is_empty() {
        warn!("[mismatch] supply rows name {} regions absent from demand: {:?}", unknown.len(), unknown);
    }

    SupplyAggregation {
        by_region: sums.into_iter().map(|(region, (sum, n))| (region, sum / n as f64)).collect(),
        unassigned,
        unknown_regions: unknown.into_iter().collect(),
    }
}

/// Demand and supply of one region on a common [0, 1] scale.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MismatchRecord {
    pub region_id: String,
    pub demand_raw: f64,
    pub supply_raw: f64,
    pub demand_normalized: f64,
    pub supply_normalized: f64,
    /// `demand_normalized - supply_normalized`, in [-1, 1].
    pub mismatch_index: f64,
}

/// Join supply onto demand regions and compute the mismatch index.
///
/// Output follows demand order. A region missing from `supply` takes a raw
/// supply of 0 before normalization.
pub fn fuse(demand: &[(String, f64)], supply: &BTreeMap<String, f64>) -> Vec<MismatchRecord> {
    let supply_raw = demand.iter()
        .map(|(region, _)| supply.get(region).copied().unwrap_or_else(|| {
            debug!("[mismatch] no supply for {region}, filling 0");
            0.0
        }))
        .collect::<Vec<_>>();
    let demand_raw = demand.iter().map(|(_, value)| *value).collect::<Vec<_>>();

    let demand_normalized = rescale(&demand_raw, OutputRange::UNIT);
    let supply_normalized = rescale(&supply_raw, OutputRange::UNIT);

    demand.iter().enumerate()
        .map(|(i, (region, _))| MismatchRecord {
            region_id: region.clone(),
            demand_raw: demand_raw[i],
            supply_raw: supply_raw[i],
            demand_normalized: demand_normalized[i],
            supply_normalized: supply_normalized[i],
            mismatch_index: demand_normalized[i] - supply_normalized[i],
        })
        .collect()
}

/// Everything the mismatch stage learned, including what it could not attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct MismatchReport {
    pub records: Vec<MismatchRecord>,
    pub unassigned_rows: usize,
    pub unknown_regions: Vec<String>,
    /// Demand regions that received the 0 supply fill.
    pub filled_regions: Vec<String>,
}

/// Aggregate supply items and fuse them with per-region demand.
pub fn analyze(demand: &[(String, f64)], items: &[SupplyItem]) -> MismatchReport {
    let aggregation = aggregate_supply(items, demand.iter().map(|(region, _)| region.as_str()));
    let filled_regions = demand.iter()
        .filter(|(region, _)| !aggregation.by_region.contains_key(region))
        .map(|(region, _)| region.clone())
        .collect::<Vec<_>>();
    let records = fuse(demand, &aggregation.by_region);

    info!(
        "[mismatch] fused {} regions ({} filled with zero supply)",
        records.len(), filled_regions.len()
    );

    MismatchReport {
        records,
        unassigned_rows: aggregation.unassigned,
        unknown_regions: aggregation.unknown_regions,
        filled_regions,
    }
}
