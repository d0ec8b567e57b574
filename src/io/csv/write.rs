//! CSV writing operations.

use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerWriter, prelude::{CsvWriter, NamedFrom}, series::Series};
use tracing::info;

use super::{OPPORTUNITY_COLUMN, SUPPLY_COLUMN};
use crate::{mcda::OpportunityRecord, mismatch::MismatchRecord};

/// Write a DataFrame to a CSV file.
pub(crate) fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("[io::csv::write] Failed to create CSV file: {}", path.display()))?;
    CsvWriter::new(file)
        .finish(df)
        .with_context(|| format!("[io::csv::write] Failed to write CSV to {:?}", path))?;
    info!("[io::csv::write] wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Write `key, supply_ratio, demand_ratio, env_constraint_ratio, ZEB_Opportunity_Index`.
pub(crate) fn write_opportunity_table(path: &Path, key: &str, records: &[OpportunityRecord]) -> Result<()> {
    let column = |f: fn(&OpportunityRecord) -> f64| records.iter().map(f).collect::<Vec<_>>();

    let mut df = DataFrame::new(vec![
        Series::new(key.into(), records.iter().map(|r| r.indicators.region_id.clone()).collect::<Vec<_>>()).into(),
        Series::new("supply_ratio".into(), column(|r| r.indicators.supply_ratio)).into(),
        Series::new("demand_ratio".into(), column(|r| r.indicators.demand_ratio)).into(),
        Series::new("env_constraint_ratio".into(), column(|r| r.indicators.env_constraint_ratio)).into(),
        Series::new(OPPORTUNITY_COLUMN.into(), column(|r| r.opportunity_index)).into(),
    ])?;

    write_csv(&mut df, path)
}

/// Write the fused demand/supply table, one row per demand region.
pub(crate) fn write_mismatch_table(path: &Path, key: &str, records: &[MismatchRecord]) -> Result<()> {
    let column = |f: fn(&MismatchRecord) -> f64| records.iter().map(f).collect::<Vec<_>>();

    let mut df = DataFrame::new(vec![
        Series::new(key.into(), records.iter().map(|r| r.region_id.clone()).collect::<Vec<_>>()).into(),
        Series::new(OPPORTUNITY_COLUMN.into(), column(|r| r.demand_raw)).into(),
        Series::new(SUPPLY_COLUMN.into(), column(|r| r.supply_raw)).into(),
        Series::new("Demand_Normalized".into(), column(|r| r.demand_normalized)).into(),
        Series::new("Supply_Normalized".into(), column(|r| r.supply_normalized)).into(),
        Series::new("Mismatch_Index".into(), column(|r| r.mismatch_index)).into(),
    ])?;

    write_csv(&mut df, path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{io::csv::{read_csv, read_demand_table}, zonal::IndicatorRecord};

    #[test]
    fn opportunity_table_is_readable_as_demand() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zeb_opportunity_index.csv");
        let records = vec![
            OpportunityRecord {
                indicators: IndicatorRecord { region_id: "서울특별시".into(), supply_ratio: 0.5, demand_ratio: 0.25, env_constraint_ratio: 0.0 },
                closeness: 0.7,
                opportunity_index: 100.0,
            },
            OpportunityRecord {
                indicators: IndicatorRecord { region_id: "부산광역시".into(), supply_ratio: 0.1, demand_ratio: 0.2, env_constraint_ratio: 0.3 },
                closeness: 0.2,
                opportunity_index: 0.0,
            },
        ];
        write_opportunity_table(&path, "SIDO_NM", &records).unwrap();

        let header = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        assert_eq!(header, "SIDO_NM,supply_ratio,demand_ratio,env_constraint_ratio,ZEB_Opportunity_Index");

        let demand = read_demand_table(&path, "SIDO_NM").unwrap();
        assert_eq!(demand, vec![("서울특별시".to_string(), 100.0), ("부산광역시".to_string(), 0.0)]);
    }

    #[test]
    fn mismatch_table_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mismatch.csv");
        let records = vec![MismatchRecord {
            region_id: "A".into(),
            demand_raw: 50.0,
            supply_raw: 0.0,
            demand_normalized: 1.0,
            supply_normalized: 0.0,
            mismatch_index: 1.0,
        }];
        write_mismatch_table(&path, "SIDO_NM", &records).unwrap();

        let df = read_csv(&path).unwrap();
        let names = df.get_column_names().into_iter().map(|name| name.to_string()).collect::<Vec<_>>();
        assert_eq!(names, [
            "SIDO_NM", "ZEB_Opportunity_Index", "Technology_Supply_Index",
            "Demand_Normalized", "Supply_Normalized", "Mismatch_Index",
        ]);
        assert_eq!(df.height(), 1);
    }
}
