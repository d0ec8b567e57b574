//! CSV reading operations.

use std::{fs, io::Cursor, path::Path};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReader, DataType}};
use tracing::warn;

use super::{OPPORTUNITY_COLUMN, SUPPLY_COLUMN};
use crate::{error::PipelineError, mismatch::SupplyItem};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads a CSV file from `path` into a Polars DataFrame, ignoring a leading UTF-8 BOM.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame> {
    let bytes = fs::read(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    read_csv_bytes(&bytes)
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))
}

/// Read DataFrame from CSV bytes.
pub(crate) fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    CsvReader::new(Cursor::new(bytes))
        .finish()
        .context("[io::csv::read] Failed to parse CSV")
}

fn require_column(df: &DataFrame, table: &str, column: &str) -> Result<()> {
    if df.column(column).is_err() {
        return Err(PipelineError::SchemaMismatch {
            table: table.to_string(),
            column: column.to_string(),
        }.into());
    }
    Ok(())
}

/// Text values of a column; numbers are rendered as text, blanks become `None`.
fn text_column(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let values = df.column(column)?.cast(&DataType::String)?;
    Ok(values.str()?.into_iter()
        .map(|value| value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string))
        .collect())
}

fn number_column(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let values = df.column(column)?.cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

/// Read `(region, ZEB_Opportunity_Index)` pairs from the opportunity table.
///
/// Rows with a blank key or index are skipped with a warning.
pub(crate) fn read_demand_table(path: &Path, key: &str) -> Result<Vec<(String, f64)>> {
    let df = read_csv(path)?;
    let table = path.display().to_string();
    require_column(&df, &table, key)?;
    require_column(&df, &table, OPPORTUNITY_COLUMN)?;

    let regions = text_column(&df, key)?;
    let scores = number_column(&df, OPPORTUNITY_COLUMN)?;

    let mut out = Vec::with_capacity(regions.len());
    for (row, (region, score)) in regions.into_iter().zip(scores).enumerate() {
        match (region, score.filter(|v| v.is_finite())) {
            (Some(region), Some(score)) => out.push((region, score)),
            _ => warn!("[io::csv::read] {table} row {row} lacks {key} or {OPPORTUNITY_COLUMN}, skipping"),
        }
    }
    Ok(out)
}

/// Read supply items (region key and Technology_Supply_Index) from the paper analysis table.
pub(crate) fn read_supply_table(path: &Path, key: &str) -> Result<Vec<SupplyItem>> {
    let df = read_csv(path)?;
    let table = path.display().to_string();
    require_column(&df, &table, key)?;
    require_column(&df, &table, SUPPLY_COLUMN)?;

    let regions = text_column(&df, key)?;
    let scores = number_column(&df, SUPPLY_COLUMN)?;

    Ok(regions.into_iter()
        .zip(scores)
        .map(|(region, supply_index)| SupplyItem { region, supply_index })
        .collect())
}
