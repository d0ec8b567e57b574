//! Shapefile reading: shapes, dBase attributes, and the `.prj` sidecar.

use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use anyhow::{anyhow, Context, Result};
use shapefile::{dbase::{FieldValue, Record}, Reader, Shape};
use tracing::warn;

use super::dbf;
use crate::layer::{AttrValue, Crs};

/// Raw contents of one `.shp` file.
pub(crate) struct ShapefileContents {
    pub(crate) items: Vec<(Shape, Record)>,
    /// Reference declared by the `.prj` sidecar: `None` when no sidecar exists,
    /// `Some(Err(_))` when one exists but is not recognised.
    pub(crate) prj: Option<Result<Crs>>,
}

/// Reads all shapes + attribute records from a given `.shp` file path.
/// A record that fails to parse ends the read; everything before it is kept.
pub(crate) fn read_shapefile(path: &Path) -> Result<ShapefileContents> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    // `dbase` decodes text as lossy UTF-8; take character fields from the raw bytes instead.
    let dbf_path = sidecar(path, "dbf")
        .ok_or_else(|| anyhow!("Missing .dbf sidecar for {}", path.display()))?;
    let raw_text = dbf::read_character_fields(&dbf_path)?;

    let mut items = Vec::new();
    for (i, result) in reader.iter_shapes_and_records().enumerate() {
        match result {
            Ok((shape, mut record)) => {
                for (name, bytes) in raw_text.get(i).into_iter().flatten() {
                    record.insert(name.clone(), FieldValue::Character(dbf::decode_text(bytes)));
                }
                items.push((shape, record));
            }
            Err(e) => {
                warn!("[io::shp] {}: record {i} unreadable, skipping rest of file: {e}", path.display());
                break;
            }
        }
    }

    Ok(ShapefileContents { items, prj: read_prj(path) })
}

/// Locate a sidecar next to `shp_path`, accepting either extension case.
fn sidecar(shp_path: &Path, ext: &str) -> Option<PathBuf> {
    [ext.to_ascii_lowercase(), ext.to_ascii_uppercase()].into_iter()
        .map(|e| shp_path.with_extension(e))
        .find(|p| p.is_file())
}

fn read_prj(shp_path: &Path) -> Option<Result<Crs>> {
    let prj_path = sidecar(shp_path, "prj")?;
    Some(fs::read(&prj_path)
        .with_context(|| format!("Failed to read {}", prj_path.display()))
        .and_then(|bytes| {
            let wkt = String::from_utf8_lossy(&bytes);
            Crs::from_prj_wkt(&wkt)
                .with_context(|| format!("unrecognised coordinate reference in {}", prj_path.display()))
        }))
}

/// Convert one dBase field into an attribute value.
fn field_to_attr(value: FieldValue) -> AttrValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => AttrValue::Text(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => AttrValue::Number(n),
        FieldValue::Float(Some(f)) => AttrValue::Number(f64::from(f)),
        FieldValue::Double(d) | FieldValue::Currency(d) => AttrValue::Number(d),
        FieldValue::Integer(i) => AttrValue::Integer(i64::from(i)),
        FieldValue::Logical(Some(b)) => AttrValue::Bool(b),
        FieldValue::Date(Some(d)) => AttrValue::Text(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())),
        _ => AttrValue::Null,
    }
}

/// Convert a dBase record into an ordered attribute map.
pub(crate) fn record_to_attributes(record: Record) -> BTreeMap<String, AttrValue> {
    record.into_iter()
        .map(|(field, value)| (field, field_to_attr(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_conversion() {
        assert_eq!(field_to_attr(FieldValue::Character(Some("  서울 ".into()))), AttrValue::Text("서울".into()));
        assert_eq!(field_to_attr(FieldValue::Character(None)), AttrValue::Null);
        assert_eq!(field_to_attr(FieldValue::Numeric(Some(1.5))), AttrValue::Number(1.5));
        assert_eq!(field_to_attr(FieldValue::Integer(7)), AttrValue::Integer(7));
        assert_eq!(field_to_attr(FieldValue::Logical(Some(true))), AttrValue::Bool(true));
    }

    #[test]
    fn prj_sidecar_detection() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("layer.shp");

        assert!(read_prj(&shp).is_none());

        fs::write(dir.path().join("layer.PRJ"), r#"GEOGCS["GCS_WGS_1984",UNIT["Degree",0.0174532925199433]]"#).unwrap();
        assert_eq!(read_prj(&shp).unwrap().unwrap(), Crs::WGS84);
    }

    #[test]
    fn unrecognised_prj_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("layer.shp");
        fs::write(dir.path().join("layer.prj"), r#"PROJCS["Mars_Equidistant",UNIT["Meter",1.0]]"#).unwrap();
        assert!(read_prj(&shp).unwrap().is_err());
    }

    #[test]
    fn missing_shapefile_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_shapefile(&dir.path().join("none.shp")).is_err());
    }
}
