//! Layer normalization: raw vector sources → one coordinate reference, one schema.
//!
//! Every record carries its category label (`SOURCE`) and the archive it came
//! from (`ZIP_FILE`); a [`NormalizedLayerSet`] holds the records of exactly
//! one category, all in the same [`Crs`].

mod crs;
mod normalize;
mod text;

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{bail, Result};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::PipelineError;

pub use crs::Crs;
pub(crate) use crs::Reprojector;
pub use normalize::{LayerNormalizer, NoDataReason, NormalizeOutcome};
pub use text::repair_korean_text;

/// Attribute key tagging each record with its category label.
pub const SOURCE_FIELD: &str = "SOURCE";

/// Attribute key tagging each record with its originating archive.
pub const ARCHIVE_FIELD: &str = "ZIP_FILE";

/// Logical category of a raw geometry source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceLabel {
    Supply,
    Demand,
    Environment,
    AdminBoundary,
    ResearchComplex,
}

impl SourceLabel {
    /// The three categories overlaid against regions, in indicator-column order.
    pub const INDICATORS: [SourceLabel; 3] = [Self::Supply, Self::Demand, Self::Environment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supply => "Supply",
            Self::Demand => "Demand",
            Self::Environment => "Environment",
            Self::AdminBoundary => "AdminBoundary",
            Self::ResearchComplex => "ResearchComplex",
        }
    }

    /// Only admin boundary labels are used as join keys, so only they get text repair.
    #[inline] pub fn needs_text_repair(&self) -> bool { matches!(self, Self::AdminBoundary) }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SourceLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "Supply" => Self::Supply,
            "Demand" => Self::Demand,
            "Environment" => Self::Environment,
            "AdminBoundary" => Self::AdminBoundary,
            "ResearchComplex" => Self::ResearchComplex,
            other => bail!("unknown source label: {other:?}"),
        })
    }
}

/// A single attribute value from a feature's table row.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl AttrValue {
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => json!(b),
            Self::Integer(i) => json!(i),
            Self::Number(n) if n.is_finite() => json!(n),
            Self::Number(_) => Value::Null,
            Self::Text(s) => json!(s),
        }
    }

    pub(crate) fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_i64().map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Number))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s.clone()),
            // Nested values never come out of a dBase table.
            _ => Self::Null,
        }
    }
}

/// One polygonal feature after normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryRecord {
    pub geometry: MultiPolygon<f64>,
    pub attributes: BTreeMap<String, AttrValue>,
    pub crs: Crs,
    pub source: SourceLabel,
    pub archive: String,
}

impl GeometryRecord {
    /// Text value of an attribute, if present and textual.
    #[inline]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_text)
    }
}

/// All records of one category, sharing one coordinate reference. Immutable once built.
#[derive(Clone, Debug)]
pub struct NormalizedLayerSet {
    label: SourceLabel,
    crs: Crs,
    records: Vec<GeometryRecord>,
}

impl NormalizedLayerSet {
    /// Build a layer set, checking every record's label and coordinate reference.
    pub fn new(label: SourceLabel, crs: Crs, records: Vec<GeometryRecord>) -> Result<Self> {
        for record in &records {
            if record.crs != crs {
                return Err(PipelineError::CrsMismatch { expected: crs, found: record.crs }.into());
            }
            if record.source != label {
                return Err(PipelineError::InvalidInput(format!(
                    "record labelled {} placed in {label} layer set", record.source
                )).into());
            }
        }
        Ok(Self { label, crs, records })
    }

    #[inline] pub fn label(&self) -> SourceLabel { self.label }

    #[inline] pub fn crs(&self) -> Crs { self.crs }

    #[inline] pub fn records(&self) -> &[GeometryRecord] { &self.records }

    #[inline] pub fn len(&self) -> usize { self.records.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Iterate over the geometries in record order.
    pub fn geometries(&self) -> impl Iterator<Item = &MultiPolygon<f64>> {
        self.records.iter().map(|record| &record.geometry)
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn record(source: SourceLabel, crs: Crs) -> GeometryRecord {
        GeometryRecord {
            geometry: MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]]),
            attributes: BTreeMap::new(),
            crs,
            source,
            archive: "a.zip".to_string(),
        }
    }

    #[test]
    fn label_round_trips_through_str() {
        for label in [
            SourceLabel::Supply,
            SourceLabel::Demand,
            SourceLabel::Environment,
            SourceLabel::AdminBoundary,
            SourceLabel::ResearchComplex,
        ] {
            assert_eq!(label.as_str().parse::<SourceLabel>().unwrap(), label);
        }
        assert!("supply".parse::<SourceLabel>().is_err());
    }

    #[test]
    fn only_admin_boundaries_are_repaired() {
        assert!(SourceLabel::AdminBoundary.needs_text_repair());
        assert!(SourceLabel::INDICATORS.iter().all(|label| !label.needs_text_repair()));
    }

    #[test]
    fn layer_set_rejects_mixed_crs() {
        let crs = Crs::new(5179);
        let records = vec![record(SourceLabel::Supply, crs), record(SourceLabel::Supply, Crs::WGS84)];
        let err = NormalizedLayerSet::new(SourceLabel::Supply, crs, records).unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::CrsMismatch { .. })));
    }

    #[test]
    fn layer_set_rejects_foreign_label() {
        let crs = Crs::new(5179);
        let records = vec![record(SourceLabel::Demand, crs)];
        assert!(NormalizedLayerSet::new(SourceLabel::Supply, crs, records).is_err());
    }

    #[test]
    fn attr_json_conversion() {
        assert_eq!(AttrValue::from_json(&json!(3)), AttrValue::Integer(3));
        assert_eq!(AttrValue::from_json(&json!(2.5)), AttrValue::Number(2.5));
        assert_eq!(AttrValue::from_json(&json!("서울")), AttrValue::Text("서울".into()));
        assert_eq!(AttrValue::from_json(&json!([1, 2])), AttrValue::Null);
        assert_eq!(AttrValue::Number(f64::NAN).to_json(), Value::Null);
    }
}
