//! GeoJSON layer containers: one FeatureCollection holding records of one or
//! more categories, tagged by `SOURCE` and `ZIP_FILE`, with a named `crs` member.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::{
    error::PipelineError,
    layer::{AttrValue, Crs, GeometryRecord, NormalizedLayerSet, SourceLabel, ARCHIVE_FIELD, SOURCE_FIELD},
};

/// Write every record of `sets` into one FeatureCollection at `path`.
///
/// All sets must be in `crs`. Returns the number of features written.
pub(crate) fn write_layer_container(path: &Path, crs: Crs, sets: &[&NormalizedLayerSet]) -> Result<usize> {
    if let Some(set) = sets.iter().find(|set| set.crs() != crs) {
        return Err(PipelineError::CrsMismatch { expected: crs, found: set.crs() }.into());
    }

    let features = sets.iter()
        .flat_map(|set| set.records())
        .map(record_to_feature)
        .collect::<Vec<_>>();
    let count = features.len();

    let collection = json!({
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": crs.urn() } },
        "features": features,
    });

    let bytes = serde_json::to_vec(&collection).context("[io::geojson] Failed to serialize GeoJSON")?;
    fs::write(path, bytes)
        .with_context(|| format!("[io::geojson] Failed to write {}", path.display()))?;

    info!("[io::geojson] wrote {count} features to {}", path.display());
    Ok(count)
}

/// Read a container back into one layer set per `SOURCE` label, in label order.
///
/// Features with a missing or unknown label, or a non-polygonal geometry, are
/// skipped with a warning. A container without a `crs` member is read as WGS 84.
pub(crate) fn read_layer_container(path: &Path) -> Result<Vec<NormalizedLayerSet>> {
    let bytes = fs::read(path)
        .with_context(|| format!("[io::geojson] Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("[io::geojson] Failed to parse {}", path.display()))?;

    if value["type"].as_str() != Some("FeatureCollection") {
        bail!("[io::geojson] {} is not a FeatureCollection", path.display());
    }

    let crs = match value["crs"]["properties"]["name"].as_str() {
        Some(name) => Crs::from_urn(name)
            .ok_or_else(|| anyhow!("[io::geojson] Unrecognised crs {name:?} in {}", path.display()))?,
        None => Crs::WGS84,
    };

    let mut grouped: BTreeMap<SourceLabel, Vec<GeometryRecord>> = BTreeMap::new();
    for (i, feature) in value["features"].as_array().into_iter().flatten().enumerate() {
        match feature_to_record(feature, crs) {
            Ok(record) => grouped.entry(record.source).or_default().push(record),
            Err(e) => warn!("{}", PipelineError::UnreadableFeature {
                path: path.to_path_buf(),
                reason: format!("feature {i}: {e:#}"),
            }),
        }
    }

    grouped.into_iter()
        .map(|(label, records)| NormalizedLayerSet::new(label, crs, records))
        .collect()
}

fn record_to_feature(record: &GeometryRecord) -> Value {
    let mut properties = record.attributes.iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect::<Map<_, _>>();
    properties.insert(SOURCE_FIELD.to_string(), json!(record.source.as_str()));
    properties.insert(ARCHIVE_FIELD.to_string(), json!(record.archive));

    json!({
        "type": "Feature",
        "geometry": multipolygon_to_geojson(&record.geometry),
        "properties": properties,
    })
}

fn feature_to_record(feature: &Value, crs: Crs) -> Result<GeometryRecord> {
    let properties = feature["properties"].as_object()
        .ok_or_else(|| anyhow!("missing properties"))?;
    let source = properties.get(SOURCE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing {SOURCE_FIELD}"))?
        .parse::<SourceLabel>()?;
    let archive = properties.get(ARCHIVE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let attributes = properties.iter()
        .filter(|(key, _)| key.as_str() != SOURCE_FIELD && key.as_str() != ARCHIVE_FIELD)
        .map(|(key, value)| (key.clone(), AttrValue::from_json(value)))
        .collect();

    Ok(GeometryRecord {
        geometry: geojson_to_multipolygon(&feature["geometry"])?,
        attributes,
        crs,
        source,
        archive,
    })
}

/// Convert a MultiPolygon to a GeoJSON geometry object.
pub(crate) fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    let ring = |ls: &LineString<f64>| ls.coords().map(|c| vec![c.x, c.y]).collect::<Vec<_>>();
    let polygons = mp.0.iter()
        .map(|polygon| {
            std::iter::once(ring(polygon.exterior()))
                .chain(polygon.interiors().iter().map(ring))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    json!({
        "type": "MultiPolygon",
        "coordinates": polygons,
    })
}

/// Parse a GeoJSON Polygon or MultiPolygon geometry object.
pub(crate) fn geojson_to_multipolygon(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let coords = geometry["coordinates"].as_array()
        .ok_or_else(|| anyhow!("geometry has no coordinates"))?;
    match geometry["type"].as_str() {
        Some("MultiPolygon") => coords.iter()
            .map(parse_polygon)
            .collect::<Result<Vec<_>>>()
            .map(MultiPolygon),
        Some("Polygon") => Ok(MultiPolygon(vec![parse_polygon(&geometry["coordinates"])?])),
        other => bail!("unsupported geometry type {other:?}"),
    }
}

/// `[exterior, hole, hole, ...]`
fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = value.as_array()
        .ok_or_else(|| anyhow!("polygon is not an array of rings"))?
        .iter()
        .map(parse_ring);
    let exterior = rings.next().ok_or_else(|| anyhow!("polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let mut points = value.as_array()
        .ok_or_else(|| anyhow!("ring is not an array of positions"))?
        .iter()
        .map(|position| {
            let x = position[0].as_f64().ok_or_else(|| anyhow!("invalid x coordinate"))?;
            let y = position[1].as_f64().ok_or_else(|| anyhow!("invalid y coordinate"))?;
            Ok(Coord { x, y })
        })
        .collect::<Result<Vec<_>>>()?;

    // Ensure ring is closed (first point == last point)
    if !points.is_empty() && points[0] != points[points.len() - 1] {
        points.push(points[0]);
    }
    Ok(LineString(points))
}
