use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    common::{extract_zip, has_extension, shape_to_multipolygon},
    error::PipelineError,
    io::shp::{read_shapefile, record_to_attributes},
};
use super::{AttrValue, Crs, GeometryRecord, NormalizedLayerSet, Reprojector, SourceLabel, repair_korean_text};

/// Why a category produced no layer set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoDataReason {
    /// The category directory does not exist.
    DirectoryMissing,
    /// The directory holds no `.zip` archives or loose `.shp` files.
    NoArchives,
    /// Sources were found but none yielded a readable polygon feature.
    NoReadableFeatures,
}

/// Result of normalizing one category directory.
#[derive(Debug)]
pub enum NormalizeOutcome {
    Layer(NormalizedLayerSet),
    NoData(NoDataReason),
}

impl NormalizeOutcome {
    pub fn into_layer(self) -> Option<NormalizedLayerSet> {
        match self {
            Self::Layer(layer) => Some(layer),
            Self::NoData(_) => None,
        }
    }
}

/// Reads raw polygon sources and reprojects them into one target reference.
#[derive(Clone, Debug)]
pub struct LayerNormalizer {
    target: Crs,
}

impl LayerNormalizer {
    pub fn new(target: Crs) -> Self { Self { target } }

    #[inline] pub fn target(&self) -> Crs { self.target }

    /// Normalize every archive and loose shapefile in `dir` into one layer set.
    ///
    /// Unreadable archives, files, and features are logged and skipped. A
    /// missing or empty directory yields `NoData`, never an error; errors are
    /// reserved for failures of the scratch space or directory listing itself.
    pub fn normalize_dir(&self, dir: &Path, label: SourceLabel) -> Result<NormalizeOutcome> {
        info!("[normalize] {label}: {}", dir.display());
        if !dir.is_dir() {
            warn!("[normalize] {label}: directory not found: {}", dir.display());
            return Ok(NormalizeOutcome::NoData(NoDataReason::DirectoryMissing));
        }

        let mut sources = fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && (has_extension(path, "zip") || has_extension(path, "shp")))
            .collect::<Vec<_>>();
        sources.sort();

        if sources.is_empty() {
            warn!("[normalize] {label}: no .zip or .shp sources in {}", dir.display());
            return Ok(NormalizeOutcome::NoData(NoDataReason::NoArchives));
        }

        let mut records = Vec::new();
        for path in &sources {
            let result = if has_extension(path, "zip") {
                self.load_archive(path, label)
            } else {
                self.load_shapefile(path, label, &file_name(path))
            };
            match result {
                Ok(mut loaded) => records.append(&mut loaded),
                Err(e) => warn!("[normalize] {}", PipelineError::UnreadableFeature {
                    path: path.clone(),
                    reason: format!("{e:#}"),
                }),
            }
        }

        if records.is_empty() {
            warn!("[normalize] {label}: no readable features in {}", dir.display());
            return Ok(NormalizeOutcome::NoData(NoDataReason::NoReadableFeatures));
        }

        info!("[normalize] {label}: merged {} features", records.len());
        Ok(NormalizeOutcome::Layer(NormalizedLayerSet::new(label, self.target, records)?))
    }

    /// Extract one archive into a scratch directory and read every shapefile in it.
    /// The scratch directory is removed when this returns, on success or failure.
    fn load_archive(&self, zip_path: &Path, label: SourceLabel) -> Result<Vec<GeometryRecord>> {
        let scratch = tempfile::tempdir().context("Failed to create extraction scratch directory")?;
        extract_zip(zip_path, scratch.path())?;

        let archive = file_name(zip_path);
        let shapefiles = WalkDir::new(scratch.path())
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file() && has_extension(path, "shp"))
            .collect::<Vec<PathBuf>>();

        if shapefiles.is_empty() {
            warn!("[normalize] {archive}: archive contains no .shp files");
        }

        let mut records = Vec::new();
        for shp_path in shapefiles {
            match self.load_shapefile(&shp_path, label, &archive) {
                Ok(mut loaded) => records.append(&mut loaded),
                Err(e) => warn!("[normalize] {}", PipelineError::UnreadableFeature {
                    path: zip_path.join(shp_path.strip_prefix(scratch.path()).unwrap_or(&shp_path)),
                    reason: format!("{e:#}"),
                }),
            }
        }
        Ok(records)
    }

    /// Read one shapefile, reproject it, and tag its records.
    fn load_shapefile(&self, shp_path: &Path, label: SourceLabel, archive: &str) -> Result<Vec<GeometryRecord>> {
        let contents = read_shapefile(shp_path)?;
        let declared = contents.prj.transpose()?;

        let mut geometries = Vec::with_capacity(contents.items.len());
        let mut attributes = Vec::with_capacity(contents.items.len());
        for (i, (shape, record)) in contents.items.into_iter().enumerate() {
            let Some(geometry) = shape_to_multipolygon(&shape) else {
                warn!("[normalize] {}: feature {i} is {:?}, not a polygon; skipping", shp_path.display(), shape.shapetype());
                continue;
            };
            geometries.push(geometry);
            attributes.push(record_to_attributes(record));
        }

        let projected = self.to_target(geometries, declared)?;

        let records = projected.into_iter()
            .zip(attributes)
            .filter_map(|(geometry, attrs)| {
                let geometry = geometry?;
                let attrs = if label.needs_text_repair() { repair_attributes(attrs) } else { attrs };
                Some(GeometryRecord {
                    geometry,
                    attributes: attrs,
                    crs: self.target,
                    source: label,
                    archive: archive.to_string(),
                })
            })
            .collect::<Vec<_>>();

        debug!("[normalize] {} -> {} features", shp_path.display(), records.len());
        Ok(records)
    }

    /// Bring geometries from `source` into the target reference.
    ///
    /// `None` marks missing reference metadata and is resolved with
    /// [`Crs::guess_unset`]. Geometries already in the target are returned
    /// untouched. A feature whose coordinates fail to transform becomes `None`
    /// (and is logged); an unregistered source reference fails the whole call.
    pub fn to_target(&self, geometries: Vec<MultiPolygon<f64>>, source: Option<Crs>) -> Result<Vec<Option<MultiPolygon<f64>>>> {
        let source = source.unwrap_or_else(|| {
            let guess = Crs::guess_unset(layer_bounds(&geometries), self.target);
            warn!("[normalize] missing coordinate reference, assuming {guess}");
            guess
        });

        if source == self.target {
            return Ok(geometries.into_iter().map(Some).collect());
        }

        let reprojector = Reprojector::new(source, self.target)?;
        Ok(geometries.iter().enumerate()
            .map(|(i, geometry)| match reprojector.project(geometry) {
                Ok(projected) => Some(projected),
                Err(e) => {
                    warn!("[normalize] feature {i}: {source} -> {} failed: {e:#}", self.target);
                    None
                }
            })
            .collect())
    }
}

/// Apply the Korean text repair to every text attribute.
fn repair_attributes(attrs: BTreeMap<String, AttrValue>) -> BTreeMap<String, AttrValue> {
    attrs.into_iter()
        .map(|(key, value)| match value {
            AttrValue::Text(text) => {
                let repaired = repair_korean_text(&text).into_owned();
                (key, AttrValue::Text(repaired))
            }
            other => (key, other),
        })
        .collect()
}

/// Combined bounding rectangle of a set of geometries.
fn layer_bounds(geometries: &[MultiPolygon<f64>]) -> Option<Rect<f64>> {
    geometries.iter()
        .filter_map(|geometry| geometry.bounding_rect())
        .reduce(|a, b| Rect::new(
            geo::Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            geo::Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        ))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use geo::{polygon, Area};
    use shapefile::{dbase::{self, FieldValue, TableWriterBuilder}, Point, PolygonRing};

    use super::*;
    use crate::region::AdminRegion;

    const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",UNIT["Degree",0.0174532925199433]]"#;

    fn unified() -> Crs { Crs::new(5179) }

    /// Write a polygon shapefile with one `SIDO_NM` label per `(x, y, size, label)` square.
    fn write_squares(shp: &Path, squares: &[(f64, f64, f64, &str)], prj: Option<&str>) {
        let table = TableWriterBuilder::new().add_character_field("SIDO_NM".try_into().unwrap(), 20);
        let mut writer = shapefile::Writer::from_path(shp, table).unwrap();
        for &(x, y, size, label) in squares {
            let ring = vec![
                Point::new(x, y), Point::new(x, y + size), Point::new(x + size, y + size), Point::new(x + size, y),
            ];
            let mut record = dbase::Record::default();
            record.insert("SIDO_NM".to_string(), FieldValue::Character(Some(label.to_string())));
            writer.write_shape_and_record(&shapefile::Polygon::new(PolygonRing::Outer(ring)), &record).unwrap();
        }
        drop(writer);
        if let Some(prj) = prj {
            fs::write(shp.with_extension("prj"), prj).unwrap();
        }
    }

    /// Overwrite an ASCII placeholder in the `.dbf` with legacy EUC-KR bytes of the same length.
    fn write_legacy_label(shp: &Path, placeholder: &str, label: &str) {
        let (legacy, _, _) = encoding_rs::EUC_KR.encode(label);
        assert_eq!(legacy.len(), placeholder.len());
        let path = shp.with_extension("dbf");
        let mut dbf = fs::read(&path).unwrap();
        let at = dbf.windows(placeholder.len()).position(|w| w == placeholder.as_bytes()).unwrap();
        dbf[at..at + legacy.len()].copy_from_slice(&legacy);
        fs::write(&path, dbf).unwrap();
    }

    fn zip_shapefile(shp: &Path, archive: &Path) {
        let mut zip = zip::ZipWriter::new(fs::File::create(archive).unwrap());
        for ext in ["shp", "shx", "dbf", "prj"] {
            let path = shp.with_extension(ext);
            if !path.is_file() { continue }
            let name = file_name(&path);
            zip.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
            zip.write_all(&fs::read(&path).unwrap()).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Seoul and Busan squares in lon/lat with EUC-KR labels, zipped into `dir/sido_2024.zip`.
    fn legacy_admin_archive(dir: &Path) {
        let staging = tempfile::tempdir().unwrap();
        let shp = staging.path().join("sido.shp");
        write_squares(&shp, &[(127.0, 37.5, 0.01, "SEOUL_0000"), (129.0, 35.1, 0.01, "BUSAN_0000")], Some(WGS84_PRJ));
        write_legacy_label(&shp, "SEOUL_0000", "서울특별시");
        write_legacy_label(&shp, "BUSAN_0000", "부산광역시");
        zip_shapefile(&shp, &dir.join("sido_2024.zip"));
    }

    fn metric_square() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 950_000.0, y: 1_950_000.0), (x: 951_000.0, y: 1_950_000.0),
            (x: 951_000.0, y: 1_951_000.0), (x: 950_000.0, y: 1_951_000.0),
        ]])
    }

    #[test]
    fn target_layer_is_unchanged() {
        let normalizer = LayerNormalizer::new(unified());
        let input = vec![metric_square()];
        let out = normalizer.to_target(input.clone(), Some(unified())).unwrap();
        assert_eq!(out, vec![Some(input[0].clone())]);
    }

    #[test]
    fn unset_metric_layer_is_unchanged() {
        let normalizer = LayerNormalizer::new(unified());
        let out = normalizer.to_target(vec![metric_square()], None).unwrap();
        assert_eq!(out, vec![Some(metric_square())]);
    }

    #[test]
    fn lonlat_layer_is_reprojected() {
        let normalizer = LayerNormalizer::new(unified());
        let lonlat = MultiPolygon(vec![polygon![
            (x: 127.0, y: 37.5), (x: 127.01, y: 37.5), (x: 127.01, y: 37.51), (x: 127.0, y: 37.51),
        ]]);
        let out = normalizer.to_target(vec![lonlat], None).unwrap();
        let projected = out[0].as_ref().unwrap();

        // ~0.01° square at 37.5N: about 883 m × 1110 m.
        let area = projected.unsigned_area();
        assert!(area > 900_000.0 && area < 1_050_000.0, "area = {area}");
        let first = projected.0[0].exterior().0[0];
        assert!(first.x > 900_000.0 && first.x < 1_000_000.0);
        assert!(first.y > 1_900_000.0 && first.y < 2_000_000.0);
    }

    #[test]
    fn unregistered_source_fails() {
        let normalizer = LayerNormalizer::new(unified());
        assert!(normalizer.to_target(vec![metric_square()], Some(Crs::new(32652))).is_err());
    }

    #[test]
    fn missing_directory_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = LayerNormalizer::new(unified())
            .normalize_dir(&dir.path().join("supply"), SourceLabel::Supply)
            .unwrap();
        assert!(matches!(outcome, NormalizeOutcome::NoData(NoDataReason::DirectoryMissing)));
    }

    #[test]
    fn directory_without_archives_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), "nothing here").unwrap();
        let outcome = LayerNormalizer::new(unified())
            .normalize_dir(dir.path(), SourceLabel::Demand)
            .unwrap();
        assert!(matches!(outcome, NormalizeOutcome::NoData(NoDataReason::NoArchives)));
    }

    #[test]
    fn corrupt_archives_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_broken.zip"), b"not a zip archive").unwrap();
        fs::write(dir.path().join("b_broken.ZIP"), b"PK\x03\x04 truncated").unwrap();
        fs::write(dir.path().join("c_broken.shp"), b"garbage").unwrap();

        let outcome = LayerNormalizer::new(unified())
            .normalize_dir(dir.path(), SourceLabel::Environment)
            .unwrap();
        assert!(matches!(outcome, NormalizeOutcome::NoData(NoDataReason::NoReadableFeatures)));
    }

    #[test]
    fn archives_are_read_tagged_and_reprojected() {
        let dir = tempfile::tempdir().unwrap();
        legacy_admin_archive(dir.path());

        let set = LayerNormalizer::new(unified())
            .normalize_dir(dir.path(), SourceLabel::AdminBoundary)
            .unwrap()
            .into_layer()
            .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.crs(), unified());
        for record in set.records() {
            assert_eq!(record.source, SourceLabel::AdminBoundary);
            assert_eq!(record.archive, "sido_2024.zip");
            assert_eq!(record.crs, unified());
            let first = record.geometry.0[0].exterior().0[0];
            assert!(first.x > 900_000.0 && first.x < 1_200_000.0, "x = {}", first.x);
            assert!(first.y > 1_600_000.0 && first.y < 2_000_000.0, "y = {}", first.y);
        }

        let regions = AdminRegion::from_layer(&set, "SIDO_NM").unwrap();
        let ids = regions.iter().map(|region| region.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["서울특별시", "부산광역시"]);

        // Extraction happens in scratch space; the raw directory is left as it was.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn legacy_labels_are_repaired_only_for_admin_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        legacy_admin_archive(dir.path());

        let set = LayerNormalizer::new(unified())
            .normalize_dir(dir.path(), SourceLabel::Supply)
            .unwrap()
            .into_layer()
            .unwrap();
        let label = set.records()[0].text("SIDO_NM").unwrap();
        assert_ne!(label, "서울특별시");
        assert_eq!(repair_korean_text(label), "서울특별시");
    }

    #[test]
    fn loose_shapefile_without_prj_in_target_units() {
        let dir = tempfile::tempdir().unwrap();
        write_squares(&dir.path().join("zones.shp"), &[(950_000.0, 1_950_000.0, 1000.0, "A")], None);

        let set = LayerNormalizer::new(unified())
            .normalize_dir(dir.path(), SourceLabel::Demand)
            .unwrap()
            .into_layer()
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records()[0].archive, "zones.shp");
        assert!((set.records()[0].geometry.unsigned_area() - 1_000_000.0).abs() < 1e-6);
        assert_eq!(set.records()[0].text("SIDO_NM"), Some("A"));
    }

    #[test]
    fn attribute_repair_only_touches_text() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("강원도");
        let broken: String = bytes.iter().map(|&b| char::from(b)).collect();
        let attrs = BTreeMap::from([
            ("SIDO_NM".to_string(), AttrValue::Text(broken)),
            ("SIDO_CD".to_string(), AttrValue::Integer(42)),
        ]);
        let repaired = repair_attributes(attrs);
        assert_eq!(repaired["SIDO_NM"], AttrValue::Text("강원도".into()));
        assert_eq!(repaired["SIDO_CD"], AttrValue::Integer(42));
    }
}
