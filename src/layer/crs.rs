use std::{fmt, sync::OnceLock};

use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon, Rect};
use proj4rs::{proj::Proj as Proj4, transform::transform};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A coordinate reference, identified by EPSG code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Crs(u32);

/// Registry entry: EPSG code, PROJ.4 definition, geographic flag, WKT names.
struct CrsDef {
    epsg: u32,
    proj4: &'static str,
    geographic: bool,
    names: &'static [&'static str],
}

const REGISTRY: &[CrsDef] = &[
    CrsDef {
        epsg: 4326,
        proj4: "+proj=longlat +datum=WGS84 +no_defs +type=crs",
        geographic: true,
        names: &["GCS_WGS_1984", "WGS 84", "WGS_1984"],
    },
    CrsDef {
        epsg: 4737,
        proj4: "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs +type=crs",
        geographic: true,
        names: &["GCS_Korea_2000", "Korea 2000", "Korea_2000"],
    },
    CrsDef {
        epsg: 5174,
        proj4: "+proj=tmerc +lat_0=38 +lon_0=127.0028902777778 +k=1 +x_0=200000 +y_0=500000 +ellps=bessel \
                +towgs84=-115.80,474.99,674.11,1.16,-2.31,-1.63,6.43 +units=m +no_defs +type=crs",
        geographic: false,
        names: &["Korean_1985_Modified_Korea_Central_Belt", "Korean 1985 / Modified Central Belt"],
    },
    CrsDef {
        epsg: 5179,
        proj4: "+proj=tmerc +lat_0=38 +lon_0=127.5 +k=0.9996 +x_0=1000000 +y_0=2000000 +ellps=GRS80 \
                +towgs84=0,0,0,0,0,0,0 +units=m +no_defs +type=crs",
        geographic: false,
        names: &["Korea_2000_Korea_Unified_Coordinate_System", "Korea 2000 / Unified CS", "Korea_2000_Unified_CS"],
    },
    CrsDef {
        epsg: 5181,
        proj4: "+proj=tmerc +lat_0=38 +lon_0=127 +k=1 +x_0=200000 +y_0=500000 +ellps=GRS80 \
                +towgs84=0,0,0,0,0,0,0 +units=m +no_defs +type=crs",
        geographic: false,
        names: &["Korea_2000_Korea_Central_Belt", "Korea 2000 / Central Belt"],
    },
    CrsDef {
        epsg: 5186,
        proj4: "+proj=tmerc +lat_0=38 +lon_0=127 +k=1 +x_0=200000 +y_0=600000 +ellps=GRS80 \
                +towgs84=0,0,0,0,0,0,0 +units=m +no_defs +type=crs",
        geographic: false,
        names: &["Korea_2000_Korea_Central_Belt_2010", "Korea 2000 / Central Belt 2010"],
    },
];

/// Lowercase and collapse every run of non-alphanumerics into `_`.
fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

impl Crs {
    /// WGS 84 longitude/latitude.
    pub const WGS84: Crs = Crs(4326);

    #[inline] pub const fn new(epsg: u32) -> Self { Self(epsg) }

    #[inline] pub fn epsg(&self) -> u32 { self.0 }

    fn def(&self) -> Option<&'static CrsDef> {
        REGISTRY.iter().find(|def| def.epsg == self.0)
    }

    /// True if this reference is in the registry and can be reprojected.
    #[inline] pub fn is_known(&self) -> bool { self.def().is_some() }

    /// True for longitude/latitude references (coordinates in degrees).
    #[inline] pub fn is_geographic(&self) -> bool { self.def().is_some_and(|def| def.geographic) }

    /// PROJ.4 definition string.
    pub fn proj4(&self) -> Result<&'static str> {
        self.def()
            .map(|def| def.proj4)
            .ok_or_else(|| anyhow!("no PROJ.4 definition registered for {self}"))
    }

    /// OGC URN, as used in a GeoJSON `crs` member.
    pub fn urn(&self) -> String { format!("urn:ogc:def:crs:EPSG::{}", self.0) }

    /// Parse `urn:ogc:def:crs:EPSG::n` or `EPSG:n`.
    pub fn from_urn(name: &str) -> Option<Self> {
        let code = name.strip_prefix("urn:ogc:def:crs:EPSG::")
            .or_else(|| name.strip_prefix("EPSG:"))?;
        code.trim().parse().ok().map(Self)
    }

    /// Identify the reference described by a `.prj` (WKT) file.
    ///
    /// An EPSG authority on the outermost element wins; otherwise the
    /// outer CRS name is matched against the registry.
    pub fn from_prj_wkt(wkt: &str) -> Option<Self> {
        static OUTER_AUTHORITY: OnceLock<Regex> = OnceLock::new();
        static OUTER_NAME: OnceLock<Regex> = OnceLock::new();

        let authority = OUTER_AUTHORITY.get_or_init(|| {
            Regex::new(r#"(?:AUTHORITY\["EPSG",\s*"(\d+)"\]|ID\["EPSG",\s*(\d+)\])\s*\]\s*$"#)
                .expect("static regex")
        });
        if let Some(caps) = authority.captures(wkt.trim()) {
            let code = caps.get(1).or_else(|| caps.get(2))?;
            return code.as_str().parse().ok().map(Self);
        }

        let name = OUTER_NAME.get_or_init(|| {
            Regex::new(r#"^\s*(?:PROJCS|GEOGCS|PROJCRS|GEOGCRS|GEODCRS)\[\s*"([^"]+)""#)
                .expect("static regex")
        });
        let outer = normalize_name(name.captures(wkt)?.get(1)?.as_str());
        REGISTRY.iter()
            .find(|def| def.names.iter().any(|n| normalize_name(n) == outer))
            .map(|def| Self(def.epsg))
    }

    /// Best guess for a source with no reference metadata: lon/lat if the
    /// bounds fit in degree ranges, otherwise assume it is already in `target`.
    pub fn guess_unset(bounds: Option<Rect<f64>>, target: Crs) -> Self {
        match bounds {
            Some(rect) if rect.min().x >= -180.0 && rect.max().x <= 180.0
                && rect.min().y >= -90.0 && rect.max().y <= 90.0 => Self::WGS84,
            _ => target,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "EPSG:{}", self.0) }
}

/// A prepared transform between two registered references.
pub(crate) struct Reprojector {
    from: Proj4,
    to: Proj4,
    from_geographic: bool,
    to_geographic: bool,
}

impl Reprojector {
    pub(crate) fn new(from: Crs, to: Crs) -> Result<Self> {
        let build = |crs: Crs| -> Result<Proj4> {
            let proj_string = crs.proj4()?;
            Proj4::from_proj_string(proj_string)
                .with_context(|| format!("failed to build PROJ.4 for {crs}: {proj_string}"))
        };

        Ok(Self {
            from: build(from)?,
            to: build(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    /// Transform a single coordinate (degrees at geographic ends, metres otherwise).
    pub(crate) fn project_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&self.from, &self.to, &mut point)
            .with_context(|| format!("CRS transform failed at ({}, {})", coord.x, coord.y))?;

        Ok(if self.to_geographic {
            Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
        } else {
            Coord { x: point.0, y: point.1 }
        })
    }

    /// Transform every ring coordinate of a multipolygon; fails if any point fails.
    pub(crate) fn project(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        shape.try_map_coords(|coord: Coord<f64>| self.project_coord(coord))
    }
}

#[cfg(test)]
mod tests {
    use geo::{coord, polygon};

    use super::*;

    const KOREA_2000_UNIFIED_PRJ: &str = r#"PROJCS["Korea_2000_Korea_Unified_Coordinate_System",GEOGCS["GCS_Korea_2000",DATUM["D_Korea_2000",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",1000000.0],PARAMETER["False_Northing",2000000.0],PARAMETER["Central_Meridian",127.5],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",38.0],UNIT["Meter",1.0]]"#;

    #[test]
    fn esri_prj_matched_by_name() {
        assert_eq!(Crs::from_prj_wkt(KOREA_2000_UNIFIED_PRJ), Some(Crs::new(5179)));
        assert_eq!(
            Crs::from_prj_wkt(r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#),
            Some(Crs::WGS84)
        );
    }

    #[test]
    fn outer_authority_wins_over_inner_ones() {
        let wkt = r#"PROJCS["Some name",GEOGCS["GCS",DATUM["D",SPHEROID["S",1,1],AUTHORITY["EPSG","6737"]],UNIT["degree",0.01745,AUTHORITY["EPSG","9122"]]],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","5186"]]"#;
        assert_eq!(Crs::from_prj_wkt(wkt), Some(Crs::new(5186)));
    }

    #[test]
    fn inner_authority_alone_is_ignored() {
        let wkt = r#"PROJCS["Unregistered",GEOGCS["GCS",UNIT["degree",0.01745,AUTHORITY["EPSG","9122"]]],UNIT["metre",1]]"#;
        assert_eq!(Crs::from_prj_wkt(wkt), None);
    }

    #[test]
    fn urn_round_trip() {
        let crs = Crs::new(5179);
        assert_eq!(Crs::from_urn(&crs.urn()), Some(crs));
        assert_eq!(Crs::from_urn("EPSG:4326"), Some(Crs::WGS84));
        assert_eq!(Crs::from_urn("CRS84"), None);
    }

    #[test]
    fn unset_reference_guess() {
        let lonlat = Rect::new(coord! { x: 126.0, y: 37.0 }, coord! { x: 127.0, y: 38.0 });
        let metric = Rect::new(coord! { x: 950_000.0, y: 1_950_000.0 }, coord! { x: 960_000.0, y: 1_960_000.0 });
        assert_eq!(Crs::guess_unset(Some(lonlat), Crs::new(5179)), Crs::WGS84);
        assert_eq!(Crs::guess_unset(Some(metric), Crs::new(5179)), Crs::new(5179));
        assert_eq!(Crs::guess_unset(None, Crs::new(5179)), Crs::new(5179));
    }

    #[test]
    fn unified_cs_origin_maps_to_false_origin() {
        // Latitude of origin 38N on the central meridian 127.5E is the false origin.
        let reprojector = Reprojector::new(Crs::WGS84, Crs::new(5179)).unwrap();
        let out = reprojector.project_coord(coord! { x: 127.5, y: 38.0 }).unwrap();
        assert!((out.x - 1_000_000.0).abs() < 1.0, "x = {}", out.x);
        assert!((out.y - 2_000_000.0).abs() < 1.0, "y = {}", out.y);
    }

    #[test]
    fn projection_round_trip_is_close() {
        let there = Reprojector::new(Crs::WGS84, Crs::new(5179)).unwrap();
        let back = Reprojector::new(Crs::new(5179), Crs::WGS84).unwrap();
        let shape = MultiPolygon(vec![polygon![
            (x: 126.9, y: 37.5), (x: 127.1, y: 37.5), (x: 127.1, y: 37.7), (x: 126.9, y: 37.7),
        ]]);
        let projected = there.project(&shape).unwrap();
        let restored = back.project(&projected).unwrap();
        for (a, b) in shape.0[0].exterior().coords().zip(restored.0[0].exterior().coords()) {
            assert!((a.x - b.x).abs() < 1e-7 && (a.y - b.y).abs() < 1e-7);
        }
    }

    #[test]
    fn unknown_code_has_no_definition() {
        assert!(!Crs::new(32652).is_known());
        assert!(Crs::new(32652).proj4().is_err());
    }
}
