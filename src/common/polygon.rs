use geo::{Coord, LineString, MultiPolygon, Polygon};
use shapefile::{PolygonRing, Shape};

/// Coerce a shapefile shape into an owned multipolygon; `None` for null or non-polygon shapes.
pub(crate) fn shape_to_multipolygon(shape: &Shape) -> Option<MultiPolygon<f64>> {
    match shape {
        Shape::Polygon(p) => Some(rings_to_multipolygon(
            p.rings().iter().map(|ring| ring_coords(ring, |pt| Coord { x: pt.x, y: pt.y })),
        )),
        Shape::PolygonM(p) => Some(rings_to_multipolygon(
            p.rings().iter().map(|ring| ring_coords(ring, |pt| Coord { x: pt.x, y: pt.y })),
        )),
        Shape::PolygonZ(p) => Some(rings_to_multipolygon(
            p.rings().iter().map(|ring| ring_coords(ring, |pt| Coord { x: pt.x, y: pt.y })),
        )),
        _ => None,
    }
}

/// Flatten one shapefile ring into `(coords, is_exterior)`.
fn ring_coords<P>(ring: &PolygonRing<P>, xy: impl Fn(&P) -> Coord<f64>) -> (Vec<Coord<f64>>, bool) {
    match ring {
        PolygonRing::Outer(points) => (points.iter().map(&xy).collect(), true),
        PolygonRing::Inner(points) => (points.iter().map(&xy).collect(), false),
    }
}

/// Group rings into polygons: each exterior owns the holes that follow it
/// (Shapefile stores rings in that order). Holes before any exterior are dropped.
pub(crate) fn rings_to_multipolygon(rings: impl Iterator<Item = (Vec<Coord<f64>>, bool)>) -> MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn closed(mut coords: Vec<Coord<f64>>) -> LineString<f64> {
        if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
            if first != last { coords.push(first) }
        }
        LineString(coords)
    }

    let mut polys: Vec<Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<LineString<f64>> = None;
    let mut current_holes: Vec<LineString<f64>> = Vec::new();

    for (coords, is_exterior) in rings {
        if coords.len() < 3 { continue }
        if is_exterior {
            // flush previous polygon
            if let Some(ext) = current_exterior.take() {
                polys.push(Polygon::new(ext, std::mem::take(&mut current_holes)));
            }
            current_exterior = Some(closed(coords));
        } else if current_exterior.is_some() {
            current_holes.push(closed(coords));
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(Polygon::new(ext, current_holes));
    }

    MultiPolygon(polys)
}
