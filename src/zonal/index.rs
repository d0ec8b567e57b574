use geo::{Area, BooleanOps, BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// A bounding box in an R-tree, associated with a MultiPolygon by index.
#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize, // Index of corresponding MultiPolygon in shapes
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// The features of one category, indexed by bounding box for overlay queries.
#[derive(Debug, Clone)]
pub(crate) struct FeatureIndex {
    shapes: Vec<MultiPolygon<f64>>,
    rtree: RTree<BoundingBox>,
}

impl FeatureIndex {
    /// Construct an index over the given MultiPolygons (empty shapes are dropped).
    pub(crate) fn new<'a>(shapes: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let shapes = shapes.into_iter()
            .filter(|shape| shape.bounding_rect().is_some())
            .cloned()
            .collect::<Vec<_>>();

        Self {
            rtree: RTree::bulk_load(
                shapes.iter().enumerate()
                    .filter_map(|(idx, shape)| shape.bounding_rect().map(|bbox| BoundingBox { idx, bbox }))
                    .collect()
            ),
            shapes,
        }
    }

    #[inline] pub(crate) fn len(&self) -> usize { self.shapes.len() }

    /// Area of `zone` covered by the union of all indexed features.
    ///
    /// Each candidate is clipped to the zone first and the clipped pieces are
    /// unioned, so overlapping features are counted once and the result never
    /// exceeds the zone's own area (up to float tolerance).
    pub(crate) fn covered_area(&self, zone: &MultiPolygon<f64>) -> f64 {
        let Some(rect) = zone.bounding_rect() else { return 0.0 };
        let envelope = AABB::from_corners(rect.min().into(), rect.max().into());

        // Visit candidates in index order so the union is deterministic.
        let mut candidates = self.rtree.locate_in_envelope_intersecting(&envelope)
            .map(|bbox| bbox.idx)
            .collect::<Vec<_>>();
        candidates.sort_unstable();

        candidates.into_iter()
            .map(|idx| self.shapes[idx].intersection(zone))
            .filter(|clipped| !clipped.0.is_empty())
            .reduce(|a, b| a.union(&b))
            .map_or(0.0, |covered| covered.unsigned_area())
    }
}
