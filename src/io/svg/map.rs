use std::{io::Write, path::Path};

use anyhow::{anyhow, Result};
use geo::{BoundingRect, Coord, MultiPolygon, Rect};
use tracing::info;

use super::{color::Palette, draw, writer::SvgWriter};
use crate::error::PipelineError;

const TITLE_BAND: f64 = 40.0;
const LEGEND_BAND: f64 = 60.0;

/// Per-call presentation settings for one choropleth.
#[derive(Clone, Debug, PartialEq)]
pub struct ChoroplethStyle {
    /// Total image width in pixels; the height follows the map's aspect ratio.
    pub width: f64,
    pub margin: f64,
    pub palette: Palette,
    /// Region outline color (any CSS color).
    pub stroke: String,
    pub title: String,
    pub legend_label: String,
    pub north_arrow: bool,
    /// Scale bar length in map units (metres in a projected reference); `None` omits it.
    pub scale_bar_m: Option<f64>,
}

impl Default for ChoroplethStyle {
    fn default() -> Self {
        Self {
            width: 1200.0,
            margin: 20.0,
            palette: Palette::Viridis,
            stroke: "#cccccc".to_string(),
            title: String::new(),
            legend_label: String::new(),
            north_arrow: true,
            scale_bar_m: Some(100_000.0),
        }
    }
}

impl ChoroplethStyle {
    /// Sequential map of the opportunity index.
    pub fn opportunity() -> Self {
        Self {
            title: "ZEB Opportunity Index".to_string(),
            legend_label: "ZEB Opportunity Index (0-100)".to_string(),
            ..Self::default()
        }
    }

    /// Diverging map of the mismatch index.
    pub fn mismatch() -> Self {
        Self {
            palette: Palette::RedBlue,
            title: "Spatiotemporal Innovation Mismatch".to_string(),
            legend_label: "Mismatch Index (Demand - Supply)".to_string(),
            ..Self::default()
        }
    }
}

fn bounds(geoms: &[MultiPolygon<f64>]) -> Option<Rect<f64>> {
    geoms.iter()
        .filter_map(|geom| geom.bounding_rect())
        .reduce(|a, b| Rect::new(
            Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        ))
}

/// Draw `geoms` filled by `values` (one per geometry) to an SVG file.
pub fn write_choropleth_svg(path: &Path, geoms: &[MultiPolygon<f64>], values: &[f64], style: &ChoroplethStyle) -> Result<()> {
    if geoms.len() != values.len() {
        return Err(PipelineError::InvalidInput(format!(
            "{} values for {} geometries", values.len(), geoms.len()
        )).into());
    }
    let bounds = bounds(geoms)
        .ok_or_else(|| anyhow!("[io::svg] Could not determine bounds; nothing to draw."))?;

    let margin = style.margin;
    let width = style.width;
    let extent = bounds.width().max(bounds.height()).max(f64::EPSILON);
    let scale = (width - 2.0 * margin) / bounds.width().max(extent * 1e-3);
    let map_height = bounds.height() * scale;
    let height = map_height + TITLE_BAND + LEGEND_BAND + 2.0 * margin;
    let top = margin + TITLE_BAND;

    // Preserve aspect, Y down
    let project = move |coord: &Coord<f64>| -> (f64, f64) {
        let x = margin + (coord.x - bounds.min().x) * scale;
        let y = top + (bounds.max().y - coord.y) * scale;
        (x, y)
    };

    let domain = style.palette.domain(values).unwrap_or((0.0, 0.0));
    let colors = values.iter()
        .map(|&value| style.palette.color(value, domain))
        .collect::<Vec<_>>();

    let mut writer = SvgWriter::new(path)?;
    writer.write_header(width, height, &bounds)?;
    writer.write_styles(&style.stroke)?;

    if !style.title.is_empty() {
        draw::draw_title(&mut writer, &style.title, width / 2.0, margin + TITLE_BAND * 0.6)?;
    }
    draw::draw_polygons_with_fill(&mut writer, geoms, &colors, &project)?;

    if style.north_arrow {
        draw::draw_north_arrow(&mut writer, width - margin - 16.0, top + 12.0)?;
    }
    if let Some(length) = style.scale_bar_m.filter(|&length| length > 0.0) {
        draw::draw_scale_bar(&mut writer, length, scale, margin + 10.0, top + map_height - 10.0)?;
    }

    let legend_width = (width - 2.0 * margin).min(400.0);
    draw::draw_legend(
        &mut writer,
        style.palette,
        domain,
        &style.legend_label,
        ((width - legend_width) / 2.0, top + map_height + 16.0, legend_width),
    )?;

    writer.write_footer()?;
    writer.flush()?;

    info!("[io::svg] wrote choropleth of {} regions to {}", geoms.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use geo::polygon;
    use tempfile::tempdir;

    use super::*;

    fn square(x: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![(x: x, y: 0.0), (x: x + size, y: 0.0), (x: x + size, y: size), (x: x, y: size)]])
    }

    #[test]
    fn writes_regions_and_furniture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.svg");
        let geoms = vec![square(0.0, 100_000.0), square(100_000.0, 100_000.0)];
        let style = ChoroplethStyle { title: "Index & Rank".to_string(), ..ChoroplethStyle::opportunity() };

        write_choropleth_svg(&path, &geoms, &[10.0, f64::NAN], &style).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches(r#"class="region""#).count(), 2);
        assert!(svg.contains("#969696"));
        assert!(svg.contains("Index &amp; Rank"));
        assert!(svg.contains(">N</text>"));
        assert!(svg.contains("100 km"));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let err = write_choropleth_svg(&dir.path().join("x.svg"), &[square(0.0, 1.0)], &[], &ChoroplethStyle::default())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn empty_map_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(write_choropleth_svg(&dir.path().join("x.svg"), &[], &[], &ChoroplethStyle::mismatch()).is_err());
    }
}
