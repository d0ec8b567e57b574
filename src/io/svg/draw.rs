use std::io::Write;

use anyhow::Result;
use geo::{Coord, CoordsIter, LineString, MultiPolygon};

use super::color::{Palette, Rgb};

/// Projection function: map coordinates -> SVG coords (x,y)
pub(crate) type Projection = dyn Fn(&Coord<f64>) -> (f64, f64);

/// Draw each MultiPolygon as one path (exteriors and holes) with its fill.
pub(crate) fn draw_polygons_with_fill(
    writer: &mut impl Write,
    polygons: &[MultiPolygon<f64>],
    colors: &[Rgb],
    project: &Projection,
) -> Result<()> {
    for (polygon, color) in polygons.iter().zip(colors) {
        writeln!(
            writer,
            r#"<path class="region" fill-rule="evenodd" fill="{color}" d="{}"/>"#,
            multipolygon_to_path(polygon, project)
        )?;
    }
    Ok(())
}

/// Build a compact SVG path string for a MultiPolygon (exteriors + holes).
fn multipolygon_to_path(shape: &MultiPolygon<f64>, project: &Projection) -> String {
    let mut out = String::new();

    for polygon in &shape.0 {
        ring_to_path(polygon.exterior(), project, &mut out);
        for interior in polygon.interiors() {
            ring_to_path(interior, project, &mut out);
        }
    }

    out
}

/// Append a ring as an SVG subpath: "M x,y L x,y ... Z"
fn ring_to_path(ring: &LineString<f64>, project: &Projection, out: &mut String) {
    let mut coords = ring.coords_iter().map(|coord| project(&coord));
    if let Some((x, y)) = coords.next() {
        out.push_str(&format!(" M{x:.3},{y:.3}"));
        for (x, y) in coords {
            out.push_str(&format!(" L{x:.3},{y:.3}"));
        }
        out.push('Z');
    }
}

pub(crate) fn draw_title(writer: &mut impl Write, title: &str, x: f64, y: f64) -> Result<()> {
    writeln!(writer, r#"<text class="title" x="{x:.1}" y="{y:.1}" text-anchor="middle">{}</text>"#, escape(title))?;
    Ok(())
}

/// Horizontal gradient bar with end labels.
pub(crate) fn draw_legend(
    writer: &mut impl Write,
    palette: Palette,
    (lo, hi): (f64, f64),
    label: &str,
    (x, y, width): (f64, f64, f64),
) -> Result<()> {
    const STOPS: usize = 10;
    writeln!(writer, r#"<defs><linearGradient id="legend-ramp" x1="0" x2="1" y1="0" y2="0">"#)?;
    for i in 0..=STOPS {
        let t = i as f64 / STOPS as f64;
        writeln!(writer, r#"  <stop offset="{t:.2}" stop-color="{}"/>"#, palette.at(t))?;
    }
    writeln!(writer, "</linearGradient></defs>")?;
    writeln!(writer, r##"<rect x="{x:.1}" y="{y:.1}" width="{width:.1}" height="12" fill="url(#legend-ramp)" stroke="#111827" stroke-width="0.5"/>"##)?;
    writeln!(writer, r#"<text class="label" x="{x:.1}" y="{:.1}" text-anchor="start">{}</text>"#, y + 26.0, format_value(lo))?;
    writeln!(writer, r#"<text class="label" x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"#, x + width, y + 26.0, format_value(hi))?;
    writeln!(writer, r#"<text class="label" x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#, x + width / 2.0, y + 26.0, escape(label))?;
    Ok(())
}

/// Upward arrow with an "N" above it, tip at (x, y).
pub(crate) fn draw_north_arrow(writer: &mut impl Write, x: f64, y: f64) -> Result<()> {
    writeln!(writer, r#"<text class="label" x="{x:.1}" y="{y:.1}" text-anchor="middle">N</text>"#)?;
    writeln!(
        writer,
        r#"<polygon class="furniture" points="{x:.1},{:.1} {:.1},{:.1} {x:.1},{:.1} {:.1},{:.1}"/>"#,
        y + 4.0,
        x + 8.0, y + 28.0,
        y + 22.0,
        x - 8.0, y + 28.0,
    )?;
    Ok(())
}

/// Bar of `length_m` map units drawn `length_m * scale` pixels long, left end at (x, y).
pub(crate) fn draw_scale_bar(writer: &mut impl Write, length_m: f64, scale: f64, x: f64, y: f64) -> Result<()> {
    let px = length_m * scale;
    writeln!(writer, r#"<line class="furniture" x1="{x:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}"/>"#, x + px)?;
    for tick in [x, x + px] {
        writeln!(writer, r#"<line class="furniture" x1="{tick:.1}" y1="{:.1}" x2="{tick:.1}" y2="{:.1}"/>"#, y - 4.0, y + 4.0)?;
    }
    let text = if length_m >= 1000.0 {
        format!("{} km", length_m / 1000.0)
    } else {
        format!("{length_m} m")
    };
    writeln!(writer, r#"<text class="label" x="{:.1}" y="{:.1}" text-anchor="middle">{text}</text>"#, x + px / 2.0, y - 8.0)?;
    Ok(())
}

fn format_value(value: f64) -> String {
    if value.abs() >= 10.0 { format!("{value:.0}") } else { format!("{value:.2}") }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
