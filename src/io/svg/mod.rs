//! SVG choropleth export.

mod color;
mod draw;
mod map;
mod writer;

pub use color::Palette;
pub use map::{write_choropleth_svg, ChoroplethStyle};
