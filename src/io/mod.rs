//! Artifact formats, organized by format rather than by stage.
//!
//! - `shp` - raw shapefile features and their `.prj` references
//! - `dbf` - byte-exact dBase text fields
//! - `geojson` - normalized layer containers
//! - `csv` - indicator, supply, and mismatch tables
//! - `svg` - choropleth figures

pub(crate) mod csv;
pub(crate) mod dbf;
pub(crate) mod geojson;
pub(crate) mod shp;
pub mod svg;

pub use csv::{OPPORTUNITY_COLUMN, SUPPLY_COLUMN};
