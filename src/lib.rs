#![doc = "ZEB opportunity and supply/demand mismatch analysis over administrative regions"]
mod common;
mod error;
mod io;

pub mod config;
pub mod layer;
pub mod mcda;
pub mod mismatch;
pub mod pipeline;
pub mod region;
pub mod rescale;
pub mod zonal;

#[doc(inline)]
pub use config::PipelineConfig;

#[doc(inline)]
pub use error::PipelineError;

#[doc(inline)]
pub use io::{svg::{write_choropleth_svg, ChoroplethStyle, Palette}, OPPORTUNITY_COLUMN, SUPPLY_COLUMN};

#[doc(inline)]
pub use pipeline::{mismatch, opportunity, preprocess, run_all};
