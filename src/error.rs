use std::path::PathBuf;

use thiserror::Error;

use crate::layer::Crs;

/// Failure taxonomy shared by every pipeline stage.
///
/// Functions return `anyhow::Result`; these variants travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<PipelineError>()`.
/// Degenerate numeric cases are not represented here: they resolve to
/// documented fallback values.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required prior-stage artifact or raw-data directory is absent.
    #[error("missing input ({what}): {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    /// A single archive, shapefile, or feature could not be read.
    #[error("unreadable feature in {}: {reason}", path.display())]
    UnreadableFeature { path: PathBuf, reason: String },

    /// An input table lacks a column the stage needs.
    #[error("table {table:?} is missing required column {column:?}")]
    SchemaMismatch { table: String, column: String },

    /// Geometries that must share a coordinate reference do not.
    #[error("coordinate reference mismatch: expected {expected}, found {found}")]
    CrsMismatch { expected: Crs, found: Crs },

    /// Argument shapes or values that violate an operation's contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
