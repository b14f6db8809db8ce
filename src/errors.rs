//! Centralized error handling for gridzone
//!
//! Every stage returns [`Result`]. Errors that belong to a single unit of work
//! (one source file, one raster) are caught by the stage and recorded in the
//! run report; everything that escapes to `main` aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gridzone operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited table read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// GeoTIFF encoding or decoding errors
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// Shapefile parsing errors
    #[error("Shapefile error: {0}")]
    Shapefile(String),

    /// Directory traversal errors
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Run report serialization errors
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),

    /// Variable not found in NetCDF file
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// Dimension not found in variable
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// Time coordinate that cannot be turned into calendar dates
    #[error("Invalid time axis: {0}")]
    TimeAxis(String),

    /// A file name that does not follow the pipeline's naming grammar
    #[error("Invalid file name '{name}': {reason}")]
    FileName { name: String, reason: String },

    /// A required column is absent from a table
    #[error("Column '{column}' not found in {table}")]
    MissingColumn { column: String, table: String },

    /// A table carries columns other than the identifier and one statistic
    #[error("Unexpected columns in {table}: {message}")]
    ColumnDiscipline { table: String, message: String },

    /// Missing or inconsistent parameters, detected before any work starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raster grids that cannot be combined or are malformed
    #[error("Raster error: {0}")]
    Raster(String),

    /// Geometry layers with unusable shapes or attributes
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A path that was expected to exist
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl From<tiff::TiffError> for PipelineError {
    fn from(e: tiff::TiffError) -> Self {
        PipelineError::Tiff(e.to_string())
    }
}

impl From<shapefile::Error> for PipelineError {
    fn from(e: shapefile::Error) -> Self {
        PipelineError::Shapefile(e.to_string())
    }
}

/// Result type alias for gridzone operations
pub type Result<T> = std::result::Result<T, PipelineError>;
