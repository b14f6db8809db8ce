//! gridzone: gridded climate data to point and zonal time series
//!
//! A batch pipeline that turns yearly NetCDF grids into daily GeoTIFF
//! rasters, computes point samples and zonal means against shapefile layers,
//! and merges the per-date results into one time series table per geometry
//! kind.
//!
//! ## Key Features
//!
//! - **CF Time Decoding**: Slice dates come from the time axis units and calendar
//! - **Gap Filling**: Focal-mean filling and supplementary-raster patching
//! - **Point and Zonal Statistics**: Nearest or bilinear sampling, split-aware zonal means
//! - **Idempotent Stages**: Existing outputs are skipped, so interrupted runs resume
//! - **Parallel Processing**: Per-cell and per-zone work runs on a Rayon pool
//! - **Run Reports**: Every unit of work ends as done, skipped or failed
//!
//! ## Module Organization
//!
//! - [`naming`]: File name grammar shared by every stage
//! - [`calendar`]: CF time units and calendars
//! - [`netcdf_io`]: Decoding grid slices from NetCDF sources
//! - [`metadata`]: Source file inspection
//! - [`raster`]: In-memory rasters and GeoTIFF I/O
//! - [`layer`]: Point and polygon layers read from shapefiles
//! - [`engine`]: Resampling, gap filling, sampling and zonal statistics
//! - [`table`]: Statistics tables and normalization
//! - [`merge`]: Combining per-date tables
//! - [`discovery`]: Locating stage inputs
//! - [`stages`]: The stage drivers
//! - [`config`]: Pipeline configuration
//! - [`report`]: Per-unit outcomes
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use gridzone::prelude::*;
//!
//! let mut config = PipelineConfig::new("data/prate", "out");
//! config.polygons.path = Some("zones.shp".into());
//! config.polygons.id_field = Some("ZONE_ID".to_string());
//! config.validate(&gridzone::stages::run_stages(&config)).unwrap();
//!
//! let report = gridzone::stages::run_all(&config).unwrap();
//! report.log_summary();
//! ```

// Core modules
pub mod calendar;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod layer;
pub mod merge;
pub mod metadata;
pub mod naming;
pub mod netcdf_io;
pub mod parallel;
pub mod raster;
pub mod report;
pub mod stages;
pub mod table;

pub use errors::{PipelineError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::{PipelineConfig, Stage, YearRange};
    pub use crate::errors::{PipelineError, Result};
    pub use crate::layer::{Feature, Geometry, GeometryLayer};
    pub use crate::merge::{MergeStrategy, MergedTable};
    pub use crate::naming::{GeometryKind, RasterKey};
    pub use crate::netcdf_io::GridSource;
    pub use crate::parallel::ParallelConfig;
    pub use crate::raster::{Extent, GeoTransform, Raster};
    pub use crate::report::{RunReport, UnitOutcome};
    pub use crate::table::StatTable;
}
