//! In-crate geospatial engine
//!
//! The raster and vector operations the pipeline relies on, implemented over
//! [`Raster`](crate::raster::Raster) and
//! [`GeometryLayer`](crate::layer::GeometryLayer). Per-cell and per-zone work
//! runs on the global rayon pool configured through
//! [`ParallelConfig`](crate::parallel::ParallelConfig).
//!
//! # Organization
//!
//! - [`grid`]: nearest-neighbour resampling, clipping and longitude wrapping
//! - [`fill`]: focal means, gap filling and mosaicking
//! - [`sample`]: point sampling
//! - [`zonal`]: zonal means and attribute splits

pub mod fill;
pub mod grid;
pub mod sample;
pub mod zonal;

pub use fill::{focal_fill, focal_mean, mosaic, MosaicMode, Neighborhood};
pub use grid::{clip, resample, resample_onto, wrap_longitude};
pub use sample::{sample_points, SampleMethod};
pub use zonal::{split_by_attribute, zonal_mean, zonal_mean_split, ZoneStat};
