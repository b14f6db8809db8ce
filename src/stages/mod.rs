//! Stage drivers
//!
//! Each stage walks its input directory, turns every matching file into a
//! unit of work and records the unit's outcome in a
//! [`StageReport`](crate::report::StageReport). Stages communicate only
//! through the file system, using the names defined in [`crate::naming`].
//!
//! # Organization
//!
//! - [`extract`]: NetCDF sources to daily GeoTIFF rasters
//! - [`fill`]: pasting a supplementary raster into a known gap
//! - [`stats`]: point and zonal statistics per raster
//! - [`convert`]: engine-native tables to per-date CSVs
//! - [`merge`]: per-date CSVs to one time series per geometry kind

pub mod convert;
pub mod extract;
pub mod fill;
pub mod merge;
pub mod stats;

use crate::config::{PipelineConfig, Stage};
use crate::errors::Result;
use crate::report::RunReport;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directories used by a full run, all below the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub rasters: PathBuf,
    /// Present when a gap-fill pass is configured
    pub filled: Option<PathBuf>,
    pub tables: PathBuf,
    pub merged: PathBuf,
}

impl Layout {
    #[must_use]
    pub fn new(output_dir: &Path, with_fill: bool) -> Self {
        Self {
            rasters: output_dir.join("rasters"),
            filled: with_fill.then(|| output_dir.join("filled")),
            tables: output_dir.join("tables"),
            merged: output_dir.to_path_buf(),
        }
    }

    /// Rasters the statistics stage reads
    #[must_use]
    pub fn stats_input(&self) -> &Path {
        self.filled.as_deref().unwrap_or(&self.rasters)
    }
}

/// Stages executed by [`run_all`] for a configuration
#[must_use]
pub fn run_stages(config: &PipelineConfig) -> Vec<Stage> {
    let mut stages = vec![Stage::Extract];
    if config.gap_fill.is_some() {
        stages.push(Stage::Fill);
    }
    stages.extend([Stage::Stats, Stage::Convert, Stage::Merge]);
    stages
}

/// Runs every stage in order with one configuration.
///
/// Unit failures are collected in the report; only errors that abort a
/// whole stage are returned.
pub fn run_all(config: &PipelineConfig) -> Result<RunReport> {
    let layout = Layout::new(&config.output_dir, config.gap_fill.is_some());
    let mut report = RunReport::default();

    for stage in run_stages(config) {
        info!("Starting stage: {}", stage);
        let stage_report = match stage {
            Stage::Extract => extract::run(config, &config.input_dir, &layout.rasters)?,
            Stage::Fill => match &layout.filled {
                Some(filled) => fill::run(config, &layout.rasters, filled)?,
                None => continue,
            },
            Stage::Stats => stats::run(config, layout.stats_input(), &layout.tables)?,
            Stage::Convert => convert::run(config, &layout.tables)?,
            Stage::Merge => merge::run(config, &layout.tables, &layout.merged)?,
        };
        report.push(stage_report);
    }
    Ok(report)
}
