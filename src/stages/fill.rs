//! Pasting a supplementary raster into a known gap
//!
//! Some source years carry a fixed region of missing cells that focal
//! filling cannot close. This pass resamples a supplementary raster onto the
//! gap window of every daily raster and writes the patched rasters to a
//! separate tree.

use crate::config::{PipelineConfig, Stage};
use crate::discovery::find_rasters;
use crate::engine::{clip, mosaic, resample_onto, MosaicMode};
use crate::errors::{PipelineError, Result};
use crate::raster::{Extent, Raster};
use crate::report::{StageReport, UnitOutcome};
use std::fs;
use std::path::Path;
use tracing::info;

/// Patches every raster under `input` and writes it to
/// `<output>/<var>.<YYYY>/` under the same name.
///
/// # Errors
///
/// Returns an error if no gap fill is configured, the fill raster cannot be
/// read, or `input` does not exist.
pub fn run(config: &PipelineConfig, input: &Path, output: &Path) -> Result<StageReport> {
    let gap = config
        .gap_fill
        .as_ref()
        .ok_or_else(|| PipelineError::Config("no gap fill configured".to_string()))?;
    let fill = Raster::read_geotiff(&gap.fill_raster)?;
    let mut report = StageReport::new(Stage::Fill.as_str());

    let rasters = find_rasters(input, &config.variable)?;
    info!(
        "Filling window {},{},{},{} in {} rasters from {}",
        gap.window.min_x,
        gap.window.min_y,
        gap.window.max_x,
        gap.window.max_y,
        rasters.len(),
        gap.fill_raster.display()
    );

    for (key, path) in rasters {
        let dir = output.join(key.year_dir());
        let target = dir.join(key.file_name());
        if target.exists() {
            report.record(key.file_name(), UnitOutcome::Skipped);
            continue;
        }
        let result = Raster::read_geotiff(&path)
            .and_then(|raster| fill_window(&raster, &fill, &gap.window))
            .and_then(|patched| {
                fs::create_dir_all(&dir)?;
                patched.write_geotiff(&target)
            });
        report.record_result(key.file_name(), result);
    }
    Ok(report)
}

/// Fills the nodata cells of `raster` inside `window` from `fill`.
///
/// The window is clipped from `raster`, `fill` is resampled onto the clipped
/// grid, and the patched window is mosaicked back with priority over the
/// original cells. Valid cells and cells outside the window are unchanged.
///
/// # Errors
///
/// Returns an error if the window does not overlap `raster`.
pub fn fill_window(raster: &Raster, fill: &Raster, window: &Extent) -> Result<Raster> {
    let patch = clip(raster, window)?;
    let resampled = resample_onto(fill, patch.transform, patch.data.dim())?;
    let patched = mosaic(&patch, &resampled, MosaicMode::FillNodata)?;
    mosaic(raster, &patched, MosaicMode::Last)
}
