//! NetCDF sources to daily GeoTIFF rasters

use crate::config::{ExtractionConfig, PipelineConfig, Stage};
use crate::discovery::find_sources;
use crate::engine::{focal_fill, wrap_longitude};
use crate::errors::Result;
use crate::naming::{RasterKey, SourceName};
use crate::netcdf_io::GridSource;
use crate::raster::Raster;
use crate::report::{StageReport, UnitOutcome};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Extracts every time slice of every source under `input` into
/// `<output>/<var>.<YYYY>/<var>_<YYYY>_<MM>_<DD>.tif`.
///
/// Missing or unreadable sources and failing slices are recorded as failed
/// units; existing rasters are skipped.
///
/// # Errors
///
/// Returns an error only if `input` does not exist or `output` cannot be
/// created.
pub fn run(config: &PipelineConfig, input: &Path, output: &Path) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Extract.as_str());
    let listing = find_sources(input, &config.variable, config.years)?;
    info!(
        "Found {} source files for '{}' under {}",
        listing.found.len(),
        config.variable,
        input.display()
    );
    fs::create_dir_all(output)?;

    for (name, path) in &listing.missing {
        report.record(
            name.file_name(),
            UnitOutcome::Failed {
                reason: format!("source not found: {}", path.display()),
            },
        );
    }

    for (name, path) in &listing.found {
        if let Err(e) = extract_source(config, name, path, output, &mut report) {
            report.record(
                name.file_name(),
                UnitOutcome::Failed {
                    reason: e.to_string(),
                },
            );
        }
    }
    Ok(report)
}

/// Extracts the slices of one source; slice outcomes go to `report`.
fn extract_source(
    config: &PipelineConfig,
    name: &SourceName,
    path: &Path,
    output: &Path,
    report: &mut StageReport,
) -> Result<()> {
    let source = GridSource::open(path, &config.variable)?;
    let (rows, cols) = source.grid_shape();
    info!(
        "Extracting {} slices of {}x{} from {}",
        source.len(),
        rows,
        cols,
        source.path().display()
    );

    let mut seen = HashSet::new();
    for (index, &date) in source.dates().iter().enumerate() {
        let key = RasterKey::new(config.variable.clone(), date);
        let unit = key.file_name();
        if !seen.insert(date) {
            report.record(
                unit,
                UnitOutcome::Failed {
                    reason: format!(
                        "{}: time index {} repeats date {}",
                        name.file_name(),
                        index,
                        date
                    ),
                },
            );
            continue;
        }

        let dir = output.join(key.year_dir());
        let target = dir.join(&unit);
        if target.exists() {
            report.record(unit, UnitOutcome::Skipped);
            continue;
        }

        let result = extract_slice(&config.extraction, &source, index).and_then(|raster| {
            fs::create_dir_all(&dir)?;
            raster.write_geotiff(&target)
        });
        if result.is_ok() {
            debug!(index, path = %target.display(), "Wrote slice");
        }
        report.record_result(unit, result);
    }
    Ok(())
}

/// Reads one time slice and applies the configured longitude wrap and gap
/// filling.
pub fn extract_slice(
    config: &ExtractionConfig,
    source: &GridSource,
    index: usize,
) -> Result<Raster> {
    let mut raster = source.read_slice(index)?;
    if config.wrap_longitude {
        raster = wrap_longitude(&raster)?;
    }
    if config.fill_gaps {
        let gaps = raster.nodata_count();
        if gaps > 0 {
            raster = focal_fill(&raster, config.neighborhood)?;
            debug!(
                "Slice {}: filled {} of {} nodata cells",
                index,
                gaps - raster.nodata_count(),
                gaps
            );
        }
    }
    Ok(raster)
}
