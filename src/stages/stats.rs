//! Point and zonal statistics per raster

use crate::config::{PipelineConfig, Stage};
use crate::discovery::find_rasters;
use crate::engine::{clip, resample, sample_points, zonal_mean, zonal_mean_split, SampleMethod};
use crate::errors::{PipelineError, Result};
use crate::layer::{Geometry, GeometryLayer};
use crate::naming::{GeometryKind, RasterKey};
use crate::raster::Raster;
use crate::report::{StageReport, UnitOutcome};
use crate::table::{point_table, zonal_table, StatTable};
use geo::Point;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A loaded layer together with the fields the stage reads from it
#[derive(Debug, Clone)]
pub struct StatLayer {
    pub layer: GeometryLayer,
    pub id_field: String,
    /// Polygon layers only
    pub split_field: Option<String>,
}

impl StatLayer {
    /// Wraps a layer after checking it carries the configured fields.
    pub fn new(layer: GeometryLayer, id_field: &str, split_field: Option<&str>) -> Result<Self> {
        layer.require_field(id_field)?;
        if let Some(field) = split_field {
            layer.require_field(field)?;
        }
        Ok(Self {
            layer,
            id_field: id_field.to_string(),
            split_field: split_field.map(str::to_string),
        })
    }

    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        self.layer.kind
    }
}

/// Loads the configured point and polygon layers.
///
/// # Errors
///
/// Fails if a shapefile cannot be read or lacks a configured field; the
/// stage must not start in that case.
pub fn load_layers(config: &PipelineConfig) -> Result<Vec<StatLayer>> {
    let mut layers = Vec::new();
    if let (Some(path), Some(field)) = (&config.points.path, &config.points.id_field) {
        let layer = GeometryLayer::from_shapefile(path, GeometryKind::Point)?;
        layers.push(StatLayer::new(layer, field, None)?);
    }
    if let (Some(path), Some(field)) = (&config.polygons.path, &config.polygons.id_field) {
        let layer = GeometryLayer::from_shapefile(path, GeometryKind::Polygon)?;
        layers.push(StatLayer::new(
            layer,
            field,
            config.polygons.split_field.as_deref(),
        )?);
    }
    if layers.is_empty() {
        return Err(PipelineError::Config(
            "statistics need a point or polygon layer with its identifier field".to_string(),
        ));
    }
    Ok(layers)
}

/// Computes statistics for every raster under `raster_dir` with the
/// configured shapefiles.
pub fn run(config: &PipelineConfig, raster_dir: &Path, table_dir: &Path) -> Result<StageReport> {
    let layers = load_layers(config)?;
    run_with_layers(config, &layers, raster_dir, table_dir)
}

/// Computes statistics for every raster under `raster_dir` and writes one
/// engine-native table per raster and layer to `table_dir`.
///
/// A raster whose raw table or per-date CSV already exists is skipped for
/// that layer.
///
/// # Errors
///
/// Returns an error if `raster_dir` does not exist or `table_dir` cannot be
/// created.
pub fn run_with_layers(
    config: &PipelineConfig,
    layers: &[StatLayer],
    raster_dir: &Path,
    table_dir: &Path,
) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Stats.as_str());
    let rasters = find_rasters(raster_dir, &config.variable)?;
    info!(
        "Computing statistics for {} rasters over {} layers",
        rasters.len(),
        layers.len()
    );
    fs::create_dir_all(table_dir)?;

    for (key, path) in rasters {
        let pending: Vec<&StatLayer> = layers
            .iter()
            .filter(|layer| {
                let raw = table_dir.join(key.table_file_name(layer.kind(), true));
                let csv = table_dir.join(key.table_file_name(layer.kind(), false));
                if raw.exists() || csv.exists() {
                    report.record(raw_unit(&key, layer), UnitOutcome::Skipped);
                    false
                } else {
                    true
                }
            })
            .collect();
        if pending.is_empty() {
            continue;
        }

        let raster = match Raster::read_geotiff(&path) {
            Ok(raster) => raster,
            Err(e) => {
                for layer in pending {
                    report.record(
                        raw_unit(&key, layer),
                        UnitOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
                continue;
            }
        };

        for layer in pending {
            let target = table_dir.join(key.table_file_name(layer.kind(), true));
            let result = layer_table(config, &raster, layer).and_then(|table| {
                debug!("{}: {} rows", target.display(), table.len());
                table.write_csv(&target)
            });
            report.record_result(raw_unit(&key, layer), result);
        }
    }
    Ok(report)
}

fn raw_unit(key: &RasterKey, layer: &StatLayer) -> String {
    key.table_file_name(layer.kind(), true)
}

fn layer_table(config: &PipelineConfig, raster: &Raster, layer: &StatLayer) -> Result<StatTable> {
    match layer.kind() {
        GeometryKind::Point => point_stats(raster, &layer.layer, config.sample_method),
        GeometryKind::Polygon => zonal_stats(
            raster,
            &layer.layer,
            &layer.id_field,
            layer.split_field.as_deref(),
            config.zone_cell_size,
        ),
    }
}

/// Engine-native point table for one raster.
pub fn point_stats(
    raster: &Raster,
    layer: &GeometryLayer,
    method: SampleMethod,
) -> Result<StatTable> {
    let points: Vec<Point<f64>> = layer
        .features
        .iter()
        .filter_map(|f| match f.geometry {
            Geometry::Point(p) => Some(p),
            Geometry::Polygon(_) => None,
        })
        .collect();
    if points.len() != layer.len() {
        return Err(PipelineError::Geometry(format!(
            "point statistics need a point layer, '{}' holds {}s",
            layer.name, layer.kind
        )));
    }
    let values = sample_points(raster, &points, method);
    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        debug!("{} of {} points have no value", missing, points.len());
    }
    point_table(layer, &values)
}

/// Engine-native zonal table for one raster.
///
/// The raster is clipped to the layer's bounding box and resampled to
/// `cell_size` before the zonal means are computed.
pub fn zonal_stats(
    raster: &Raster,
    layer: &GeometryLayer,
    zone_field: &str,
    split_field: Option<&str>,
    cell_size: f64,
) -> Result<StatTable> {
    let clipped = match layer.extent() {
        Some(extent) => clip(raster, &extent).unwrap_or_else(|_| {
            warn!("Layer '{}' lies outside the raster", layer.name);
            raster.clone()
        }),
        None => raster.clone(),
    };
    let fine = resample(&clipped, cell_size)?;
    let stats = match split_field {
        Some(split) => zonal_mean_split(&fine, layer, zone_field, split)?,
        None => zonal_mean(&fine, layer, zone_field)?,
    };
    zonal_table(zone_field, &stats)
}
