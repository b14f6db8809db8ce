//! Zonal statistics over polygon layers

use crate::errors::{PipelineError, Result};
use crate::layer::{Geometry, GeometryLayer};
use crate::naming::GeometryKind;
use crate::raster::Raster;
use geo::{BoundingRect, Contains, MultiPolygon, Point, Polygon};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Mean of the valid cells of one zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStat {
    /// Zone field value in text form
    pub zone: String,
    /// Valid cells whose centre lies in the zone
    pub count: usize,
    /// Area of the counted cells, in squared map units
    pub area: f64,
    /// `None` when the zone holds no valid cell
    pub mean: Option<f64>,
}

/// Features sharing a zone value, merged into one multipolygon
fn collect_zones(
    layer: &GeometryLayer,
    zone_field: &str,
) -> Result<Vec<(String, MultiPolygon<f64>)>> {
    if layer.kind != GeometryKind::Polygon {
        return Err(PipelineError::Geometry(format!(
            "zonal statistics need a polygon layer, '{}' holds {}s",
            layer.name, layer.kind
        )));
    }
    layer.require_field(zone_field)?;

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut zones: Vec<(String, Vec<Polygon<f64>>)> = Vec::new();
    for feature in &layer.features {
        let Geometry::Polygon(shape) = &feature.geometry else {
            continue;
        };
        let zone = feature.attribute(zone_field).to_string();
        let slot = *index.entry(zone.clone()).or_insert_with(|| {
            zones.push((zone, Vec::new()));
            zones.len() - 1
        });
        zones[slot].1.extend(shape.0.iter().cloned());
    }
    Ok(zones
        .into_iter()
        .map(|(zone, polygons)| (zone, MultiPolygon(polygons)))
        .collect())
}

/// Mean of the valid raster cells whose centre lies inside each zone.
///
/// Zones are reported in order of first appearance in the layer. Nodata
/// cells are ignored.
///
/// # Errors
///
/// Returns an error if the layer is not a polygon layer or lacks
/// `zone_field`.
pub fn zonal_mean(
    raster: &Raster,
    layer: &GeometryLayer,
    zone_field: &str,
) -> Result<Vec<ZoneStat>> {
    let zones = collect_zones(layer, zone_field)?;
    let t = raster.transform;
    let cell_area = t.cell_width * t.cell_height;
    debug!(
        "Zonal mean of {} zones over {}x{} cells",
        zones.len(),
        raster.nrows(),
        raster.ncols()
    );

    let stats = zones
        .par_iter()
        .map(|(zone, shape)| {
            let mut sum = 0.0_f64;
            let mut count = 0_usize;
            if let Some(bounds) = shape.bounding_rect() {
                let (row_top, col_left) = t.cell_index(bounds.min().x, bounds.max().y);
                let (row_bottom, col_right) = t.cell_index(bounds.max().x, bounds.min().y);
                let rows = row_top.max(0)..=row_bottom.min(raster.nrows() as i64 - 1);
                for row in rows {
                    let cols = col_left.max(0)..=col_right.min(raster.ncols() as i64 - 1);
                    for col in cols {
                        let Some(value) = raster.get(row, col) else {
                            continue;
                        };
                        let (x, y) = t.cell_center(row as usize, col as usize);
                        if shape.contains(&Point::new(x, y)) {
                            sum += f64::from(value);
                            count += 1;
                        }
                    }
                }
            }
            ZoneStat {
                zone: zone.clone(),
                count,
                area: count as f64 * cell_area,
                mean: (count > 0).then(|| sum / count as f64),
            }
        })
        .collect();
    Ok(stats)
}

/// Splits a layer into one layer per distinct value of `field`, ordered by
/// the value's text form.
///
/// # Errors
///
/// Returns an error if the layer lacks `field`.
pub fn split_by_attribute(
    layer: &GeometryLayer,
    field: &str,
) -> Result<Vec<(String, GeometryLayer)>> {
    layer.require_field(field)?;
    let mut parts: BTreeMap<String, GeometryLayer> = BTreeMap::new();
    for feature in &layer.features {
        let value = feature.attribute(field).to_string();
        parts
            .entry(value.clone())
            .or_insert_with(|| {
                GeometryLayer::new(format!("{}_{}", layer.name, value), layer.kind)
            })
            .push(feature.clone())?;
    }
    Ok(parts.into_iter().collect())
}

/// Zonal means computed per split layer, then recombined.
///
/// The split tables are concatenated in split order and re-sorted into the
/// zone order of the unsplit layer, so the result matches [`zonal_mean`] on
/// the whole layer when zone values do not straddle split values.
///
/// # Errors
///
/// Returns an error if the layer lacks either field.
pub fn zonal_mean_split(
    raster: &Raster,
    layer: &GeometryLayer,
    zone_field: &str,
    split_field: &str,
) -> Result<Vec<ZoneStat>> {
    let order: HashMap<String, usize> = collect_zones(layer, zone_field)?
        .into_iter()
        .enumerate()
        .map(|(position, (zone, _))| (zone, position))
        .collect();

    let mut combined = Vec::new();
    for (value, part) in split_by_attribute(layer, split_field)? {
        debug!("Split '{}' = '{}': {} features", split_field, value, part.len());
        combined.extend(zonal_mean(raster, &part, zone_field)?);
    }
    combined.sort_by_key(|stat| order.get(&stat.zone).copied().unwrap_or(usize::MAX));
    Ok(combined)
}
