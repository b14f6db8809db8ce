//! Grid geometry operations: resampling, clipping, longitude wrapping

use crate::errors::{PipelineError, Result};
use crate::raster::{Extent, GeoTransform, Raster};
use ndarray::{concatenate, s, Array2, Axis};
use rayon::prelude::*;
use tracing::debug;

/// Tolerance, in cells, for snapping extents onto a grid
const SNAP_EPSILON: f64 = 1e-6;

/// Nearest-neighbour resample of `source` onto the grid described by
/// `transform` and `shape`. Target cells whose centre falls outside the
/// source, or on a source nodata cell, become nodata.
///
/// # Errors
///
/// Returns an error if the target grid is empty.
pub fn resample_onto(
    source: &Raster,
    transform: GeoTransform,
    shape: (usize, usize),
) -> Result<Raster> {
    let (nrows, ncols) = shape;
    if nrows == 0 || ncols == 0 {
        return Err(PipelineError::Raster(
            "cannot resample onto an empty grid".to_string(),
        ));
    }

    let values: Vec<f32> = (0..nrows * ncols)
        .into_par_iter()
        .map(|flat_idx| {
            let (x, y) = transform.cell_center(flat_idx / ncols, flat_idx % ncols);
            source.value_at(x, y).unwrap_or(source.nodata)
        })
        .collect();

    Ok(Raster::new(
        Array2::from_shape_vec((nrows, ncols), values)?,
        transform,
        source.nodata,
    ))
}

/// Resamples `source` to square cells of `cell_size` over its own extent.
///
/// # Errors
///
/// Returns an error if `cell_size` is not a positive finite number.
pub fn resample(source: &Raster, cell_size: f64) -> Result<Raster> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(PipelineError::Raster(format!("invalid cell size {cell_size}")));
    }
    let extent = source.extent();
    let ncols = cells_across(extent.width(), cell_size);
    let nrows = cells_across(extent.height(), cell_size);
    debug!(
        "Resampling {}x{} raster to {}x{} at {}",
        source.nrows(),
        source.ncols(),
        nrows,
        ncols,
        cell_size
    );
    let transform = GeoTransform::new(extent.min_x, extent.max_y, cell_size, cell_size);
    resample_onto(source, transform, (nrows, ncols))
}

fn cells_across(length: f64, cell_size: f64) -> usize {
    ((length / cell_size) - SNAP_EPSILON).ceil().max(1.0) as usize
}

/// Cuts the cells of `source` that intersect `window`, snapped outwards to
/// the source grid.
///
/// # Errors
///
/// Returns an error if the window does not overlap the raster.
pub fn clip(source: &Raster, window: &Extent) -> Result<Raster> {
    let t = &source.transform;
    let clamp = |v: f64, max: usize| (v.max(0.0) as usize).min(max);

    let (nrows, ncols) = (source.nrows(), source.ncols());
    let col_start = clamp(
        ((window.min_x - t.origin_x) / t.cell_width + SNAP_EPSILON).floor(),
        ncols,
    );
    let col_end = clamp(
        ((window.max_x - t.origin_x) / t.cell_width - SNAP_EPSILON).ceil(),
        ncols,
    );
    let row_start = clamp(
        ((t.origin_y - window.max_y) / t.cell_height + SNAP_EPSILON).floor(),
        nrows,
    );
    let row_end = clamp(
        ((t.origin_y - window.min_y) / t.cell_height - SNAP_EPSILON).ceil(),
        nrows,
    );

    if col_start >= col_end || row_start >= row_end {
        return Err(PipelineError::Raster(format!(
            "window {},{},{},{} does not overlap the raster",
            window.min_x, window.min_y, window.max_x, window.max_y
        )));
    }

    let data = source
        .data
        .slice(s![row_start..row_end, col_start..col_end])
        .to_owned();
    let transform = GeoTransform::new(
        t.origin_x + col_start as f64 * t.cell_width,
        t.origin_y - row_start as f64 * t.cell_height,
        t.cell_width,
        t.cell_height,
    );
    Ok(Raster::new(data, transform, source.nodata))
}

/// Rolls a 0..360 longitude grid so that it spans -180..180.
///
/// Rasters whose extent already ends at or before 180 degrees east are
/// returned unchanged.
///
/// # Errors
///
/// Returns an error if the rolled halves cannot be joined.
pub fn wrap_longitude(source: &Raster) -> Result<Raster> {
    if source.extent().max_x <= 180.0 + SNAP_EPSILON {
        return Ok(source.clone());
    }
    let t = &source.transform;
    let Some(split) = (0..source.ncols()).find(|&col| t.cell_center(0, col).0 >= 180.0) else {
        return Ok(source.clone());
    };
    if split == 0 {
        let mut shifted = source.clone();
        shifted.transform.origin_x -= 360.0;
        return Ok(shifted);
    }

    let data = concatenate(
        Axis(1),
        &[
            source.data.slice(s![.., split..]),
            source.data.slice(s![.., ..split]),
        ],
    )?;
    let transform = GeoTransform::new(
        t.origin_x + split as f64 * t.cell_width - 360.0,
        t.origin_y,
        t.cell_width,
        t.cell_height,
    );
    Ok(Raster::new(data, transform, source.nodata))
}
