//! Focal statistics and mosaicking

use crate::errors::{PipelineError, Result};
use crate::raster::Raster;
use ndarray::Array2;
use rayon::prelude::*;
use std::ops::RangeInclusive;

/// Rectangular focal neighbourhood, in cells
///
/// For an even size the extra cell lies before the centre: a 2x2
/// neighbourhood covers row and column offsets `-1..=0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighborhood {
    pub width: usize,
    pub height: usize,
}

impl Neighborhood {
    /// # Errors
    ///
    /// Returns an error if either side is zero.
    pub fn rectangle(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Config(format!(
                "focal neighbourhood {width}x{height} must be at least 1x1"
            )));
        }
        Ok(Self { width, height })
    }

    fn offsets(size: usize) -> RangeInclusive<i64> {
        let size = size as i64;
        -(size / 2)..=(size - 1) / 2
    }
}

impl Default for Neighborhood {
    fn default() -> Self {
        Self {
            width: 2,
            height: 2,
        }
    }
}

/// How an overlay raster is written onto a base raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosaicMode {
    /// Overlay values only replace base nodata cells
    FillNodata,
    /// Every valid overlay value wins
    Last,
}

/// Mean of the valid cells in the neighbourhood of every cell; nodata where
/// the neighbourhood holds no valid cell.
///
/// # Errors
///
/// Returns an error if the result cannot be reshaped to the raster grid.
pub fn focal_mean(raster: &Raster, neighborhood: Neighborhood) -> Result<Raster> {
    let (nrows, ncols) = (raster.nrows(), raster.ncols());
    let row_offsets = Neighborhood::offsets(neighborhood.height);
    let col_offsets = Neighborhood::offsets(neighborhood.width);

    let values: Vec<f32> = (0..nrows * ncols)
        .into_par_iter()
        .map(|flat_idx| {
            let row = (flat_idx / ncols) as i64;
            let col = (flat_idx % ncols) as i64;
            let mut sum = 0.0_f64;
            let mut count = 0_u32;
            for dr in row_offsets.clone() {
                for dc in col_offsets.clone() {
                    if let Some(value) = raster.get(row + dr, col + dc) {
                        sum += f64::from(value);
                        count += 1;
                    }
                }
            }
            if count > 0 {
                (sum / f64::from(count)) as f32
            } else {
                raster.nodata
            }
        })
        .collect();

    Ok(Raster::new(
        Array2::from_shape_vec((nrows, ncols), values)?,
        raster.transform,
        raster.nodata,
    ))
}

/// Replaces nodata cells with the focal mean of their valid neighbours.
/// Valid cells are never changed.
///
/// # Errors
///
/// Returns an error if the focal mean cannot be computed.
pub fn focal_fill(raster: &Raster, neighborhood: Neighborhood) -> Result<Raster> {
    let focal = focal_mean(raster, neighborhood)?;
    mosaic(raster, &focal, MosaicMode::FillNodata)
}

/// Writes `overlay` onto the grid of `base`.
///
/// Each base cell takes the overlay value found at its centre, subject to
/// `mode`; base cells outside the overlay are kept. The result has the grid
/// and nodata value of `base`.
///
/// # Errors
///
/// Returns an error if the result cannot be reshaped to the base grid.
pub fn mosaic(base: &Raster, overlay: &Raster, mode: MosaicMode) -> Result<Raster> {
    let (nrows, ncols) = (base.nrows(), base.ncols());
    let same_grid = base.transform == overlay.transform && base.data.dim() == overlay.data.dim();

    let values: Vec<f32> = (0..nrows * ncols)
        .into_par_iter()
        .map(|flat_idx| {
            let (row, col) = (flat_idx / ncols, flat_idx % ncols);
            let current = base.data[[row, col]];
            let write = match mode {
                MosaicMode::FillNodata => base.is_nodata(current),
                MosaicMode::Last => true,
            };
            if !write {
                return current;
            }
            let incoming = if same_grid {
                overlay.get(row as i64, col as i64)
            } else {
                let (x, y) = base.transform.cell_center(row, col);
                overlay.value_at(x, y)
            };
            match incoming {
                Some(value) => value,
                None if base.is_nodata(current) => base.nodata,
                None => current,
            }
        })
        .collect();

    Ok(Raster::new(
        Array2::from_shape_vec((nrows, ncols), values)?,
        base.transform,
        base.nodata,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use ndarray::array;

    const ND: f32 = -9999.0;

    fn raster(data: Array2<f32>) -> Raster {
        Raster::new(data, GeoTransform::new(0.0, 3.0, 1.0, 1.0), ND)
    }

    #[test]
    fn two_by_two_neighbourhood_looks_up_and_left() {
        assert_eq!(Neighborhood::offsets(2), -1..=0);
        assert_eq!(Neighborhood::offsets(3), -1..=1);
        assert_eq!(Neighborhood::offsets(1), 0..=0);
        assert!(Neighborhood::rectangle(0, 2).is_err());
    }

    #[test]
    fn focal_fill_only_touches_nodata() {
        let source = raster(array![[1.0, 2.0, 3.0], [4.0, ND, 6.0], [7.0, 8.0, ND]]);
        let filled = focal_fill(&source, Neighborhood::default()).unwrap();
        // (1,1) averages (0,0), (0,1), (1,0)
        assert!((filled.data[[1, 1]] - 7.0 / 3.0).abs() < 1e-6);
        // (2,2) averages (1,2), (2,1); (1,1) is nodata
        assert!((filled.data[[2, 2]] - 7.0).abs() < 1e-6);
        for ((r, c), &v) in source.data.indexed_iter() {
            if v != ND {
                assert_eq!(filled.data[[r, c]], v);
            }
        }
    }

    #[test]
    fn isolated_gap_without_neighbours_stays_nodata() {
        let source = raster(array![[ND, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]);
        let filled = focal_fill(&source, Neighborhood::default()).unwrap();
        assert_eq!(filled.data[[0, 0]], ND);
    }

    #[test]
    fn mosaic_modes() {
        let base = raster(array![[1.0, ND, 3.0], [ND, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        let overlay = raster(array![[10.0, 20.0, ND], [40.0, 50.0, 60.0], [ND, ND, ND]]);

        let filled = mosaic(&base, &overlay, MosaicMode::FillNodata).unwrap();
        assert_eq!(
            filled.data,
            array![[1.0, 20.0, 3.0], [40.0, 5.0, 6.0], [7.0, 8.0, 9.0]]
        );

        let last = mosaic(&base, &overlay, MosaicMode::Last).unwrap();
        assert_eq!(
            last.data,
            array![[10.0, 20.0, 3.0], [40.0, 50.0, 60.0], [7.0, 8.0, 9.0]]
        );
    }
}
