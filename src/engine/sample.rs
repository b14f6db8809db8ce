//! Raster values at point locations

use crate::raster::Raster;
use geo::Point;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMethod {
    /// Value of the containing cell
    #[default]
    Nearest,
    /// Bilinear interpolation between the four surrounding cell centres
    Bilinear,
}

/// Samples `raster` at every point.
///
/// A point outside the raster, or inside a nodata cell, yields `None`.
/// Bilinear sampling skips nodata neighbours and renormalizes the remaining
/// weights.
#[must_use]
pub fn sample_points(
    raster: &Raster,
    points: &[Point<f64>],
    method: SampleMethod,
) -> Vec<Option<f32>> {
    points
        .par_iter()
        .map(|point| {
            let nearest = raster.value_at(point.x(), point.y())?;
            match method {
                SampleMethod::Nearest => Some(nearest),
                SampleMethod::Bilinear => bilinear(raster, point.x(), point.y()),
            }
        })
        .collect()
}

fn bilinear(raster: &Raster, x: f64, y: f64) -> Option<f32> {
    let t = &raster.transform;
    // position in cell-centre units
    let fx = (x - t.origin_x) / t.cell_width - 0.5;
    let fy = (t.origin_y - y) / t.cell_height - 0.5;
    let (col0, row0) = (fx.floor(), fy.floor());
    let (tx, ty) = (fx - col0, fy - row0);
    let (col0, row0) = (col0 as i64, row0 as i64);

    let neighbours = [
        (row0, col0, (1.0 - tx) * (1.0 - ty)),
        (row0, col0 + 1, tx * (1.0 - ty)),
        (row0 + 1, col0, (1.0 - tx) * ty),
        (row0 + 1, col0 + 1, tx * ty),
    ];

    let mut sum = 0.0_f64;
    let mut weight = 0.0_f64;
    for (row, col, w) in neighbours {
        if w <= 0.0 {
            continue;
        }
        if let Some(value) = raster.get(row, col) {
            sum += w * f64::from(value);
            weight += w;
        }
    }

    (weight > 0.0).then(|| (sum / weight) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use ndarray::array;

    const ND: f32 = -9999.0;

    fn grid() -> Raster {
        // cell centres at x = 0.5, 1.5 and y = 1.5, 0.5
        Raster::new(
            array![[0.0, 10.0], [20.0, 30.0]],
            GeoTransform::new(0.0, 2.0, 1.0, 1.0),
            ND,
        )
    }

    #[test]
    fn nearest_takes_containing_cell() {
        let values = sample_points(
            &grid(),
            &[Point::new(0.9, 1.9), Point::new(1.1, 0.1), Point::new(5.0, 5.0)],
            SampleMethod::Nearest,
        );
        assert_eq!(values, vec![Some(0.0), Some(30.0), None]);
    }

    #[test]
    fn bilinear_interpolates_between_centres() {
        let values = sample_points(&grid(), &[Point::new(1.0, 1.0)], SampleMethod::Bilinear);
        assert_eq!(values, vec![Some(15.0)]);

        let at_centre = sample_points(&grid(), &[Point::new(0.5, 1.5)], SampleMethod::Bilinear);
        assert_eq!(at_centre, vec![Some(0.0)]);
    }

    #[test]
    fn bilinear_renormalizes_around_nodata() {
        let mut raster = grid();
        raster.data[[1, 1]] = ND;
        // weights 0.36, 0.24, 0.24 remain after dropping the 0.16 of the gap
        let values = sample_points(&raster, &[Point::new(0.9, 1.1)], SampleMethod::Bilinear);
        let value = values[0].unwrap();
        assert!((value - 60.0 / 7.0).abs() < 1e-4);

        let on_gap = sample_points(&raster, &[Point::new(1.5, 0.5)], SampleMethod::Bilinear);
        assert_eq!(on_gap, vec![None]);
    }
}
