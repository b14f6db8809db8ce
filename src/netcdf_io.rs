//! NetCDF grid decoding
//!
//! A [`GridSource`] wraps one source file and one data variable laid out as
//! `(time, lat, lon)` (any dimension order, extra singleton dimensions
//! allowed). It decodes the time axis into calendar dates, derives the
//! georeferencing from the coordinate variables and reads single time slices
//! as north-up [`Raster`]s with CF packing and fill values resolved.

use crate::calendar::{decode_dates, Calendar, TimeUnits};
use crate::errors::{PipelineError, Result};
use crate::raster::{GeoTransform, Raster, DEFAULT_NODATA};
use chrono::NaiveDate;
use ndarray::{s, Array2};
use netcdf::{AttributeValue, File, Variable};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TIME_NAMES: &[&str] = &["time", "t"];
const LAT_NAMES: &[&str] = &["lat", "latitude", "y"];
const LON_NAMES: &[&str] = &["lon", "longitude", "x"];

/// CF packing attributes of the data variable
#[derive(Debug, Clone, PartialEq)]
struct Packing {
    fill_values: Vec<f32>,
    scale_factor: f32,
    add_offset: f32,
}

impl Packing {
    fn from_variable(var: &Variable) -> Self {
        let fill_values = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| numeric_attribute(var, name))
            .map(|v| v as f32)
            .collect();
        Self {
            fill_values,
            scale_factor: numeric_attribute(var, "scale_factor").map_or(1.0, |v| v as f32),
            add_offset: numeric_attribute(var, "add_offset").map_or(0.0, |v| v as f32),
        }
    }

    /// Raw stored value to physical value, `DEFAULT_NODATA` for fill
    fn unpack(&self, raw: f32) -> f32 {
        if raw.is_nan() || self.fill_values.iter().any(|&fill| raw == fill) {
            DEFAULT_NODATA
        } else {
            raw * self.scale_factor + self.add_offset
        }
    }
}

/// First numeric value of an attribute, whatever its stored type
fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        AttributeValue::Floats(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Shorts(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Ints(v) => v.first().map(|&x| f64::from(x)),
        _ => None,
    }
}

pub(crate) fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn find_dimension(names: &[String], aliases: &[&str]) -> Option<usize> {
    names
        .iter()
        .position(|name| aliases.contains(&name.to_ascii_lowercase().as_str()))
}

/// One data variable of one NetCDF source file
pub struct GridSource {
    file: File,
    path: PathBuf,
    variable: String,
    shape: Vec<usize>,
    time_pos: usize,
    lat_pos: usize,
    lon_pos: usize,
    dates: Vec<NaiveDate>,
    lat_ascending: bool,
    transform: GeoTransform,
    packing: Packing,
}

impl GridSource {
    /// Opens `path` and resolves the dimensions, coordinates and time axis
    /// of `variable`.
    pub fn open(path: &Path, variable: &str) -> Result<Self> {
        let file = netcdf::open(path)?;
        let var = file
            .variable(variable)
            .ok_or_else(|| PipelineError::VariableNotFound {
                var: variable.to_string(),
            })?;

        let dim_names: Vec<String> = var
            .dimensions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let missing = |dim: &str| PipelineError::DimensionNotFound {
            var: variable.to_string(),
            dim: dim.to_string(),
        };
        let time_pos = find_dimension(&dim_names, TIME_NAMES).ok_or_else(|| missing("time"))?;
        let lat_pos = find_dimension(&dim_names, LAT_NAMES).ok_or_else(|| missing("lat"))?;
        let lon_pos = find_dimension(&dim_names, LON_NAMES).ok_or_else(|| missing("lon"))?;

        for (pos, (name, &len)) in dim_names.iter().zip(&shape).enumerate() {
            if pos != time_pos && pos != lat_pos && pos != lon_pos && len > 1 {
                warn!(
                    "{}: dimension '{}' has length {}, only index 0 is read",
                    path.display(),
                    name,
                    len
                );
            }
        }

        let packing = Packing::from_variable(&var);
        let dates = read_time_axis(&file, &dim_names[time_pos])?;
        if dates.len() != shape[time_pos] {
            return Err(PipelineError::TimeAxis(format!(
                "time coordinate has {} values but dimension has {}",
                dates.len(),
                shape[time_pos]
            )));
        }

        let lats = read_coordinate(&file, &dim_names[lat_pos])?;
        let lons = read_coordinate(&file, &dim_names[lon_pos])?;
        let (lat_min, lat_max, cell_height) = axis_geometry(&lats, &dim_names[lat_pos])?;
        let (lon_min, _, cell_width) = axis_geometry(&lons, &dim_names[lon_pos])?;
        let lat_ascending = lats[lats.len() - 1] > lats[0];
        let transform = GeoTransform::new(
            lon_min - cell_width / 2.0,
            lat_max + cell_height / 2.0,
            cell_width,
            cell_height,
        );
        debug!(
            "{}: {} slices, {}x{} grid, lat {}..{}",
            path.display(),
            dates.len(),
            lats.len(),
            lons.len(),
            lat_min,
            lat_max
        );

        drop(var);
        Ok(Self {
            file,
            path: path.to_path_buf(),
            variable: variable.to_string(),
            shape,
            time_pos,
            lat_pos,
            lon_pos,
            dates,
            lat_ascending,
            transform,
            packing,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Calendar date of every time index
    #[must_use]
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    #[must_use]
    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    /// `(rows, cols)` of every slice
    #[must_use]
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.shape[self.lat_pos], self.shape[self.lon_pos])
    }

    /// Reads time index `index` as a north-up raster.
    pub fn read_slice(&self, index: usize) -> Result<Raster> {
        if index >= self.dates.len() {
            return Err(PipelineError::Raster(format!(
                "time index {} out of range for {} slices",
                index,
                self.dates.len()
            )));
        }
        let var = self
            .file
            .variable(&self.variable)
            .ok_or_else(|| PipelineError::VariableNotFound {
                var: self.variable.clone(),
            })?;

        let ranges: Vec<Range<usize>> = self
            .shape
            .iter()
            .enumerate()
            .map(|(pos, &len)| {
                if pos == self.time_pos {
                    index..index + 1
                } else if pos == self.lat_pos || pos == self.lon_pos {
                    0..len
                } else {
                    0..1
                }
            })
            .collect();

        let values: Vec<f32> = match ranges.as_slice() {
            [a, b, c] => var.get_values::<f32, _>((a.clone(), b.clone(), c.clone()))?,
            [a, b, c, d] => {
                var.get_values::<f32, _>((a.clone(), b.clone(), c.clone(), d.clone()))?
            }
            _ => {
                return Err(PipelineError::Raster(format!(
                    "'{}' has {} dimensions, expected 3 or 4",
                    self.variable,
                    ranges.len()
                )))
            }
        };

        let (nrows, ncols) = self.grid_shape();
        let unpacked: Vec<f32> = values.into_iter().map(|v| self.packing.unpack(v)).collect();
        let mut grid = if self.lat_pos < self.lon_pos {
            Array2::from_shape_vec((nrows, ncols), unpacked)?
        } else {
            Array2::from_shape_vec((ncols, nrows), unpacked)?
                .reversed_axes()
                .as_standard_layout()
                .into_owned()
        };
        if self.lat_ascending {
            grid = grid.slice(s![..;-1, ..]).to_owned();
        }

        Ok(Raster::new(grid, self.transform, DEFAULT_NODATA))
    }
}

fn read_coordinate(file: &File, name: &str) -> Result<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| PipelineError::VariableNotFound {
            var: name.to_string(),
        })?;
    Ok(var.get_values::<f64, _>(..)?)
}

/// `(min, max, spacing)` of a regularly spaced coordinate
fn axis_geometry(values: &[f64], name: &str) -> Result<(f64, f64, f64)> {
    if values.len() < 2 {
        return Err(PipelineError::Raster(format!(
            "coordinate '{name}' needs at least two values to derive a cell size"
        )));
    }
    let first = values[0];
    let last = values[values.len() - 1];
    let spacing = (last - first).abs() / (values.len() - 1) as f64;
    if spacing == 0.0 || !spacing.is_finite() {
        return Err(PipelineError::Raster(format!(
            "coordinate '{name}' has no usable spacing"
        )));
    }
    Ok((first.min(last), first.max(last), spacing))
}

fn read_time_axis(file: &File, name: &str) -> Result<Vec<NaiveDate>> {
    let var = file
        .variable(name)
        .ok_or_else(|| PipelineError::TimeAxis(format!("no '{name}' coordinate variable")))?;
    let units = string_attribute(&var, "units")
        .ok_or_else(|| PipelineError::TimeAxis(format!("'{name}' has no units attribute")))?;
    let calendar = string_attribute(&var, "calendar").unwrap_or_default();

    let units = TimeUnits::parse(&units)?;
    let calendar = Calendar::parse(&calendar)?;
    let values = var.get_values::<f64, _>(..)?;
    decode_dates(&units, calendar, &values)
}
