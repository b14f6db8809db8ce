//! Georeferenced single-band rasters and their GeoTIFF encoding
//!
//! Rasters are north-up grids in geographic coordinates (EPSG:4326). Row 0 is
//! the northern edge; the transform stores the top-left corner and positive
//! cell sizes. GeoTIFF I/O uses the pure Rust `tiff` crate with the
//! ModelPixelScale (33550), ModelTiepoint (33922), GeoKeyDirectory (34735)
//! and GDAL_NODATA (42113) tags.

use crate::errors::{PipelineError, Result};
use ndarray::Array2;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Nodata value written to rasters produced by the pipeline
pub const DEFAULT_NODATA: f32 = -9999.0;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

/// GeoKey directory for a geographic WGS-84 raster with area pixels
const WGS84_GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, // header: version, revision, minor, key count
    1024, 0, 1, 2, // GTModelType = geographic
    1025, 0, 1, 1, // GTRasterType = pixel is area
    2048, 0, 1, 4326, // GeographicType = WGS 84
];

/// Axis-aligned bounding box in map units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        if !(min_x < max_x && min_y < max_y) {
            return Err(PipelineError::Raster(format!(
                "empty extent {min_x},{min_y},{max_x},{max_y}"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Parses `min_x,min_y,max_x,max_y`.
    pub fn parse(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| PipelineError::Config(format!("invalid extent '{s}'")))?;
        match values.as_slice() {
            [min_x, min_y, max_x, max_y] => Self::new(*min_x, *min_y, *max_x, *max_y),
            _ => Err(PipelineError::Config(format!(
                "invalid extent '{s}': expected 'min_x,min_y,max_x,max_y'"
            ))),
        }
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Top-left anchored affine transform without rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
}

impl GeoTransform {
    #[must_use]
    pub const fn new(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_width,
            cell_height,
        }
    }

    /// Map coordinates of a cell centre
    #[must_use]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_width,
            self.origin_y - (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Cell indices containing a map coordinate; may be out of range.
    #[must_use]
    pub fn cell_index(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((self.origin_y - y) / self.cell_height).floor() as i64,
            ((x - self.origin_x) / self.cell_width).floor() as i64,
        )
    }

    #[must_use]
    pub fn extent(&self, nrows: usize, ncols: usize) -> Extent {
        Extent {
            min_x: self.origin_x,
            min_y: self.origin_y - nrows as f64 * self.cell_height,
            max_x: self.origin_x + ncols as f64 * self.cell_width,
            max_y: self.origin_y,
        }
    }
}

/// A single-band raster
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub data: Array2<f32>,
    pub transform: GeoTransform,
    pub nodata: f32,
}

impl Raster {
    #[must_use]
    pub fn new(data: Array2<f32>, transform: GeoTransform, nodata: f32) -> Self {
        Self {
            data,
            transform,
            nodata,
        }
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn extent(&self) -> Extent {
        self.transform.extent(self.nrows(), self.ncols())
    }

    #[must_use]
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }

    /// Valid value of a cell, `None` for nodata or out-of-range indices
    #[must_use]
    pub fn get(&self, row: i64, col: i64) -> Option<f32> {
        if row < 0 || col < 0 {
            return None;
        }
        let value = *self.data.get((row as usize, col as usize))?;
        (!self.is_nodata(value)).then_some(value)
    }

    /// Valid value of the cell containing a map coordinate
    #[must_use]
    pub fn value_at(&self, x: f64, y: f64) -> Option<f32> {
        if !self.extent().contains(x, y) {
            return None;
        }
        let (row, col) = self.transform.cell_index(x, y);
        // points on the south or east edge belong to the last cell
        let row = row.min(self.nrows() as i64 - 1);
        let col = col.min(self.ncols() as i64 - 1);
        self.get(row, col)
    }

    #[must_use]
    pub fn nodata_count(&self) -> usize {
        self.data.iter().filter(|&&v| self.is_nodata(v)).count()
    }

    /// Reads a single-band GeoTIFF.
    pub fn read_geotiff(path: &Path) -> Result<Self> {
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        let (width, height) = decoder.dimensions()?;

        let scale = decoder
            .get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))
            .map_err(|_| missing_geotransform(path))?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT))
            .map_err(|_| missing_geotransform(path))?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(missing_geotransform(path));
        }
        // ModelTiepoint: [I, J, K, X, Y, Z]; ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
        let transform = GeoTransform::new(
            tiepoint[3] - tiepoint[0] * scale[0],
            tiepoint[4] + tiepoint[1] * scale[1],
            scale[0],
            scale[1],
        );

        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| {
                s.trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .parse::<f32>()
                    .ok()
            })
            .unwrap_or(f32::NAN);

        let values: Vec<f32> = match decoder.read_image()? {
            DecodingResult::F32(data) => data,
            DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
            DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
            DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
            DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
            _ => {
                return Err(PipelineError::Raster(format!(
                    "unsupported sample type in {}",
                    path.display()
                )))
            }
        };

        let data = Array2::from_shape_vec((height as usize, width as usize), values)?;
        Ok(Self::new(data, transform, nodata))
    }

    /// Writes the raster as a 32-bit float GeoTIFF.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// an interrupted run never leaves a truncated raster behind.
    pub fn write_geotiff(&self, path: &Path) -> Result<()> {
        let partial = partial_path(path);
        {
            let mut encoder = TiffEncoder::new(File::create(&partial)?)?;
            let mut image = encoder
                .new_image::<colortype::Gray32Float>(self.ncols() as u32, self.nrows() as u32)?;

            let t = &self.transform;
            let directory = image.encoder();
            directory.write_tag(
                Tag::Unknown(TAG_MODEL_PIXEL_SCALE),
                &[t.cell_width, t.cell_height, 0.0][..],
            )?;
            directory.write_tag(
                Tag::Unknown(TAG_MODEL_TIEPOINT),
                &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..],
            )?;
            directory.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &WGS84_GEO_KEYS[..])?;
            directory.write_tag(
                Tag::Unknown(TAG_GDAL_NODATA),
                format!("{}", self.nodata).as_str(),
            )?;

            let samples: Vec<f32> = self.data.iter().copied().collect();
            image.write_data(&samples)?;
        }
        fs::rename(&partial, path)?;
        Ok(())
    }
}

fn missing_geotransform(path: &Path) -> PipelineError {
    PipelineError::Raster(format!(
        "{} has no ModelPixelScale/ModelTiepoint tags",
        path.display()
    ))
}

/// Sibling path used while a file is being written
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
