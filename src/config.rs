//! Pipeline configuration
//!
//! One [`PipelineConfig`] is built from the command line, validated once
//! before any stage runs, and passed explicitly to every stage.

use crate::engine::{Neighborhood, SampleMethod};
use crate::errors::{PipelineError, Result};
use crate::merge::MergeStrategy;
use crate::naming::{ensure_csv_extension, validate_variable, GeometryKind};
use crate::parallel::ParallelConfig;
use crate::raster::Extent;
use crate::table::generated_columns;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_VARIABLE: &str = "prate";
/// Cell size, in degrees, rasters are resampled to before zonal statistics
pub const DEFAULT_ZONE_CELL_SIZE: f64 = 0.04;
pub const DEFAULT_POINT_OUTPUT: &str = "points.csv";
pub const DEFAULT_POLYGON_OUTPUT: &str = "polygons.csv";

/// The pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Fill,
    Stats,
    Convert,
    Merge,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Fill => "fill",
            Self::Stats => "stats",
            Self::Convert => "convert",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive range of source years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    /// Builds a range from optional bounds; a single bound selects one year.
    pub fn from_bounds(start: Option<i32>, end: Option<i32>) -> Result<Option<Self>> {
        let range = match (start, end) {
            (None, None) => return Ok(None),
            (Some(start), Some(end)) => Self { start, end },
            (Some(year), None) | (None, Some(year)) => Self {
                start: year,
                end: year,
            },
        };
        if range.start > range.end {
            return Err(PipelineError::Config(format!(
                "start year {} is after end year {}",
                range.start, range.end
            )));
        }
        Ok(Some(range))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointLayerConfig {
    pub path: Option<PathBuf>,
    /// Identifier field copied into every point table
    pub id_field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolygonLayerConfig {
    pub path: Option<PathBuf>,
    /// Zone field; also the identifier of the polygon tables
    pub id_field: Option<String>,
    /// Field the layer is split by before zonal statistics
    pub split_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub fill_gaps: bool,
    pub neighborhood: Neighborhood,
    pub wrap_longitude: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fill_gaps: true,
            neighborhood: Neighborhood::default(),
            wrap_longitude: true,
        }
    }
}

/// Supplementary raster pasted into a known gap
#[derive(Debug, Clone, PartialEq)]
pub struct GapFillConfig {
    pub fill_raster: PathBuf,
    pub window: Extent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub strategy: MergeStrategy,
    pub long: bool,
    pub point_output: String,
    pub polygon_output: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::OuterJoin,
            long: false,
            point_output: DEFAULT_POINT_OUTPUT.to_string(),
            polygon_output: DEFAULT_POLYGON_OUTPUT.to_string(),
        }
    }
}

impl MergeConfig {
    /// Merged file name for a geometry kind, `.csv` appended when missing
    #[must_use]
    pub fn output_name(&self, kind: GeometryKind) -> String {
        match kind {
            GeometryKind::Point => ensure_csv_extension(&self.point_output),
            GeometryKind::Polygon => ensure_csv_extension(&self.polygon_output),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub variable: String,
    pub years: Option<YearRange>,
    pub points: PointLayerConfig,
    pub polygons: PolygonLayerConfig,
    pub sample_method: SampleMethod,
    pub zone_cell_size: f64,
    pub delete_intermediate: bool,
    pub extraction: ExtractionConfig,
    pub gap_fill: Option<GapFillConfig>,
    pub merge: MergeConfig,
    pub parallel: ParallelConfig,
}

impl PipelineConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            variable: DEFAULT_VARIABLE.to_string(),
            years: None,
            points: PointLayerConfig::default(),
            polygons: PolygonLayerConfig::default(),
            sample_method: SampleMethod::Nearest,
            zone_cell_size: DEFAULT_ZONE_CELL_SIZE,
            delete_intermediate: false,
            extraction: ExtractionConfig::default(),
            gap_fill: None,
            merge: MergeConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }

    /// Identifier column of the tables of one geometry kind
    #[must_use]
    pub fn id_field(&self, kind: GeometryKind) -> Option<&str> {
        match kind {
            GeometryKind::Point => self.points.id_field.as_deref(),
            GeometryKind::Polygon => self.polygons.id_field.as_deref(),
        }
    }

    /// Geometry kinds with an identifier field configured
    #[must_use]
    pub fn configured_kinds(&self) -> Vec<GeometryKind> {
        [GeometryKind::Point, GeometryKind::Polygon]
            .into_iter()
            .filter(|&kind| self.id_field(kind).is_some())
            .collect()
    }

    /// Checks everything the given stages need before any work starts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the first missing or
    /// inconsistent parameter.
    pub fn validate(&self, stages: &[Stage]) -> Result<()> {
        validate_variable(&self.variable)?;
        if let Some(range) = self.years {
            YearRange::from_bounds(Some(range.start), Some(range.end))?;
        }
        if self.parallel.num_threads == Some(0) {
            return Err(config_error("--threads must be at least 1"));
        }
        for kind in [GeometryKind::Point, GeometryKind::Polygon] {
            if let Some(field) = self.id_field(kind) {
                if field.is_empty() {
                    return Err(config_error(format!("{kind} identifier field is empty")));
                }
                if generated_columns(kind).iter().any(|c| *c == field) {
                    return Err(config_error(format!(
                        "{kind} identifier field '{field}' collides with a generated column"
                    )));
                }
            }
        }

        for stage in stages {
            match stage {
                Stage::Extract => {
                    let n = self.extraction.neighborhood;
                    Neighborhood::rectangle(n.width, n.height)?;
                }
                Stage::Fill => {
                    let gap = self
                        .gap_fill
                        .as_ref()
                        .ok_or_else(|| config_error("gap fill needs --fill-raster and --window"))?;
                    if !gap.fill_raster.is_file() {
                        return Err(PipelineError::NotFound(gap.fill_raster.clone()));
                    }
                }
                Stage::Stats => self.validate_layers()?,
                Stage::Convert | Stage::Merge => {
                    if self.configured_kinds().is_empty() {
                        return Err(config_error(
                            "no identifier field given: set --point-field and/or --polygon-field",
                        ));
                    }
                    if *stage == Stage::Merge {
                        for kind in self.configured_kinds() {
                            let name = self.merge.output_name(kind);
                            if name.contains(['/', '\\']) || name == ".csv" {
                                return Err(config_error(format!(
                                    "invalid merged output name '{name}'"
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_layers(&self) -> Result<()> {
        if self.points.path.is_none() && self.polygons.path.is_none() {
            return Err(config_error("statistics need --points and/or --polygons"));
        }
        if let Some(path) = &self.points.path {
            if self.points.id_field.is_none() {
                return Err(config_error("--points requires --point-field"));
            }
            if !path.is_file() {
                return Err(PipelineError::NotFound(path.clone()));
            }
        }
        if let Some(path) = &self.polygons.path {
            if self.polygons.id_field.is_none() {
                return Err(config_error("--polygons requires --polygon-field"));
            }
            if !path.is_file() {
                return Err(PipelineError::NotFound(path.clone()));
            }
        } else if self.polygons.split_field.is_some() {
            return Err(config_error("--split-field requires --polygons"));
        }
        if !(self.zone_cell_size.is_finite() && self.zone_cell_size > 0.0) {
            return Err(config_error(format!(
                "zone cell size must be positive, got {}",
                self.zone_cell_size
            )));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> PipelineError {
    PipelineError::Config(message.into())
}
