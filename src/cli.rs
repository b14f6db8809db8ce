//! Defines command-line interface options using `clap` for the gridzone application.

use clap::{Args, Parser, Subcommand};
use gridzone::config::{
    GapFillConfig, PipelineConfig, PointLayerConfig, PolygonLayerConfig, Stage, YearRange,
    DEFAULT_POINT_OUTPUT, DEFAULT_POLYGON_OUTPUT, DEFAULT_VARIABLE, DEFAULT_ZONE_CELL_SIZE,
};
use gridzone::engine::{Neighborhood, SampleMethod};
use gridzone::errors::Result;
use gridzone::merge::MergeStrategy;
use gridzone::parallel::ParallelConfig;
use gridzone::raster::Extent;
use std::path::PathBuf;

/// Batch pipeline turning gridded climate data into zonal time series
#[derive(Parser, Debug)]
#[command(
    name = "gridzone",
    version,
    about = "Daily climate rasters, point and zonal statistics, and merged time series"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads for raster operations. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Write the per-unit run report as JSON to this path
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract daily GeoTIFF rasters from <var>.<YYYY>.nc sources
    Extract {
        #[command(flatten)]
        dirs: DirArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        extraction: ExtractionArgs,
    },
    /// Paste a supplementary raster into a fixed gap window
    Fill {
        #[command(flatten)]
        dirs: DirArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        gap: GapArgs,
    },
    /// Compute point and zonal statistics for every raster
    Stats {
        #[command(flatten)]
        dirs: DirArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        layers: LayerArgs,
    },
    /// Reduce engine-native tables to per-date CSVs
    Convert {
        /// Directory holding the statistics tables
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        fields: FieldArgs,
        /// Delete each engine-native table once its CSV exists
        #[arg(long, default_value_t = false)]
        delete_intermediate: bool,
    },
    /// Merge per-date CSVs into one time series per geometry kind
    Merge {
        #[command(flatten)]
        dirs: DirArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        fields: FieldArgs,
        #[command(flatten)]
        merge: MergeArgs,
    },
    /// Run extract, fill (when configured), stats, convert and merge in order
    Run {
        #[command(flatten)]
        dirs: DirArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        extraction: ExtractionArgs,
        #[command(flatten)]
        gap: GapArgs,
        #[command(flatten)]
        layers: LayerArgs,
        #[command(flatten)]
        merge: MergeArgs,
        /// Delete each engine-native table once its CSV exists
        #[arg(long, default_value_t = false)]
        delete_intermediate: bool,
    },
    /// Print the metadata and decoded time axis of one source file
    Inspect {
        /// Path to the NetCDF file
        #[arg(short, long)]
        file: PathBuf,
        /// Gridded variable to summarize
        #[arg(long, default_value = DEFAULT_VARIABLE)]
        variable: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DirArgs {
    /// Input directory
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Gridded variable name, as used in file names
    #[arg(long, default_value = DEFAULT_VARIABLE)]
    pub variable: String,

    /// First source year; alone it selects a single year
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last source year, inclusive
    #[arg(long)]
    pub end_year: Option<i32>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractionArgs {
    /// Keep nodata cells instead of filling them from their neighbourhood
    #[arg(long, default_value_t = false)]
    pub no_fill_gaps: bool,

    /// Keep 0..360 longitudes instead of rolling them to -180..180
    #[arg(long, default_value_t = false)]
    pub no_wrap_longitude: bool,

    /// Focal neighbourhood used for gap filling, formatted as <width>x<height>
    #[arg(long, value_parser = parse_focal_arg, default_value = "2x2")]
    pub focal: Neighborhood,
}

#[derive(Args, Debug, Clone)]
pub struct GapArgs {
    /// Raster pasted into the gap window
    #[arg(long, requires = "window")]
    pub fill_raster: Option<PathBuf>,

    /// Gap window, formatted as <minx>,<miny>,<maxx>,<maxy>
    #[arg(long, value_parser = parse_window_arg, requires = "fill_raster")]
    pub window: Option<Extent>,
}

#[derive(Args, Debug, Clone)]
pub struct FieldArgs {
    /// Identifier field of the point tables
    #[arg(long)]
    pub point_field: Option<String>,

    /// Zone field of the polygon tables
    #[arg(long)]
    pub polygon_field: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LayerArgs {
    /// Point shapefile
    #[arg(long)]
    pub points: Option<PathBuf>,

    /// Polygon shapefile
    #[arg(long)]
    pub polygons: Option<PathBuf>,

    #[command(flatten)]
    pub fields: FieldArgs,

    /// Split the polygon layer by this field before zonal statistics
    #[arg(long)]
    pub split_field: Option<String>,

    /// Sample points with bilinear interpolation instead of the containing cell
    #[arg(long, default_value_t = false)]
    pub interpolate: bool,

    /// Cell size, in degrees, rasters are resampled to for zonal statistics
    #[arg(long, default_value_t = DEFAULT_ZONE_CELL_SIZE)]
    pub zone_cell_size: f64,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// How later tables are combined with the rows seen so far
    #[arg(long, value_enum, default_value_t = MergeStrategy::OuterJoin)]
    pub strategy: MergeStrategy,

    /// Write <id>,date,value rows instead of one column per date
    #[arg(long, default_value_t = false)]
    pub long: bool,

    /// Merged point table name
    #[arg(long, default_value = DEFAULT_POINT_OUTPUT)]
    pub point_output: String,

    /// Merged polygon table name
    #[arg(long, default_value = DEFAULT_POLYGON_OUTPUT)]
    pub polygon_output: String,
}

fn parse_focal_arg(s: &str) -> std::result::Result<Neighborhood, String> {
    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    match parts.as_slice() {
        [width, height] => {
            let width = width
                .trim()
                .parse::<usize>()
                .map_err(|_| "Invalid focal width".to_string())?;
            let height = height
                .trim()
                .parse::<usize>()
                .map_err(|_| "Invalid focal height".to_string())?;
            Neighborhood::rectangle(width, height).map_err(|e| e.to_string())
        }
        _ => Err("Invalid format: Expected '<width>x<height>'.".to_string()),
    }
}

fn parse_window_arg(s: &str) -> std::result::Result<Extent, String> {
    Extent::parse(s).map_err(|e| e.to_string())
}

impl ExtractionArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        config.extraction.fill_gaps = !self.no_fill_gaps;
        config.extraction.wrap_longitude = !self.no_wrap_longitude;
        config.extraction.neighborhood = self.focal;
    }
}

impl SourceArgs {
    fn apply(&self, config: &mut PipelineConfig) -> Result<()> {
        config.variable = self.variable.clone();
        config.years = YearRange::from_bounds(self.start_year, self.end_year)?;
        Ok(())
    }
}

impl GapArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let (Some(fill_raster), Some(window)) = (&self.fill_raster, self.window) {
            config.gap_fill = Some(GapFillConfig {
                fill_raster: fill_raster.clone(),
                window,
            });
        }
    }
}

impl FieldArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        config.points.id_field = self.point_field.clone();
        config.polygons.id_field = self.polygon_field.clone();
    }
}

impl LayerArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        config.points = PointLayerConfig {
            path: self.points.clone(),
            id_field: self.fields.point_field.clone(),
        };
        config.polygons = PolygonLayerConfig {
            path: self.polygons.clone(),
            id_field: self.fields.polygon_field.clone(),
            split_field: self.split_field.clone(),
        };
        config.sample_method = if self.interpolate {
            SampleMethod::Bilinear
        } else {
            SampleMethod::Nearest
        };
        config.zone_cell_size = self.zone_cell_size;
    }
}

impl MergeArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        config.merge.strategy = self.strategy;
        config.merge.long = self.long;
        config.merge.point_output = self.point_output.clone();
        config.merge.polygon_output = self.polygon_output.clone();
    }
}

impl Cli {
    /// Builds the pipeline configuration and the stages it must be valid
    /// for. Returns `None` for `inspect`, which runs no stage.
    pub fn pipeline_config(&self) -> Result<Option<(PipelineConfig, Vec<Stage>)>> {
        let parallel = ParallelConfig::new(self.threads);
        let (mut config, stages) = match &self.command {
            Command::Extract {
                dirs,
                source,
                extraction,
            } => {
                let mut config = PipelineConfig::new(&dirs.input, &dirs.output);
                source.apply(&mut config)?;
                extraction.apply(&mut config);
                (config, vec![Stage::Extract])
            }
            Command::Fill { dirs, source, gap } => {
                let mut config = PipelineConfig::new(&dirs.input, &dirs.output);
                source.apply(&mut config)?;
                gap.apply(&mut config);
                (config, vec![Stage::Fill])
            }
            Command::Stats {
                dirs,
                source,
                layers,
            } => {
                let mut config = PipelineConfig::new(&dirs.input, &dirs.output);
                source.apply(&mut config)?;
                layers.apply(&mut config);
                (config, vec![Stage::Stats])
            }
            Command::Convert {
                input,
                source,
                fields,
                delete_intermediate,
            } => {
                let mut config = PipelineConfig::new(input, input);
                source.apply(&mut config)?;
                fields.apply(&mut config);
                config.delete_intermediate = *delete_intermediate;
                (config, vec![Stage::Convert])
            }
            Command::Merge {
                dirs,
                source,
                fields,
                merge,
            } => {
                let mut config = PipelineConfig::new(&dirs.input, &dirs.output);
                source.apply(&mut config)?;
                fields.apply(&mut config);
                merge.apply(&mut config);
                (config, vec![Stage::Merge])
            }
            Command::Run {
                dirs,
                source,
                extraction,
                gap,
                layers,
                merge,
                delete_intermediate,
            } => {
                let mut config = PipelineConfig::new(&dirs.input, &dirs.output);
                source.apply(&mut config)?;
                extraction.apply(&mut config);
                gap.apply(&mut config);
                layers.apply(&mut config);
                merge.apply(&mut config);
                config.delete_intermediate = *delete_intermediate;
                let stages = gridzone::stages::run_stages(&config);
                (config, stages)
            }
            Command::Inspect { .. } => return Ok(None),
        };
        config.parallel = parallel;
        Ok(Some((config, stages)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn run_builds_the_full_stage_list() {
        let cli = Cli::try_parse_from([
            "gridzone",
            "run",
            "-i",
            "data",
            "-o",
            "out",
            "--polygons",
            "zones.shp",
            "--polygon-field",
            "ZONE",
            "--fill-raster",
            "fill.tif",
            "--window",
            "0,-1,1,0",
            "--focal",
            "3x3",
            "--strategy",
            "append",
            "--start-year",
            "1990",
            "-t",
            "2",
        ])
        .unwrap();

        let (config, stages) = cli.pipeline_config().unwrap().unwrap();
        assert_eq!(
            stages,
            [Stage::Extract, Stage::Fill, Stage::Stats, Stage::Convert, Stage::Merge]
        );
        assert_eq!(config.polygons.id_field.as_deref(), Some("ZONE"));
        assert_eq!(config.merge.strategy, MergeStrategy::Append);
        assert_eq!(config.extraction.neighborhood.width, 3);
        assert_eq!(config.parallel.num_threads, Some(2));
        assert_eq!(
            config.years,
            Some(YearRange {
                start: 1990,
                end: 1990
            })
        );
        let gap = config.gap_fill.unwrap();
        assert_eq!(gap.fill_raster, PathBuf::from("fill.tif"));
        assert_eq!(gap.window.min_y, -1.0);
    }

    #[test]
    fn fill_raster_requires_window() {
        let result = Cli::try_parse_from([
            "gridzone",
            "run",
            "-i",
            "data",
            "-o",
            "out",
            "--fill-raster",
            "fill.tif",
        ]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (flag, value) in [("--focal", "3"), ("--window", "0,0,1")] {
            let result =
                Cli::try_parse_from(["gridzone", "extract", "-i", "a", "-o", "b", flag, value]);
            assert!(result.is_err(), "{flag} {value} parsed");
        }
    }

    #[test]
    fn inspect_runs_no_stage() {
        let cli = Cli::try_parse_from(["gridzone", "inspect", "-f", "prate.1990.nc"]).unwrap();
        assert!(cli.pipeline_config().unwrap().is_none());
    }
}
