//! Source file inspection
//!
//! Backs the `inspect` command: lists the dimensions and variables of one
//! NetCDF source and shows how the pipeline would decode the chosen variable
//! (grid size, extent and the dates of its time axis).

use crate::errors::Result;
use crate::netcdf_io::{string_attribute, GridSource};
use crate::raster::Extent;
use chrono::NaiveDate;
use netcdf::File;
use std::path::{Path, PathBuf};

/// Information about a dimension
#[derive(Debug, Clone)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Structured metadata for a NetCDF variable
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub units: Option<String>,
    pub long_name: Option<String>,
}

/// The decoded view of the data variable
#[derive(Debug, Clone)]
pub struct GridSummary {
    pub variable: String,
    pub rows: usize,
    pub cols: usize,
    pub extent: Extent,
    pub cell_width: f64,
    pub cell_height: f64,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub path: PathBuf,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub grid: GridSummary,
}

/// Collects file structure and the decoded grid of `variable`.
pub fn inspect_source(path: &Path, variable: &str) -> Result<SourceSummary> {
    let file = netcdf::open(path)?;
    let dimensions = list_dimensions(&file);
    let variables = list_variables(&file);
    drop(file);

    let source = GridSource::open(path, variable)?;
    let (rows, cols) = source.grid_shape();
    let transform = source.transform();
    let grid = GridSummary {
        variable: source.variable().to_string(),
        rows,
        cols,
        extent: transform.extent(rows, cols),
        cell_width: transform.cell_width,
        cell_height: transform.cell_height,
        dates: source.dates().to_vec(),
    };

    Ok(SourceSummary {
        path: path.to_path_buf(),
        dimensions,
        variables,
        grid,
    })
}

fn list_dimensions(file: &File) -> Vec<DimensionInfo> {
    let mut dimensions: Vec<DimensionInfo> = file
        .dimensions()
        .map(|d| DimensionInfo {
            name: d.name().to_string(),
            length: d.len(),
            is_unlimited: d.is_unlimited(),
        })
        .collect();
    dimensions.sort_by(|a, b| a.name.cmp(&b.name));
    dimensions
}

fn list_variables(file: &File) -> Vec<VariableInfo> {
    let mut variables: Vec<VariableInfo> = file
        .variables()
        .map(|var| VariableInfo {
            name: var.name().to_string(),
            dimensions: var
                .dimensions()
                .iter()
                .map(|d| d.name().to_string())
                .collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            units: string_attribute(&var, "units"),
            long_name: string_attribute(&var, "long_name"),
        })
        .collect();
    variables.sort_by(|a, b| a.name.cmp(&b.name));
    variables
}

impl SourceSummary {
    /// Prints the summary to stdout.
    pub fn print(&self) {
        println!("\n{}", self.path.display());

        println!("\n Dimensions");
        println!("==============");
        if self.dimensions.is_empty() {
            println!("   (No dimensions found)");
        }
        for dim in &self.dimensions {
            if dim.is_unlimited {
                println!("    {} = {} (unlimited)", dim.name, dim.length);
            } else {
                println!("    {} = {}", dim.name, dim.length);
            }
        }

        println!("\n Variables");
        println!("=============");
        for var in &self.variables {
            if var.dimensions.is_empty() {
                println!("    {}: scalar", var.name);
            } else {
                let shape: Vec<String> = var.shape.iter().map(ToString::to_string).collect();
                println!(
                    "    {}: [{}] = ({})",
                    var.name,
                    var.dimensions.join(", "),
                    shape.join(" x ")
                );
            }
            let mut key_attrs = Vec::new();
            if let Some(units) = &var.units {
                key_attrs.push(format!("units: {units}"));
            }
            if let Some(long_name) = &var.long_name {
                key_attrs.push(format!("long_name: {long_name}"));
            }
            if !key_attrs.is_empty() {
                println!("      {}", key_attrs.join(", "));
            }
        }

        let grid = &self.grid;
        println!("\n Grid of '{}'", grid.variable);
        println!("=============");
        println!("    size: {} rows x {} cols", grid.rows, grid.cols);
        println!(
            "    extent: {:.4},{:.4},{:.4},{:.4}",
            grid.extent.min_x, grid.extent.min_y, grid.extent.max_x, grid.extent.max_y
        );
        println!("    cell: {} x {}", grid.cell_width, grid.cell_height);
        match (grid.dates.first(), grid.dates.last()) {
            (Some(first), Some(last)) => println!(
                "    time: {} slices, {} .. {}",
                grid.dates.len(),
                first,
                last
            ),
            _ => println!("    time: (empty)"),
        }
    }
}
