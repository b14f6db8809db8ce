//! Locating stage inputs on disk
//!
//! Every stage discovers its units of work by walking a directory and
//! keeping the files whose names parse under the grammar in [`crate::naming`].
//! Results are sorted so runs are deterministic.

use crate::config::YearRange;
use crate::errors::{PipelineError, Result};
use crate::naming::{GeometryKind, RasterKey, SourceName, TableName};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Source files found for a variable, plus the expected files that are
/// missing when an explicit year range was requested
#[derive(Debug, Default)]
pub struct SourceListing {
    pub found: Vec<(SourceName, PathBuf)>,
    pub missing: Vec<(SourceName, PathBuf)>,
}

fn require_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::NotFound(dir.to_path_buf()))
    }
}

/// Files under `dir` (recursively) whose name parses with `parse`
fn walk_named<T>(dir: &Path, parse: impl Fn(&str) -> Option<T>) -> Result<Vec<(T, PathBuf)>> {
    require_dir(dir)?;
    let mut matches = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        match parse(name) {
            Some(parsed) => matches.push((parsed, entry.into_path())),
            None => debug!(path = %entry.path().display(), "Ignoring file"),
        }
    }
    Ok(matches)
}

/// Finds `<var>.<YYYY>.nc` sources.
///
/// Without a year range the whole tree under `input` is searched; with one,
/// `<input>/<var>.<YYYY>.nc` is expected for every year of the range.
pub fn find_sources(
    input: &Path,
    variable: &str,
    years: Option<YearRange>,
) -> Result<SourceListing> {
    require_dir(input)?;
    let mut listing = SourceListing::default();

    match years {
        Some(range) => {
            for year in range.start..=range.end {
                let name = SourceName::new(variable, year);
                let path = input.join(name.file_name());
                if path.is_file() {
                    listing.found.push((name, path));
                } else {
                    listing.missing.push((name, path));
                }
            }
        }
        None => {
            listing.found = walk_named(input, |file_name| {
                SourceName::parse(file_name)
                    .ok()
                    .filter(|source| source.variable == variable)
            })?;
            listing
                .found
                .sort_by(|(a, pa), (b, pb)| a.year.cmp(&b.year).then_with(|| pa.cmp(pb)));
        }
    }
    Ok(listing)
}

/// Finds the daily rasters of `variable`, ordered by date.
pub fn find_rasters(dir: &Path, variable: &str) -> Result<Vec<(RasterKey, PathBuf)>> {
    let mut rasters = walk_named(dir, |file_name| {
        RasterKey::parse_file_name(file_name)
            .ok()
            .filter(|key| key.variable == variable)
    })?;
    rasters.sort();
    Ok(rasters)
}

/// Finds raw (`raw = true`) or normalized statistics tables of one geometry
/// kind, ordered by date whether or not their names are zero-padded.
pub fn find_tables(
    dir: &Path,
    variable: &str,
    kind: GeometryKind,
    raw: bool,
) -> Result<Vec<(TableName, PathBuf)>> {
    let mut tables = walk_named(dir, |file_name| {
        TableName::parse(file_name)
            .ok()
            .filter(|t| t.key.variable == variable && t.kind == kind && t.raw == raw)
    })?;
    tables.sort_by(|(a, pa), (b, pb)| a.key.cmp(&b.key).then_with(|| pa.cmp(pb)));
    Ok(tables)
}
