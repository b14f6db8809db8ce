//! File-name grammar shared by every stage
//!
//! The directory layout is the only interface between stages, so every name
//! the pipeline writes or reads goes through this module:
//!
//! | artefact             | grammar                                  |
//! |----------------------|------------------------------------------|
//! | source grid          | `<var>.<YYYY>.nc`                        |
//! | year directory       | `<var>.<YYYY>`                           |
//! | daily raster         | `<var>_<YYYY>_<MM>_<DD>.tif`             |
//! | engine-native table  | `<var>_<YYYY>_<MM>_<DD>_<pt|pg>.raw.csv` |
//! | per-date table       | `<var>_<YYYY>_<MM>_<DD>_<pt|pg>.csv`     |
//! | statistic column     | `d<YYYY>_<MM>_<DD>`                      |
//!
//! `<var>` is made of ASCII letters, digits and `-`. Month and day are
//! written zero-padded so that lexical order is chronological order; the
//! parsers also accept unpadded month and day.

use crate::errors::{PipelineError, Result};
use chrono::{Datelike, NaiveDate};
use std::fmt;

pub const RASTER_EXTENSION: &str = "tif";
pub const SOURCE_EXTENSION: &str = "nc";
const RAW_TABLE_SUFFIX: &str = ".raw.csv";
const TABLE_SUFFIX: &str = ".csv";

/// Geometry type of a statistics table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryKind {
    Point,
    Polygon,
}

impl GeometryKind {
    /// Short tag used in table file names
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Point => "pt",
            Self::Polygon => "pg",
        }
    }

    /// Column holding the statistic in engine-native tables
    #[must_use]
    pub const fn stat_field(self) -> &'static str {
        match self {
            Self::Point => "RASTERVALU",
            Self::Polygon => "MEAN",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Polygon => "polygon",
        }
    }

    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "pt" => Some(Self::Point),
            "pg" => Some(Self::Polygon),
            _ => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks that a variable name fits the grammar.
pub fn validate_variable(variable: &str) -> Result<()> {
    if variable.is_empty() {
        return Err(PipelineError::Config("variable name must not be empty".to_string()));
    }
    if !variable.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(PipelineError::Config(format!(
            "variable name '{variable}' may only contain letters, digits and '-'"
        )));
    }
    Ok(())
}

fn name_error(name: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::FileName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_number(name: &str, part: &str, max_len: usize, what: &str) -> Result<u32> {
    if part.is_empty() || part.len() > max_len || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(name_error(name, format!("'{part}' is not a valid {what}")));
    }
    part.parse::<u32>()
        .map_err(|_| name_error(name, format!("'{part}' is not a valid {what}")))
}

fn parse_year(name: &str, part: &str) -> Result<i32> {
    if part.len() != 4 {
        return Err(name_error(name, format!("'{part}' is not a four-digit year")));
    }
    // four ASCII digits always fit
    Ok(parse_number(name, part, 4, "year")? as i32)
}

/// A source grid file, `<var>.<YYYY>.nc`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceName {
    pub variable: String,
    pub year: i32,
}

impl SourceName {
    pub fn new(variable: impl Into<String>, year: i32) -> Self {
        Self {
            variable: variable.into(),
            year,
        }
    }

    pub fn parse(file_name: &str) -> Result<Self> {
        let parts: Vec<&str> = file_name.split('.').collect();
        match parts.as_slice() {
            [variable, year, ext] if *ext == SOURCE_EXTENSION => {
                validate_variable(variable).map_err(|_| name_error(file_name, "bad variable"))?;
                Ok(Self::new(*variable, parse_year(file_name, year)?))
            }
            _ => Err(name_error(file_name, "expected '<var>.<YYYY>.nc'")),
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{:04}.{SOURCE_EXTENSION}", self.variable, self.year)
    }

    /// Directory receiving the rasters extracted from this file
    #[must_use]
    pub fn year_dir(&self) -> String {
        format!("{}.{:04}", self.variable, self.year)
    }
}

/// Identity of one daily raster: variable plus calendar date
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RasterKey {
    pub variable: String,
    pub date: NaiveDate,
}

impl RasterKey {
    pub fn new(variable: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            variable: variable.into(),
            date,
        }
    }

    /// Parses `<var>_<YYYY>_<M>_<D>.tif`.
    pub fn parse_file_name(file_name: &str) -> Result<Self> {
        let stem = file_name
            .strip_suffix(&format!(".{RASTER_EXTENSION}"))
            .ok_or_else(|| name_error(file_name, "expected a .tif raster"))?;
        Self::parse_stem(file_name, stem)
    }

    fn parse_stem(file_name: &str, stem: &str) -> Result<Self> {
        let parts: Vec<&str> = stem.split('_').collect();
        let [variable, year, month, day] = parts.as_slice() else {
            return Err(name_error(file_name, "expected '<var>_<YYYY>_<MM>_<DD>'"));
        };
        validate_variable(variable).map_err(|_| name_error(file_name, "bad variable"))?;
        let year = parse_year(file_name, year)?;
        let month = parse_number(file_name, month, 2, "month")?;
        let day = parse_number(file_name, day, 2, "day")?;
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| name_error(file_name, "not a calendar date"))?;
        Ok(Self::new(*variable, date))
    }

    /// `<var>_<YYYY>_<MM>_<DD>`
    #[must_use]
    pub fn stem(&self) -> String {
        format!(
            "{}_{:04}_{:02}_{:02}",
            self.variable,
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{RASTER_EXTENSION}", self.stem())
    }

    #[must_use]
    pub fn year_dir(&self) -> String {
        SourceName::new(self.variable.clone(), self.date.year()).year_dir()
    }

    /// Name of the statistics table for this raster; `raw` selects the
    /// engine-native table instead of the normalized per-date CSV.
    #[must_use]
    pub fn table_file_name(&self, kind: GeometryKind, raw: bool) -> String {
        let suffix = if raw { RAW_TABLE_SUFFIX } else { TABLE_SUFFIX };
        format!("{}_{}{suffix}", self.stem(), kind.suffix())
    }

    /// Statistic column name, `d<YYYY>_<MM>_<DD>`
    #[must_use]
    pub fn stat_column(&self) -> String {
        stat_column(self.date)
    }
}

impl fmt::Display for RasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

#[must_use]
pub fn stat_column(date: NaiveDate) -> String {
    format!("d{:04}_{:02}_{:02}", date.year(), date.month(), date.day())
}

/// Recovers the date from a statistic column name.
#[must_use]
pub fn parse_stat_column(column: &str) -> Option<NaiveDate> {
    let rest = column.strip_prefix('d')?;
    let parts: Vec<&str> = rest.split('_').collect();
    let [year, month, day] = parts.as_slice() else {
        return None;
    };
    let year = parse_year(column, year).ok()?;
    let month = parse_number(column, month, 2, "month").ok()?;
    let day = parse_number(column, day, 2, "day").ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// A statistics table file, raw or normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub key: RasterKey,
    pub kind: GeometryKind,
    pub raw: bool,
}

impl TableName {
    pub fn parse(file_name: &str) -> Result<Self> {
        let (stem, raw) = if let Some(stem) = file_name.strip_suffix(RAW_TABLE_SUFFIX) {
            (stem, true)
        } else if let Some(stem) = file_name.strip_suffix(TABLE_SUFFIX) {
            (stem, false)
        } else {
            return Err(name_error(file_name, "expected a .csv table"));
        };
        let (key_part, kind_part) = stem
            .rsplit_once('_')
            .ok_or_else(|| name_error(file_name, "missing geometry tag"))?;
        let kind = GeometryKind::from_suffix(kind_part)
            .ok_or_else(|| name_error(file_name, format!("unknown geometry tag '{kind_part}'")))?;
        let key = RasterKey::parse_stem(file_name, key_part)?;
        Ok(Self { key, kind, raw })
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.key.table_file_name(self.kind, self.raw)
    }
}

/// Appends `.csv` to a user supplied output name when it is missing.
#[must_use]
pub fn ensure_csv_extension(name: &str) -> String {
    if name.ends_with(TABLE_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{TABLE_SUFFIX}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn source_names() {
        let source = SourceName::parse("prate.1990.nc").unwrap();
        assert_eq!(source, SourceName::new("prate", 1990));
        assert_eq!(source.file_name(), "prate.1990.nc");
        assert_eq!(source.year_dir(), "prate.1990");

        assert!(SourceName::parse("prate.90.nc").is_err());
        assert!(SourceName::parse("prate.1990.tif").is_err());
        assert!(SourceName::parse("prate_x.1990.nc").is_err());
    }

    #[test]
    fn raster_names_accept_unpadded_dates() {
        let padded = RasterKey::parse_file_name("prate_1990_01_05.tif").unwrap();
        let unpadded = RasterKey::parse_file_name("prate_1990_1_5.tif").unwrap();
        assert_eq!(padded, unpadded);
        assert_eq!(padded.date, date(1990, 1, 5));
        assert_eq!(unpadded.file_name(), "prate_1990_01_05.tif");
        assert_eq!(unpadded.year_dir(), "prate.1990");
    }

    #[test]
    fn raster_names_reject_invalid_dates() {
        assert!(RasterKey::parse_file_name("prate_1990_02_30.tif").is_err());
        assert!(RasterKey::parse_file_name("prate_1990_13_01.tif").is_err());
        assert!(RasterKey::parse_file_name("prate_1990_01.tif").is_err());
        assert!(RasterKey::parse_file_name("prate_1990_01_01.nc").is_err());
    }

    #[test]
    fn stat_columns_sort_chronologically() {
        let a = stat_column(date(1990, 2, 1));
        let b = stat_column(date(1990, 10, 1));
        assert_eq!(a, "d1990_02_01");
        assert!(a < b);
        assert_eq!(parse_stat_column(&b), Some(date(1990, 10, 1)));
        assert_eq!(parse_stat_column("COMM_ID"), None);
    }

    #[test]
    fn table_names_round_trip_through_parse() {
        let key = RasterKey::new("prate", date(2001, 7, 4));
        let raw = key.table_file_name(GeometryKind::Point, true);
        let csv = key.table_file_name(GeometryKind::Polygon, false);
        assert_eq!(raw, "prate_2001_07_04_pt.raw.csv");
        assert_eq!(csv, "prate_2001_07_04_pg.csv");

        let parsed = TableName::parse(&raw).unwrap();
        assert_eq!(parsed.key, key);
        assert_eq!(parsed.kind, GeometryKind::Point);
        assert!(parsed.raw);

        let parsed = TableName::parse(&csv).unwrap();
        assert_eq!(parsed.kind, GeometryKind::Polygon);
        assert!(!parsed.raw);

        assert!(TableName::parse("prate_2001_07_04_xx.csv").is_err());
        assert!(TableName::parse("merged.csv").is_err());
    }

    #[test]
    fn csv_extension_is_appended_once() {
        assert_eq!(ensure_csv_extension("points"), "points.csv");
        assert_eq!(ensure_csv_extension("points.csv"), "points.csv");
    }
}
