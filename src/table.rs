//! Statistics tables
//!
//! [`StatTable`] is a plain header + string-cell table backed by the `csv`
//! crate. An empty cell is a null. It is the on-disk form of both the
//! engine-native tables (`*.raw.csv`) and the normalized per-date CSVs.

use crate::engine::ZoneStat;
use crate::errors::{PipelineError, Result};
use crate::layer::GeometryLayer;
use crate::naming::GeometryKind;
use crate::raster::partial_path;
use csv::{ReaderBuilder, Writer};
use std::fs;
use std::path::Path;

pub const FID_COLUMN: &str = "FID";
pub const OID_COLUMN: &str = "OID";
pub const COUNT_COLUMN: &str = "COUNT";
pub const AREA_COLUMN: &str = "AREA";

/// Columns the engine writes into its native tables for `kind`, statistic
/// included. A layer field with one of these names would be duplicated.
#[must_use]
pub fn generated_columns(kind: GeometryKind) -> &'static [&'static str] {
    const POINT: &[&str] = &[FID_COLUMN, GeometryKind::Point.stat_field()];
    const POLYGON: &[&str] = &[
        OID_COLUMN,
        COUNT_COLUMN,
        AREA_COLUMN,
        GeometryKind::Polygon.stat_field(),
    ];
    match kind {
        GeometryKind::Point => POINT,
        GeometryKind::Polygon => POLYGON,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StatTable {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(PipelineError::ColumnDiscipline {
                table: "statistics table".to_string(),
                message: format!(
                    "row has {} cells but the table has {} columns",
                    row.len(),
                    self.headers.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must be present; `table` names the table in
    /// the error.
    pub fn require_column(&self, name: &str, table: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: name.to_string(),
                table: table.to_string(),
            })
    }

    /// Cells of one column, top to bottom
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[index].as_str()))
    }

    /// Removes a column, returning `false` when it is not there.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        self.headers.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        true
    }

    /// Removes several columns; returns the names that were not present.
    pub fn drop_columns(&mut self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| !self.drop_column(name))
            .cloned()
            .collect()
    }

    pub fn rename_column(&mut self, from: &str, to: &str, table: &str) -> Result<()> {
        let index = self.require_column(from, table)?;
        self.headers[index] = to.to_string();
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader.headers()?.iter().map(String::from).collect();
        let mut table = Self {
            headers,
            rows: Vec::new(),
        };
        for record in reader.records() {
            table.rows.push(record?.iter().map(String::from).collect());
        }
        Ok(table)
    }

    /// Writes the table under a temporary name and renames it into place.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let partial = partial_path(path);
        {
            let mut writer = Writer::from_path(&partial)?;
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&partial, path)?;
        Ok(())
    }
}

/// Cell text of an optional statistic
pub fn format_value<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Engine-native point table: `FID`, every layer attribute, `RASTERVALU`.
pub fn point_table(layer: &GeometryLayer, values: &[Option<f32>]) -> Result<StatTable> {
    let mut headers = vec![FID_COLUMN.to_string()];
    headers.extend(layer.fields.iter().cloned());
    headers.push(GeometryKind::Point.stat_field().to_string());
    let mut table = StatTable::new(headers);

    for (fid, (feature, value)) in layer.features.iter().zip(values).enumerate() {
        let mut row = vec![fid.to_string()];
        row.extend(layer.fields.iter().map(|f| feature.attribute(f).to_string()));
        row.push(format_value(*value));
        table.push_row(row)?;
    }
    Ok(table)
}

/// Engine-native zonal table: `OID`, the zone field, `COUNT`, `AREA`, `MEAN`.
pub fn zonal_table(zone_field: &str, stats: &[ZoneStat]) -> Result<StatTable> {
    let mut table = StatTable::new([
        OID_COLUMN,
        zone_field,
        COUNT_COLUMN,
        AREA_COLUMN,
        GeometryKind::Polygon.stat_field(),
    ]);
    for (oid, stat) in stats.iter().enumerate() {
        table.push_row(vec![
            (oid + 1).to_string(),
            stat.zone.clone(),
            stat.count.to_string(),
            stat.area.to_string(),
            format_value(stat.mean),
        ])?;
    }
    Ok(table)
}

/// Reduces an engine-native table to `{id, stat}` with the statistic renamed
/// to `column`.
///
/// Returns the table and the drop targets that were already absent.
pub fn normalize(
    raw: &StatTable,
    id_field: &str,
    stat_field: &str,
    column: &str,
    table: &str,
) -> Result<(StatTable, Vec<String>)> {
    raw.require_column(id_field, table)?;
    raw.require_column(stat_field, table)?;
    if id_field == stat_field {
        return Err(PipelineError::ColumnDiscipline {
            table: table.to_string(),
            message: format!("identifier and statistic are both '{id_field}'"),
        });
    }

    let mut normalized = raw.clone();
    let drop: Vec<String> = raw
        .headers
        .iter()
        .filter(|h| *h != id_field && *h != stat_field)
        .cloned()
        .collect();
    let missing = normalized.drop_columns(&drop);
    normalized.rename_column(stat_field, column, table)?;

    // duplicated headers survive a name-based drop
    if normalized.headers.len() != 2 {
        return Err(PipelineError::ColumnDiscipline {
            table: table.to_string(),
            message: format!(
                "expected identifier and one statistic, found [{}]",
                normalized.headers.join(", ")
            ),
        });
    }
    Ok((normalized, missing))
}
