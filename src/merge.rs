//! Combining per-date tables into one time series
//!
//! Every input is a per-date table holding exactly the identifier column and
//! one statistic column. Inputs are combined in order into a
//! [`MergedTable`], which can be written wide (one column per date) or long
//! (`<id>,date,value`).

use crate::errors::{PipelineError, Result};
use crate::naming::parse_stat_column;
use crate::table::StatTable;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How a later input is combined with the columns merged so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Every input adds a new column; a repeated column name is an error
    #[default]
    OuterJoin,
    /// Inputs accumulate into columns by name; a repeated column name fills
    /// the null cells of the existing column
    Append,
}

/// A wide table keyed by identifier; `None` is a null cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTable {
    pub id_column: String,
    pub ids: Vec<String>,
    pub columns: Vec<String>,
    /// `values[row][column]`
    pub values: Vec<Vec<Option<String>>>,
}

/// Running merge state; inputs are folded in one at a time, so only the
/// accumulated table and the current input are held in memory.
#[derive(Debug)]
pub struct MergeAccumulator {
    table: MergedTable,
    strategy: MergeStrategy,
    row_of: HashMap<String, usize>,
    column_of: HashMap<String, usize>,
}

impl MergeAccumulator {
    pub fn new(id_column: impl Into<String>, strategy: MergeStrategy) -> Self {
        Self {
            table: MergedTable::new(id_column),
            strategy,
            row_of: HashMap::new(),
            column_of: HashMap::new(),
        }
    }

    /// Folds one per-date table into the accumulator.
    ///
    /// Identifiers not seen before get a new row with null cells in every
    /// earlier column.
    ///
    /// # Errors
    ///
    /// Fails if the table lacks the identifier column, carries anything
    /// other than the identifier and one statistic, or (outer join only)
    /// repeats a statistic column already merged.
    pub fn push(&mut self, name: &str, table: StatTable) -> Result<()> {
        let (id_index, stat_index) = split_columns(&table, &self.table.id_column, name)?;
        let column = &table.headers[stat_index];
        let col = match (self.column_of.get(column).copied(), self.strategy) {
            (Some(_), MergeStrategy::OuterJoin) => {
                return Err(PipelineError::ColumnDiscipline {
                    table: name.to_string(),
                    message: format!("column '{column}' was already merged"),
                });
            }
            (Some(col), MergeStrategy::Append) => col,
            (None, _) => self.add_column(column.clone()),
        };

        let rows = table.len();
        for mut cells in table.rows {
            let value = std::mem::take(&mut cells[stat_index]);
            let id = std::mem::take(&mut cells[id_index]);
            let row = self.row(id.clone());
            let cell = &mut self.table.values[row][col];
            if cell.is_some() {
                warn!("{}: duplicate identifier '{}', first value kept", name, id);
                continue;
            }
            *cell = Some(value).filter(|v| !v.is_empty());
        }
        debug!("Merged {} ({} rows)", name, rows);
        Ok(())
    }

    fn add_column(&mut self, column: String) -> usize {
        let col = self.table.columns.len();
        self.column_of.insert(column.clone(), col);
        self.table.columns.push(column);
        for row in &mut self.table.values {
            row.push(None);
        }
        col
    }

    fn row(&mut self, id: String) -> usize {
        if let Some(&row) = self.row_of.get(&id) {
            return row;
        }
        let row = self.table.ids.len();
        self.table.values.push(vec![None; self.table.columns.len()]);
        self.row_of.insert(id.clone(), row);
        self.table.ids.push(id);
        row
    }

    #[must_use]
    pub fn finish(self) -> MergedTable {
        self.table
    }
}

impl MergedTable {
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            ids: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Merges named tables in the given order.
    ///
    /// Rows are identifiers in first-appearance order, columns are statistic
    /// columns in input order.
    ///
    /// # Errors
    ///
    /// See [`MergeAccumulator::push`].
    pub fn merge<S: AsRef<str>>(
        id_column: &str,
        tables: impl IntoIterator<Item = (S, StatTable)>,
        strategy: MergeStrategy,
    ) -> Result<Self> {
        let mut acc = MergeAccumulator::new(id_column, strategy);
        for (name, table) in tables {
            acc.push(name.as_ref(), table)?;
        }
        Ok(acc.finish())
    }

    /// One row per identifier, one column per statistic.
    #[must_use]
    pub fn to_wide(&self) -> StatTable {
        let mut headers = vec![self.id_column.clone()];
        headers.extend(self.columns.iter().cloned());
        StatTable {
            headers,
            rows: self
                .ids
                .iter()
                .zip(&self.values)
                .map(|(id, values)| {
                    let mut row = vec![id.clone()];
                    row.extend(values.iter().map(|v| v.clone().unwrap_or_default()));
                    row
                })
                .collect(),
        }
    }

    /// One row per identifier and statistic column: `<id>,date,value`.
    ///
    /// Statistic columns named `dYYYY_MM_DD` are written as `YYYY-MM-DD`;
    /// other column names are written unchanged.
    #[must_use]
    pub fn to_long(&self) -> StatTable {
        let dates: Vec<String> = self
            .columns
            .iter()
            .map(|c| parse_stat_column(c).map_or_else(|| c.clone(), |d| d.to_string()))
            .collect();
        let mut table = StatTable::new([self.id_column.as_str(), "date", "value"]);
        for (id, values) in self.ids.iter().zip(&self.values) {
            for (date, value) in dates.iter().zip(values) {
                table.rows.push(vec![
                    id.clone(),
                    date.clone(),
                    value.clone().unwrap_or_default(),
                ]);
            }
        }
        table
    }

    pub fn write_csv(&self, path: &Path, long: bool) -> Result<()> {
        if long {
            self.to_long().write_csv(path)
        } else {
            self.to_wide().write_csv(path)
        }
    }
}

/// `(identifier index, statistic index)` of a per-date table
fn split_columns(table: &StatTable, id_column: &str, name: &str) -> Result<(usize, usize)> {
    let id_index = table.require_column(id_column, name)?;
    if table.headers.len() != 2 {
        return Err(PipelineError::ColumnDiscipline {
            table: name.to_string(),
            message: format!(
                "expected '{}' and one statistic column, found [{}]",
                id_column,
                table.headers.join(", ")
            ),
        });
    }
    Ok((id_index, 1 - id_index))
}

/// Reads and merges per-date CSV files in the given order, one file at a
/// time.
pub fn merge_files(
    paths: &[PathBuf],
    id_column: &str,
    strategy: MergeStrategy,
) -> Result<MergedTable> {
    let mut acc = MergeAccumulator::new(id_column, strategy);
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        acc.push(&name, StatTable::read_csv(path)?)?;
    }
    Ok(acc.finish())
}
