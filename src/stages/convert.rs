//! Engine-native tables to per-date CSVs

use crate::config::{PipelineConfig, Stage};
use crate::discovery::find_tables;
use crate::errors::{PipelineError, Result};
use crate::naming::{GeometryKind, RasterKey};
use crate::report::{StageReport, UnitOutcome};
use crate::table::{normalize, StatTable};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Converts every raw table under `table_dir` for the configured geometry
/// kinds, writing the per-date CSV next to it.
///
/// # Errors
///
/// Returns an error if `table_dir` does not exist.
pub fn run(config: &PipelineConfig, table_dir: &Path) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Convert.as_str());

    for kind in config.configured_kinds() {
        let Some(id_field) = config.id_field(kind) else {
            continue;
        };
        let tables = find_tables(table_dir, &config.variable, kind, true)?;
        info!("Converting {} {} tables", tables.len(), kind);

        for (name, raw_path) in tables {
            let unit = name.file_name();
            let target = raw_path.with_file_name(name.key.table_file_name(kind, false));
            let outcome = if target.exists() {
                UnitOutcome::Skipped
            } else {
                match convert_table(&raw_path, &target, &name.key, kind, id_field) {
                    Ok(()) => UnitOutcome::Done,
                    Err(e) => UnitOutcome::Failed {
                        reason: e.to_string(),
                    },
                }
            };

            if config.delete_intermediate && !matches!(outcome, UnitOutcome::Failed { .. }) {
                match fs::remove_file(&raw_path) {
                    Ok(()) => debug!("Removed {}", raw_path.display()),
                    Err(e) => warn!("Could not remove {}: {}", raw_path.display(), e),
                }
            }
            report.record(unit, outcome);
        }
    }
    Ok(report)
}

/// Reduces one raw table to `{id_field, d<YYYY>_<MM>_<DD>}` and writes it
/// to `target`.
///
/// # Errors
///
/// Fails if the raw table lacks the identifier or statistic column.
pub fn convert_table(
    raw_path: &Path,
    target: &Path,
    key: &RasterKey,
    kind: GeometryKind,
    id_field: &str,
) -> Result<()> {
    let name = raw_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::NotFound(raw_path.to_path_buf()))?;
    let raw = StatTable::read_csv(raw_path)?;
    let (table, missing) = normalize(
        &raw,
        id_field,
        kind.stat_field(),
        &key.stat_column(),
        &name,
    )?;
    for column in missing {
        warn!("{}: column '{}' not present, nothing to drop", name, column);
    }
    table.write_csv(target)
}
