//! Per-date CSVs to one time series per geometry kind

use crate::config::{PipelineConfig, Stage};
use crate::discovery::find_tables;
use crate::errors::Result;
use crate::merge::merge_files;
use crate::report::{StageReport, UnitOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Merges the per-date CSVs under `table_dir` into one file per configured
/// geometry kind in `output_dir`.
///
/// # Errors
///
/// Returns an error if `table_dir` does not exist or `output_dir` cannot be
/// created.
pub fn run(config: &PipelineConfig, table_dir: &Path, output_dir: &Path) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Merge.as_str());
    fs::create_dir_all(output_dir)?;

    for kind in config.configured_kinds() {
        let Some(id_field) = config.id_field(kind) else {
            continue;
        };
        let output_name = config.merge.output_name(kind);
        let target = output_dir.join(&output_name);
        if target.exists() {
            report.record(output_name, UnitOutcome::Skipped);
            continue;
        }

        let paths: Vec<PathBuf> = find_tables(table_dir, &config.variable, kind, false)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        if paths.is_empty() {
            info!("No {} tables to merge under {}", kind, table_dir.display());
            continue;
        }

        info!(
            "Merging {} {} tables into {} ({:?}{})",
            paths.len(),
            kind,
            target.display(),
            config.merge.strategy,
            if config.merge.long { ", long" } else { "" }
        );
        let result = merge_files(&paths, id_field, config.merge.strategy)
            .and_then(|merged| merged.write_csv(&target, config.merge.long));
        report.record_result(output_name, result);
    }
    Ok(report)
}
