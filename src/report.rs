//! Per-unit outcomes and the run report
//!
//! Stages never swallow a per-unit failure silently: every unit of work ends
//! as a [`UnitOutcome`] recorded in the stage's [`StageReport`]. The
//! [`RunReport`] is logged at the end of a run and can be written as JSON.

use crate::errors::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// The unit's output was produced
    Done,
    /// The output already existed
    Skipped,
    /// The unit could not be processed; the batch continued
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub unit: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub units: Vec<UnitRecord>,
}

impl StageReport {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, unit: impl Into<String>, outcome: UnitOutcome) {
        let unit = unit.into();
        match &outcome {
            UnitOutcome::Done => {
                debug!(stage = %self.stage, unit = %unit, "done");
                self.done += 1;
            }
            UnitOutcome::Skipped => {
                info!(stage = %self.stage, unit = %unit, "output exists, skipped");
                self.skipped += 1;
            }
            UnitOutcome::Failed { reason } => {
                error!(stage = %self.stage, unit = %unit, "failed: {}", reason);
                self.failed += 1;
            }
        }
        self.units.push(UnitRecord { unit, outcome });
    }

    /// Records `Done` on success and `Failed` with the error text otherwise.
    pub fn record_result(&mut self, unit: impl Into<String>, result: Result<()>) {
        let outcome = match result {
            Ok(()) => UnitOutcome::Done,
            Err(e) => UnitOutcome::Failed {
                reason: e.to_string(),
            },
        };
        self.record(unit, outcome);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Failed { .. }))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn push(&mut self, stage: StageReport) {
        self.stages.push(stage);
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(|s| s.failed > 0)
    }

    /// Logs one summary line per stage and every failure.
    pub fn log_summary(&self) {
        for stage in &self.stages {
            info!(
                "{}: {} units, {} done, {} skipped, {} failed",
                stage.stage,
                stage.total(),
                stage.done,
                stage.skipped,
                stage.failed
            );
            for failure in stage.failures() {
                if let UnitOutcome::Failed { reason } = &failure.outcome {
                    warn!("  {} failed: {}", failure.unit, reason);
                }
            }
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Run report written to {}", path.display());
        Ok(())
    }
}
