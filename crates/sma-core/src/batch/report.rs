//! Batch run report and per-unit state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extract::ExtractionWarning;
use crate::flow::RawFormat;

/// Processing stage of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detecting,
    Normalizing,
    Extracting,
    Persisting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detecting => "detecting",
            Stage::Normalizing => "normalizing",
            Stage::Extracting => "extracting",
            Stage::Persisting => "persisting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitErrorKind {
    FormatUnrecognized,
    NormalizationError,
    StoreTransactionFailure,
}

impl fmt::Display for UnitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitErrorKind::FormatUnrecognized => "FormatUnrecognized",
            UnitErrorKind::NormalizationError => "NormalizationError",
            UnitErrorKind::StoreTransactionFailure => "StoreTransactionFailure",
        };
        f.write_str(s)
    }
}

/// Per-unit state machine:
/// `pending → in_progress(stage)… → done | failed(stage) | cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    InProgress {
        stage: Stage,
    },
    Done,
    Failed {
        stage: Stage,
        kind: UnitErrorKind,
        reason: String,
    },
    /// The batch was cancelled before this unit committed.
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed { .. } | UnitState::Cancelled)
    }
}

/// Final result for one unit of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit_id: String,
    pub version_number: u32,
    pub logical_name: String,
    pub state: UnitState,
    /// Detected format, once known.
    pub format: Option<RawFormat>,
    pub fact_count: usize,
    pub warnings: Vec<ExtractionWarning>,
}

/// One failed unit, as listed in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub version_number: u32,
    pub stage: Stage,
    pub error_kind: UnitErrorKind,
    pub message: String,
}

/// Result of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    /// Label of the org the run targeted.
    pub org: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    /// One entry per input unit, in input order.
    pub outcomes: Vec<UnitOutcome>,
    pub failures: Vec<UnitFailure>,
    /// Coverage rows written by the closing recomputation.
    pub coverage_rows: usize,
    /// Set when the closing coverage recomputation failed.
    pub coverage_error: Option<String>,
}

impl BatchReport {
    pub(crate) fn from_outcomes(
        run_id: String,
        org: String,
        started_at: DateTime<Utc>,
        outcomes: Vec<UnitOutcome>,
    ) -> Self {
        let mut report = Self {
            run_id,
            org,
            started_at,
            finished_at: Utc::now(),
            succeeded_count: 0,
            failed_count: 0,
            cancelled_count: 0,
            outcomes: Vec::new(),
            failures: Vec::new(),
            coverage_rows: 0,
            coverage_error: None,
        };

        for outcome in &outcomes {
            match &outcome.state {
                UnitState::Done => report.succeeded_count += 1,
                UnitState::Failed { stage, kind, reason } => {
                    report.failed_count += 1;
                    report.failures.push(UnitFailure {
                        unit_id: outcome.unit_id.clone(),
                        version_number: outcome.version_number,
                        stage: *stage,
                        error_kind: *kind,
                        message: reason.clone(),
                    });
                }
                UnitState::Cancelled => report.cancelled_count += 1,
                UnitState::Pending | UnitState::InProgress { .. } => {}
            }
        }
        report.outcomes = outcomes;
        report
    }

    /// Look up the outcome of a unit.
    pub fn outcome(&self, unit_id: &str) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| o.unit_id == unit_id)
    }

    /// Total extraction warnings across all units.
    pub fn warning_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.warnings.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, state: UnitState) -> UnitOutcome {
        UnitOutcome {
            unit_id: id.into(),
            version_number: 1,
            logical_name: id.into(),
            state,
            format: None,
            fact_count: 0,
            warnings: vec![],
        }
    }

    #[test]
    fn test_counts_from_outcomes() {
        let report = BatchReport::from_outcomes(
            "run".into(),
            "prod".into(),
            Utc::now(),
            vec![
                outcome("A", UnitState::Done),
                outcome(
                    "B",
                    UnitState::Failed {
                        stage: Stage::Normalizing,
                        kind: UnitErrorKind::NormalizationError,
                        reason: "unterminated element <decisions>".into(),
                    },
                ),
                outcome("C", UnitState::Cancelled),
            ],
        );

        assert_eq!(report.succeeded_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.cancelled_count, 1);
        assert_eq!(report.failures[0].unit_id, "B");
        assert_eq!(report.failures[0].stage, Stage::Normalizing);
        assert!(report.outcome("C").is_some());
    }

    #[test]
    fn test_state_json_shape() {
        let state = UnitState::InProgress {
            stage: Stage::Persisting,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"state": "in_progress", "stage": "persisting"}));
        assert!(!state.is_terminal());
        assert!(UnitState::Cancelled.is_terminal());
    }
}
