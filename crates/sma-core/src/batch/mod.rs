//! Batch orchestration: detect, normalize, extract and persist each unit.
//!
//! Units run concurrently up to the configured parallelism. A failure in any
//! stage is recorded against its unit and the batch carries on. Coverage is
//! recomputed once after every unit has finished.

mod report;
mod source;

pub use report::{BatchReport, Stage, UnitErrorKind, UnitFailure, UnitOutcome, UnitState};
pub use source::{ManifestSource, SourceError, UnitSource};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::context::OrgContext;
use crate::extract::{extract_facts, Extraction, NoResolver, VariableResolver};
use crate::flow::{FlowError, ParserRegistry, RawFormat, RawUnit};
use crate::graph::{AutomationUnit, CoverageScope, GraphError, GraphStore};

/// Drives extraction of a batch of units into a graph store.
pub struct BatchOrchestrator {
    store: Arc<dyn GraphStore>,
    registry: Arc<ParserRegistry>,
    resolver: Arc<dyn VariableResolver>,
    config: ExtractionConfig,
    /// Token for the current or next run; replaced once a run observes it cancelled.
    cancel: Mutex<CancellationToken>,
    last_report: RwLock<Option<BatchReport>>,
}

/// Tracks one unit through its stages.
struct UnitRun {
    outcome: UnitOutcome,
}

impl UnitRun {
    fn new(unit: &RawUnit) -> Self {
        Self {
            outcome: UnitOutcome {
                unit_id: unit.unit_id.clone(),
                version_number: unit.version_number,
                logical_name: unit.logical_name.clone(),
                state: UnitState::Pending,
                format: None,
                fact_count: 0,
                warnings: Vec::new(),
            },
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(unit_id = %self.outcome.unit_id, %stage, "Unit stage");
        self.outcome.state = UnitState::InProgress { stage };
    }

    fn stage(&self) -> Stage {
        match self.outcome.state {
            UnitState::InProgress { stage } => stage,
            _ => Stage::Detecting,
        }
    }

    fn fail(mut self, kind: UnitErrorKind, reason: String) -> UnitOutcome {
        let stage = self.stage();
        warn!(unit_id = %self.outcome.unit_id, %stage, %kind, "Unit failed: {}", reason);
        self.outcome.state = UnitState::Failed { stage, kind, reason };
        self.outcome
    }

    fn fail_flow(self, err: FlowError) -> UnitOutcome {
        let kind = match err {
            FlowError::FormatUnrecognized { .. } => UnitErrorKind::FormatUnrecognized,
            FlowError::Normalization { .. } => UnitErrorKind::NormalizationError,
        };
        self.fail(kind, err.to_string())
    }

    fn cancel(mut self) -> UnitOutcome {
        debug!(unit_id = %self.outcome.unit_id, "Unit cancelled before commit");
        self.outcome.state = UnitState::Cancelled;
        self.outcome
    }

    fn finish(mut self) -> UnitOutcome {
        debug!(unit_id = %self.outcome.unit_id, facts = self.outcome.fact_count, "Unit done");
        self.outcome.state = UnitState::Done;
        self.outcome
    }
}

/// A unit ready to persist.
struct Prepared {
    run: UnitRun,
    unit: AutomationUnit,
    extraction: Extraction,
}

/// CPU-only stages: detect, normalize, extract.
fn prepare(
    mut run: UnitRun,
    registry: &ParserRegistry,
    resolver: &dyn VariableResolver,
    raw: RawUnit,
    declared: Option<RawFormat>,
) -> Result<Prepared, UnitOutcome> {
    run.enter(Stage::Detecting);
    let format = match registry.detect(&raw.unit_id, &raw.raw_payload) {
        Ok(format) => format,
        Err(e) => return Err(run.fail_flow(e)),
    };
    run.outcome.format = Some(format);
    if let Some(declared) = declared {
        if declared != format {
            warn!(
                unit_id = %raw.unit_id,
                %declared,
                detected = %format,
                "Declared API revision implies a different format; using the detected one"
            );
        }
    }

    run.enter(Stage::Normalizing);
    let flow = match registry.normalize(&raw.unit_id, format, &raw.raw_payload) {
        Ok(flow) => flow,
        Err(e) => return Err(run.fail_flow(e)),
    };

    run.enter(Stage::Extracting);
    let extraction = extract_facts(&raw.unit_id, raw.version_number, &flow, resolver);
    run.outcome.fact_count = extraction.facts.len();
    run.outcome.warnings = extraction.warnings.clone();

    Ok(Prepared {
        run,
        unit: AutomationUnit::from_flow(&raw, &flow),
        extraction,
    })
}

impl BatchOrchestrator {
    /// Create an orchestrator with the built-in parsers and no schema collaborator.
    pub fn new(store: Arc<dyn GraphStore>, config: ExtractionConfig) -> Self {
        Self {
            store,
            registry: Arc::new(ParserRegistry::new()),
            resolver: Arc::new(NoResolver),
            config,
            cancel: Mutex::new(CancellationToken::new()),
            last_report: RwLock::new(None),
        }
    }

    /// Use a schema collaborator for variables a unit does not declare.
    pub fn with_resolver(mut self, resolver: Arc<dyn VariableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a custom parser registry.
    pub fn with_registry(mut self, registry: Arc<ParserRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Cancel the next run through an externally owned token.
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token;
        self
    }

    /// Token that cancels the in-flight run, or the next one if none is running.
    ///
    /// A cancellation is consumed by the run it stops: later runs start with a
    /// fresh token, so fetch the token again for each run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in a fresh token if `used` was cancelled and is still current.
    fn reset_cancellation(&self, used: &CancellationToken) {
        if !used.is_cancelled() {
            return;
        }
        let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Run extraction over `units` for `ctx`.
    ///
    /// Never fails: every per-unit error is captured in the report. Coverage
    /// is recomputed after all units have finished, including after a
    /// cancellation, over whatever has been committed.
    pub async fn run_extraction(&self, ctx: &OrgContext, units: Vec<RawUnit>) -> BatchReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let parallelism = self.config.parallelism.max(1);
        let cancel = self.cancellation_token();
        info!(
            run_id = %run_id,
            org = %ctx.label(),
            units = units.len(),
            parallelism,
            "Starting extraction batch"
        );

        let outcomes: Vec<UnitOutcome> = stream::iter(units)
            .map(|unit| self.process_unit(unit, &cancel))
            .buffered(parallelism)
            .collect()
            .await;

        let mut report = BatchReport::from_outcomes(run_id, ctx.label().to_string(), started_at, outcomes);

        match self.store.recompute_coverage(&CoverageScope::Global).await {
            Ok(rows) => report.coverage_rows = rows.len(),
            Err(e) => {
                warn!(run_id = %report.run_id, "Coverage recomputation failed: {}", e);
                report.coverage_error = Some(e.to_string());
            }
        }
        report.finished_at = Utc::now();

        if let Err(e) = self.store.save_batch_report(&report).await {
            warn!(run_id = %report.run_id, "Failed to persist batch report: {}", e);
        }

        info!(
            run_id = %report.run_id,
            succeeded = report.succeeded_count,
            failed = report.failed_count,
            cancelled = report.cancelled_count,
            warnings = report.warning_count(),
            "Extraction batch finished"
        );

        self.reset_cancellation(&cancel);
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Fetch the units from `source` and run extraction over them.
    ///
    /// Fails only when the input sequence cannot be obtained.
    pub async fn run_from_source(
        &self,
        ctx: &OrgContext,
        source: &dyn UnitSource,
    ) -> Result<BatchReport, SourceError> {
        let units = source.fetch_units().await?;
        Ok(self.run_extraction(ctx, units).await)
    }

    /// Report of the most recent run: this process's, else the stored one.
    pub async fn get_batch_report(&self) -> Result<Option<BatchReport>, GraphError> {
        if let Some(report) = self.last_report.read().await.as_ref() {
            return Ok(Some(report.clone()));
        }
        self.store.latest_batch_report().await
    }

    async fn process_unit(&self, raw: RawUnit, cancel: &CancellationToken) -> UnitOutcome {
        let run = UnitRun::new(&raw);
        if cancel.is_cancelled() {
            return run.cancel();
        }

        let unit_id = raw.unit_id.clone();
        let version_number = raw.version_number;
        let logical_name = raw.logical_name.clone();
        let declared = raw
            .declared_api_revision
            .map(|revision| self.config.declared_format(revision));
        let registry = Arc::clone(&self.registry);
        let resolver: Arc<dyn VariableResolver> = if self.config.resolve_with_collaborator {
            Arc::clone(&self.resolver)
        } else {
            Arc::new(NoResolver)
        };

        let prepared =
            tokio::task::spawn_blocking(move || prepare(run, &registry, resolver.as_ref(), raw, declared))
                .await;

        let Prepared {
            mut run,
            unit,
            extraction,
        } = match prepared {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(outcome)) => return outcome,
            Err(join_err) => {
                let mut run = UnitRun::new(&RawUnit::new(unit_id, version_number, logical_name, ""));
                run.enter(Stage::Normalizing);
                return run.fail(
                    UnitErrorKind::NormalizationError,
                    format!("normalization worker failed: {}", join_err),
                );
            }
        };

        if cancel.is_cancelled() {
            return run.cancel();
        }

        run.enter(Stage::Persisting);
        if let Err(e) = self.store.replace_facts(&unit, &extraction.facts).await {
            return run.fail(UnitErrorKind::StoreTransactionFailure, e.to_string());
        }

        run.finish()
    }
}
