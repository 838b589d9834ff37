mod common;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sma_core::{
    AutomationUnit, BatchOrchestrator, BatchReport, CoverageAggregate, CoverageScope,
    DependencyEdge, DependentKind, DependentReference, FieldReferenceFact, GraphError, GraphStats,
    GraphStore, ManifestSource, OrgContext, RawFormat, RawUnit, SourceError, Stage,
    SurrealGraphStore, UnitErrorKind, UnitState, VariableResolver,
};

fn org() -> OrgContext {
    OrgContext::new("00D000000000001").with_alias("uat")
}

fn orchestrator(store: &Arc<SurrealGraphStore>, parallelism: usize) -> BatchOrchestrator {
    BatchOrchestrator::new(store.clone(), common::config(parallelism))
}

fn mixed_batch() -> Vec<RawUnit> {
    vec![
        common::unit("F1", 1, "Lead_Convert", "lead_convert.json"),
        common::unit("F2", 1, "Broken", "malformed.flow-meta.xml"),
        RawUnit::new("F3", 1, "Mystery", "hello, not a flow"),
        common::unit("F10", 1, "Account_Rollup", "account_rollup.flow-meta.xml"),
        RawUnit::new("F11", 2, "Opportunity_Sync", common::account_flow(&["Name"], &["Rating"])),
    ]
}

#[tokio::test]
async fn test_single_unit_lands_in_graph() {
    let store = common::memory_store().await;
    let report = orchestrator(&store, 4)
        .run_extraction(&org(), vec![common::unit("F1", 1, "Lead_Convert", "lead_convert.json")])
        .await;

    assert_eq!(report.org, "uat");
    assert_eq!(report.succeeded_count, 1);
    assert_eq!(report.failed_count, 0);
    let outcome = report.outcome("F1").unwrap();
    assert_eq!(outcome.state, UnitState::Done);
    assert_eq!(outcome.format, Some(RawFormat::StructuredDocument));
    assert_eq!(outcome.fact_count, 2);

    let edges = store.dependents_of("Account", "Rating").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].dependent_name, "Lead_Convert");
    assert!(report.coverage_rows > 0);
    assert!(report.coverage_error.is_none());
}

#[tokio::test]
async fn test_malformed_unit_fails_without_facts() {
    let store = common::memory_store().await;
    let report = orchestrator(&store, 1)
        .run_extraction(&org(), vec![common::unit("F2", 1, "Broken", "malformed.flow-meta.xml")])
        .await;

    assert_eq!(report.failed_count, 1);
    let failure = &report.failures[0];
    assert_eq!(failure.unit_id, "F2");
    assert_eq!(failure.error_kind, UnitErrorKind::NormalizationError);
    assert_eq!(failure.stage, Stage::Normalizing);
    assert_eq!(report.outcome("F2").unwrap().format, Some(RawFormat::LegacyMarkup));

    assert!(store.references_of("F2").await.unwrap().is_empty());
    assert_eq!(store.stats().await.unwrap().units, 0);
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let store = common::memory_store().await;
    let report = orchestrator(&store, 3).run_extraction(&org(), mixed_batch()).await;

    assert_eq!(report.succeeded_count, 3);
    assert_eq!(report.failed_count, 2);
    assert_eq!(report.cancelled_count, 0);

    let kinds: Vec<(&str, UnitErrorKind, Stage)> = report
        .failures
        .iter()
        .map(|f| (f.unit_id.as_str(), f.error_kind, f.stage))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("F2", UnitErrorKind::NormalizationError, Stage::Normalizing),
            ("F3", UnitErrorKind::FormatUnrecognized, Stage::Detecting),
        ]
    );

    assert_eq!(store.references_of("F10").await.unwrap().len(), 11);
    assert_eq!(store.references_of("F11").await.unwrap().len(), 2);
    assert!(report.outcomes.iter().all(|o| o.state.is_terminal()));
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let store = common::memory_store().await;
    let report = orchestrator(&store, 4).run_extraction(&org(), mixed_batch()).await;

    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.unit_id.as_str()).collect();
    assert_eq!(ids, vec!["F1", "F2", "F3", "F10", "F11"]);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = common::memory_store().await;
    let orchestrator = orchestrator(&store, 2);

    orchestrator.run_extraction(&org(), mixed_batch()).await;
    let first_stats = store.stats().await.unwrap();
    let first_facts = store.references_of("F10").await.unwrap();
    let first_edges = store.dependents_of("Account", "Rating").await.unwrap();

    let report = orchestrator.run_extraction(&org(), mixed_batch()).await;
    assert_eq!(report.succeeded_count, 3);
    assert_eq!(store.stats().await.unwrap(), first_stats);
    assert_eq!(store.references_of("F10").await.unwrap(), first_facts);

    let edges = store.dependents_of("Account", "Rating").await.unwrap();
    assert_eq!(edges.len(), first_edges.len());
    for (before, after) in first_edges.iter().zip(&edges) {
        assert_eq!(before.dependent_id, after.dependent_id);
        assert_eq!(before.discovered_at, after.discovered_at);
    }
}

#[tokio::test]
async fn test_parallelism_does_not_change_results() {
    let serial = common::memory_store().await;
    let parallel = common::memory_store().await;

    orchestrator(&serial, 1).run_extraction(&org(), mixed_batch()).await;
    orchestrator(&parallel, 4).run_extraction(&org(), mixed_batch()).await;

    assert_eq!(serial.stats().await.unwrap(), parallel.stats().await.unwrap());
    for unit in mixed_batch() {
        assert_eq!(
            serial.references_of(&unit.unit_id).await.unwrap(),
            parallel.references_of(&unit.unit_id).await.unwrap()
        );
    }

    let serial_coverage = serial.get_coverage(&CoverageScope::Global).await.unwrap();
    let parallel_coverage = parallel.get_coverage(&CoverageScope::Global).await.unwrap();
    let counts = |rows: &[CoverageAggregate]| -> Vec<(String, Option<String>, usize)> {
        rows.iter()
            .map(|r| (r.schema_entity.clone(), r.field_name.clone(), r.total_count))
            .collect()
    };
    assert_eq!(counts(&serial_coverage), counts(&parallel_coverage));
}

#[tokio::test]
async fn test_cancelled_batch_commits_nothing() {
    let store = common::memory_store().await;
    let orchestrator = orchestrator(&store, 2);
    orchestrator.cancellation_token().cancel();

    let report = orchestrator.run_extraction(&org(), mixed_batch()).await;

    assert_eq!(report.cancelled_count, 5);
    assert_eq!(report.succeeded_count, 0);
    assert!(report.outcomes.iter().all(|o| o.state == UnitState::Cancelled));
    assert_eq!(store.stats().await.unwrap().units, 0);
    assert_eq!(report.coverage_rows, 0);
}

#[tokio::test]
async fn test_report_is_persisted() {
    let store = common::memory_store().await;
    let report = orchestrator(&store, 2).run_extraction(&org(), mixed_batch()).await;

    let fresh = orchestrator(&store, 2);
    let stored = fresh.get_batch_report().await.unwrap().unwrap();
    assert_eq!(stored.run_id, report.run_id);
    assert_eq!(stored.failed_count, 2);
    assert_eq!(stored.failures, report.failures);
    assert_eq!(stored.outcomes.len(), 5);
}

#[tokio::test]
async fn test_no_report_before_first_run() {
    let store = common::memory_store().await;
    assert!(orchestrator(&store, 1).get_batch_report().await.unwrap().is_none());
}

#[tokio::test]
async fn test_declared_revision_mismatch_uses_detected_format() {
    let store = common::memory_store().await;
    let unit = common::unit("F1", 1, "Lead_Convert", "lead_convert.json").with_api_revision(40.0);

    let report = orchestrator(&store, 1).run_extraction(&org(), vec![unit]).await;

    let outcome = report.outcome("F1").unwrap();
    assert_eq!(outcome.state, UnitState::Done);
    assert_eq!(outcome.format, Some(RawFormat::StructuredDocument));
}

struct OpportunityResolver;

impl VariableResolver for OpportunityResolver {
    fn resolve_variable_source_entity(&self, _unit_id: &str, variable_name: &str) -> Option<String> {
        (variable_name == "inputOpp").then(|| "Opportunity".to_string())
    }
}

fn undeclared_variable_unit() -> RawUnit {
    let payload = serde_json::json!({
        "processType": "AutoLaunchedFlow",
        "assignments": [{
            "name": "Set_Step",
            "assignmentItems": [{"assignToReference": "inputOpp.NextStep", "value": {"stringValue": "Call"}}]
        }]
    });
    RawUnit::new("F30", 1, "Opp_Step", payload)
}

#[tokio::test]
async fn test_collaborator_resolution_can_be_disabled() {
    let store = common::memory_store().await;
    BatchOrchestrator::new(store.clone(), common::config(1))
        .with_resolver(Arc::new(OpportunityResolver))
        .run_extraction(&org(), vec![undeclared_variable_unit()])
        .await;
    let facts = store.references_of("F30").await.unwrap();
    assert_eq!(facts[0].schema_entity, "Opportunity");

    let store = common::memory_store().await;
    let mut config = common::config(1);
    config.resolve_with_collaborator = false;
    BatchOrchestrator::new(store.clone(), config)
        .with_resolver(Arc::new(OpportunityResolver))
        .run_extraction(&org(), vec![undeclared_variable_unit()])
        .await;
    let facts = store.references_of("F30").await.unwrap();
    assert_eq!(facts[0].schema_entity, "inputOpp");
}

#[tokio::test]
async fn test_manifest_source() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lead.json"), common::fixture("lead_convert.json")).unwrap();
    std::fs::write(
        dir.path().join("rollup.xml"),
        common::fixture("account_rollup.flow-meta.xml"),
    )
    .unwrap();
    let manifest = serde_json::json!({
        "units": [
            {"unit_id": "F1", "version_number": 1, "logical_name": "Lead_Convert",
             "payload_path": "lead.json", "declared_api_revision": 58.0},
            {"unit_id": "F10", "version_number": 4, "logical_name": "Account_Rollup",
             "payload_path": "rollup.xml"}
        ]
    });
    let manifest_path = dir.path().join("manifest.json");
    std::fs::write(&manifest_path, manifest.to_string()).unwrap();

    let store = common::memory_store().await;
    let report = orchestrator(&store, 2)
        .run_from_source(&org(), &ManifestSource::new(&manifest_path))
        .await
        .unwrap();

    assert_eq!(report.succeeded_count, 2);
    assert_eq!(report.outcome("F10").unwrap().version_number, 4);
    assert_eq!(report.outcome("F10").unwrap().format, Some(RawFormat::LegacyMarkup));
}

#[tokio::test]
async fn test_unreadable_manifest_fails_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::memory_store().await;
    let orchestrator = orchestrator(&store, 1);

    let missing = orchestrator
        .run_from_source(&org(), &ManifestSource::new(dir.path().join("nope.json")))
        .await;
    assert!(matches!(missing, Err(SourceError::Io { .. })));

    let bad_path = dir.path().join("bad.json");
    std::fs::write(&bad_path, "{\"units\": 3}").unwrap();
    let bad = orchestrator.run_from_source(&org(), &ManifestSource::new(&bad_path)).await;
    assert!(matches!(bad, Err(SourceError::Manifest { .. })));

    assert!(orchestrator.get_batch_report().await.unwrap().is_none());
}

/// Delegates to a real store; can refuse writes for one unit and cancel a
/// token once a write commits.
struct InterceptingStore {
    inner: Arc<SurrealGraphStore>,
    failing_unit: Option<&'static str>,
    cancel_on_commit: Option<CancellationToken>,
}

impl InterceptingStore {
    fn new(inner: Arc<SurrealGraphStore>) -> Self {
        Self {
            inner,
            failing_unit: None,
            cancel_on_commit: None,
        }
    }
}

#[async_trait]
impl GraphStore for InterceptingStore {
    async fn initialize(&self) -> Result<(), GraphError> {
        self.inner.initialize().await
    }

    async fn is_initialized(&self) -> Result<bool, GraphError> {
        self.inner.is_initialized().await
    }

    async fn replace_facts(&self, unit: &AutomationUnit, facts: &[FieldReferenceFact]) -> Result<(), GraphError> {
        if self.failing_unit == Some(unit.unit_id.as_str()) {
            return Err(GraphError::transaction(&unit.unit_id, "write conflict"));
        }
        self.inner.replace_facts(unit, facts).await?;
        if let Some(token) = &self.cancel_on_commit {
            token.cancel();
        }
        Ok(())
    }

    async fn replace_dependent_edges(
        &self,
        kind: DependentKind,
        dependent_id: &str,
        dependent_name: &str,
        refs: &[DependentReference],
    ) -> Result<(), GraphError> {
        self.inner
            .replace_dependent_edges(kind, dependent_id, dependent_name, refs)
            .await
    }

    async fn dependents_of(&self, schema_entity: &str, field_name: &str) -> Result<Vec<DependencyEdge>, GraphError> {
        self.inner.dependents_of(schema_entity, field_name).await
    }

    async fn references_of(&self, dependent_id: &str) -> Result<Vec<FieldReferenceFact>, GraphError> {
        self.inner.references_of(dependent_id).await
    }

    async fn recompute_coverage(&self, scope: &CoverageScope) -> Result<Vec<CoverageAggregate>, GraphError> {
        self.inner.recompute_coverage(scope).await
    }

    async fn get_coverage(&self, scope: &CoverageScope) -> Result<Vec<CoverageAggregate>, GraphError> {
        self.inner.get_coverage(scope).await
    }

    async fn save_batch_report(&self, report: &BatchReport) -> Result<(), GraphError> {
        self.inner.save_batch_report(report).await
    }

    async fn latest_batch_report(&self) -> Result<Option<BatchReport>, GraphError> {
        self.inner.latest_batch_report().await
    }

    async fn stats(&self) -> Result<GraphStats, GraphError> {
        self.inner.stats().await
    }
}

#[tokio::test]
async fn test_store_failure_is_recorded_per_unit() {
    let inner = common::memory_store().await;
    let store = Arc::new(InterceptingStore {
        failing_unit: Some("F10"),
        ..InterceptingStore::new(inner.clone())
    });

    let report = BatchOrchestrator::new(store, common::config(2))
        .run_extraction(&org(), mixed_batch())
        .await;

    let failure = report.failures.iter().find(|f| f.unit_id == "F10").unwrap();
    assert_eq!(failure.error_kind, UnitErrorKind::StoreTransactionFailure);
    assert_eq!(failure.stage, Stage::Persisting);
    assert_eq!(report.outcome("F10").unwrap().fact_count, 11);

    assert!(inner.references_of("F10").await.unwrap().is_empty());
    assert_eq!(inner.references_of("F1").await.unwrap().len(), 2);
    assert_eq!(report.succeeded_count, 2);
}

#[tokio::test]
async fn test_cancel_mid_batch_keeps_committed_units() {
    let inner = common::memory_store().await;
    let token = CancellationToken::new();
    let store = Arc::new(InterceptingStore {
        cancel_on_commit: Some(token.clone()),
        ..InterceptingStore::new(inner.clone())
    });
    let units = vec![
        common::unit("F1", 1, "Lead_Convert", "lead_convert.json"),
        common::unit("F10", 1, "Account_Rollup", "account_rollup.json"),
        RawUnit::new("F11", 2, "Opportunity_Sync", common::account_flow(&["Name"], &["Rating"])),
    ];

    let report = BatchOrchestrator::new(store, common::config(1))
        .with_cancellation(token)
        .run_extraction(&org(), units)
        .await;

    assert_eq!(report.outcome("F1").unwrap().state, UnitState::Done);
    assert_eq!(report.outcome("F10").unwrap().state, UnitState::Cancelled);
    assert_eq!(report.outcome("F11").unwrap().state, UnitState::Cancelled);
    assert_eq!(report.succeeded_count, 1);
    assert_eq!(report.cancelled_count, 2);

    assert_eq!(inner.references_of("F1").await.unwrap().len(), 2);
    assert!(inner.references_of("F10").await.unwrap().is_empty());
    assert!(inner.references_of("F11").await.unwrap().is_empty());
    assert_eq!(inner.stats().await.unwrap().units, 1);
    // Coverage still reflects the committed unit.
    assert!(report.coverage_rows > 0);
}

#[tokio::test]
async fn test_cancellation_is_consumed_by_one_run() {
    let store = common::memory_store().await;
    let orchestrator = orchestrator(&store, 2);
    orchestrator.cancellation_token().cancel();

    let cancelled = orchestrator.run_extraction(&org(), mixed_batch()).await;
    assert_eq!(cancelled.cancelled_count, 5);
    assert!(!orchestrator.cancellation_token().is_cancelled());

    let report = orchestrator.run_extraction(&org(), mixed_batch()).await;
    assert_eq!(report.cancelled_count, 0);
    assert_eq!(report.succeeded_count, 3);
    assert_eq!(report.failed_count, 2);
}
