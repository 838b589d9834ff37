//! SurrealDB embedded database for the dependency graph.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::sql::Datetime;
use surrealdb::Surreal;
use tokio::sync::Mutex;

use crate::batch::BatchReport;
use crate::config::StorageConfig;
use crate::context::OrgContext;
use crate::extract::FieldReferenceFact;

use super::error::GraphError;
use super::models::{
    AutomationUnit, CoverageAggregate, CoverageScope, DependencyEdge, DependentKind,
    DependentReference, GraphStats,
};
use super::projection;
use super::GraphStore;

const UNIT_COLUMNS: &str = "unit_id, version_number, logical_name, kind, trigger_object, status, \
     raw_format, element_summary, label, api_version, payload_hash, ingested_at";
const FACT_COLUMNS: &str = "schema_entity, field_name, unit_id, version_number, element_name, \
     element_kind, direction, bound_variable";
const EDGE_COLUMNS: &str = "schema_entity, field_name, dependent_kind, dependent_id, dependent_name, \
     reference_type, discovered_at, last_verified_at";
const COVERAGE_COLUMNS: &str = "schema_entity, field_name, process_count, code_trigger_count, \
     validation_count, other_count, total_count, computed_at";

const SCHEMA: &str = r#"
    DEFINE TABLE IF NOT EXISTS automation_unit SCHEMALESS;
    DEFINE FIELD IF NOT EXISTS unit_id ON automation_unit TYPE string;
    DEFINE FIELD IF NOT EXISTS version_number ON automation_unit TYPE int;
    DEFINE FIELD IF NOT EXISTS logical_name ON automation_unit TYPE string;
    DEFINE INDEX IF NOT EXISTS unit_key ON automation_unit FIELDS unit_id, version_number UNIQUE;
    DEFINE INDEX IF NOT EXISTS unit_logical_version ON automation_unit FIELDS logical_name, version_number UNIQUE;

    DEFINE TABLE IF NOT EXISTS field_ref SCHEMALESS;
    DEFINE FIELD IF NOT EXISTS schema_entity ON field_ref TYPE string;
    DEFINE FIELD IF NOT EXISTS field_name ON field_ref TYPE string;
    DEFINE FIELD IF NOT EXISTS unit_id ON field_ref TYPE string;
    DEFINE FIELD IF NOT EXISTS version_number ON field_ref TYPE int;
    DEFINE FIELD IF NOT EXISTS element_name ON field_ref TYPE string;
    DEFINE FIELD IF NOT EXISTS element_kind ON field_ref TYPE string;
    DEFINE FIELD IF NOT EXISTS direction ON field_ref TYPE string;
    DEFINE INDEX IF NOT EXISTS field_ref_field ON field_ref FIELDS schema_entity, field_name;
    DEFINE INDEX IF NOT EXISTS field_ref_unit ON field_ref FIELDS unit_id, version_number;
    DEFINE INDEX IF NOT EXISTS field_ref_key ON field_ref
        FIELDS unit_id, version_number, schema_entity, field_name, element_name, element_kind UNIQUE;

    DEFINE TABLE IF NOT EXISTS dependency_edge SCHEMALESS;
    DEFINE FIELD IF NOT EXISTS schema_entity ON dependency_edge TYPE string;
    DEFINE FIELD IF NOT EXISTS field_name ON dependency_edge TYPE string;
    DEFINE FIELD IF NOT EXISTS dependent_kind ON dependency_edge TYPE string;
    DEFINE FIELD IF NOT EXISTS dependent_id ON dependency_edge TYPE string;
    DEFINE FIELD IF NOT EXISTS reference_type ON dependency_edge TYPE string;
    DEFINE INDEX IF NOT EXISTS edge_field ON dependency_edge FIELDS schema_entity, field_name;
    DEFINE INDEX IF NOT EXISTS edge_dependent ON dependency_edge FIELDS dependent_kind, dependent_id;
    DEFINE INDEX IF NOT EXISTS edge_key ON dependency_edge
        FIELDS schema_entity, field_name, dependent_kind, dependent_id, reference_type UNIQUE;

    DEFINE TABLE IF NOT EXISTS coverage SCHEMALESS;
    DEFINE FIELD IF NOT EXISTS schema_entity ON coverage TYPE string;
    DEFINE INDEX IF NOT EXISTS coverage_field ON coverage FIELDS schema_entity, field_name;

    DEFINE TABLE IF NOT EXISTS batch_report SCHEMALESS;

    DEFINE TABLE IF NOT EXISTS metadata SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS key ON metadata TYPE string;
    DEFINE FIELD IF NOT EXISTS value ON metadata TYPE any;
    DEFINE FIELD IF NOT EXISTS updated_at ON metadata TYPE datetime;
    DEFINE INDEX IF NOT EXISTS metadata_key ON metadata FIELDS key UNIQUE;

    UPSERT metadata:initialized CONTENT { key: 'initialized', value: true, updated_at: time::now() };
    UPSERT metadata:schema_version CONTENT { key: 'schema_version', value: '1.0', updated_at: time::now() };
"#;

// Rows of the uniquely keyed tables get record ids derived from their key, so
// a replace upserts surviving rows and deletes only stale ones.
const REPLACE_FACTS: &str = r#"
    BEGIN TRANSACTION;
    UPSERT type::thing('automation_unit', [$unit_id, $version]) CONTENT $unit;
    DELETE field_ref WHERE unit_id = $unit_id AND version_number = $version
        AND [schema_entity, field_name, element_name, element_kind] NOTINSIDE $fact_keys;
    FOR $fact IN $facts {
        UPSERT type::thing('field_ref', [$fact.unit_id, $fact.version_number, $fact.schema_entity,
            $fact.field_name, $fact.element_name, $fact.element_kind]) CONTENT $fact;
    };
    DELETE dependency_edge WHERE dependent_kind = 'process' AND dependent_id = $unit_id
        AND [schema_entity, field_name, reference_type] NOTINSIDE $edge_keys;
    FOR $edge IN $edges {
        UPSERT type::thing('dependency_edge', [$edge.schema_entity, $edge.field_name,
            $edge.dependent_kind, $edge.dependent_id, $edge.reference_type]) CONTENT $edge;
    };
    COMMIT TRANSACTION;
"#;

const REPLACE_DEPENDENT: &str = r#"
    BEGIN TRANSACTION;
    DELETE dependency_edge WHERE dependent_kind = $kind AND dependent_id = $dependent_id
        AND [schema_entity, field_name, reference_type] NOTINSIDE $edge_keys;
    FOR $edge IN $edges {
        UPSERT type::thing('dependency_edge', [$edge.schema_entity, $edge.field_name,
            $edge.dependent_kind, $edge.dependent_id, $edge.reference_type]) CONTENT $edge;
    };
    COMMIT TRANSACTION;
"#;

type FactKey = (String, String, String, String);
type EdgeKey = (String, String, String);

fn fact_keys(facts: &[FieldReferenceFact]) -> Vec<FactKey> {
    facts
        .iter()
        .map(|f| {
            (
                f.schema_entity.clone(),
                f.field_name.clone(),
                f.element_name.clone(),
                f.element_kind.as_str().to_string(),
            )
        })
        .collect()
}

fn edge_keys(edges: &[DependencyEdge]) -> Vec<EdgeKey> {
    edges
        .iter()
        .map(|e| {
            (
                e.schema_entity.clone(),
                e.field_name.clone(),
                e.reference_type.as_str().to_string(),
            )
        })
        .collect()
}

#[derive(Deserialize)]
struct CountResult {
    count: i64,
}

/// Dependency graph on SurrealDB.
pub struct SurrealGraphStore {
    db: Surreal<Db>,
    /// One writer per unit or dependent id at a time.
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SurrealGraphStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path, namespace: &str, database: &str) -> Result<Self, GraphError> {
        let db = Surreal::new::<RocksDb>(path).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(Self::with_db(db))
    }

    /// Open an in-memory database.
    pub async fn in_memory(namespace: &str, database: &str) -> Result<Self, GraphError> {
        let db = Surreal::new::<Mem>(()).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(Self::with_db(db))
    }

    /// Open the configured on-disk database for an org.
    pub async fn open_for(storage: &StorageConfig, org: &OrgContext) -> Result<Self, GraphError> {
        let path = storage.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GraphError::Database(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        Self::open(&path, &storage.namespace, &org.database_name()).await
    }

    fn with_db(db: Surreal<Db>) -> Self {
        Self {
            db,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` while holding the write lock for `key`.
    ///
    /// The lock entry is dropped again once no other writer holds or awaits it.
    async fn locked<T>(
        &self,
        key: &str,
        work: impl Future<Output = Result<T, GraphError>>,
    ) -> Result<T, GraphError> {
        let lock = {
            let mut locks = self.write_locks.lock().await;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = lock.lock().await;
            work.await
        };

        let mut locks = self.write_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    async fn write_facts(&self, unit: &AutomationUnit, facts: &[FieldReferenceFact]) -> Result<(), GraphError> {
        let key = format!("{}@{}", unit.unit_id, unit.version_number);

        // Edges aggregate every stored version of the unit.
        let query = format!(
            "SELECT {} FROM field_ref WHERE unit_id = $unit_id AND version_number != $version",
            FACT_COLUMNS
        );
        let mut all_facts: Vec<FieldReferenceFact> = self
            .db
            .query(query)
            .bind(("unit_id", unit.unit_id.clone()))
            .bind(("version", unit.version_number))
            .await?
            .take(0)?;
        all_facts.extend_from_slice(facts);

        let previous = self.edges_of(DependentKind::Process, &unit.unit_id).await?;
        let now = Datetime::default();
        let edges = projection::process_edges(&unit.unit_id, &unit.logical_name, &all_facts, &previous, &now);

        self.db
            .query(REPLACE_FACTS)
            .bind(("unit_id", unit.unit_id.clone()))
            .bind(("version", unit.version_number))
            .bind(("unit", unit.clone()))
            .bind(("fact_keys", fact_keys(facts)))
            .bind(("facts", facts.to_vec()))
            .bind(("edge_keys", edge_keys(&edges)))
            .bind(("edges", edges))
            .await
            .and_then(|response| response.check())
            .map_err(|e| GraphError::transaction(&key, e))?;

        tracing::debug!(unit = %key, facts = facts.len(), "Replaced facts");
        Ok(())
    }

    async fn write_dependent(
        &self,
        key: &str,
        kind: DependentKind,
        dependent_id: &str,
        dependent_name: &str,
        refs: &[DependentReference],
    ) -> Result<(), GraphError> {
        let previous = self.edges_of(kind, dependent_id).await?;
        let now = Datetime::default();
        let edges = projection::dependent_edges(kind, dependent_id, dependent_name, refs, &previous, &now);

        self.db
            .query(REPLACE_DEPENDENT)
            .bind(("kind", kind.as_str()))
            .bind(("dependent_id", dependent_id.to_string()))
            .bind(("edge_keys", edge_keys(&edges)))
            .bind(("edges", edges))
            .await
            .and_then(|response| response.check())
            .map_err(|e| GraphError::transaction(key, e))?;

        Ok(())
    }

    /// Get one stored unit version.
    pub async fn unit(&self, unit_id: &str, version_number: u32) -> Result<Option<AutomationUnit>, GraphError> {
        let query = format!(
            "SELECT {} FROM automation_unit WHERE unit_id = $unit_id AND version_number = $version LIMIT 1",
            UNIT_COLUMNS
        );
        let unit: Option<AutomationUnit> = self
            .db
            .query(query)
            .bind(("unit_id", unit_id.to_string()))
            .bind(("version", version_number))
            .await?
            .take(0)?;
        Ok(unit)
    }

    /// All stored versions of a logical flow, oldest first.
    pub async fn units_for(&self, logical_name: &str) -> Result<Vec<AutomationUnit>, GraphError> {
        let query = format!(
            "SELECT {} FROM automation_unit WHERE logical_name = $name ORDER BY version_number",
            UNIT_COLUMNS
        );
        let units: Vec<AutomationUnit> = self
            .db
            .query(query)
            .bind(("name", logical_name.to_string()))
            .await?
            .take(0)?;
        Ok(units)
    }

    async fn edges_of(&self, kind: DependentKind, dependent_id: &str) -> Result<Vec<DependencyEdge>, GraphError> {
        let query = format!(
            "SELECT {} FROM dependency_edge WHERE dependent_kind = $kind AND dependent_id = $id",
            EDGE_COLUMNS
        );
        let edges: Vec<DependencyEdge> = self
            .db
            .query(query)
            .bind(("kind", kind.as_str()))
            .bind(("id", dependent_id.to_string()))
            .await?
            .take(0)?;
        Ok(edges)
    }

    async fn count_table(&self, table: &str) -> Result<usize, GraphError> {
        let result: Option<CountResult> = self
            .db
            .query(format!("SELECT count() FROM {} GROUP ALL", table))
            .await?
            .take(0)?;
        Ok(result.map(|r| r.count as usize).unwrap_or(0))
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn initialize(&self) -> Result<(), GraphError> {
        self.db.query(SCHEMA).await?.check()?;
        Ok(())
    }

    async fn is_initialized(&self) -> Result<bool, GraphError> {
        let result: Option<bool> = self
            .db
            .query("SELECT VALUE value FROM metadata:initialized")
            .await?
            .take(0)?;
        Ok(result.unwrap_or(false))
    }

    async fn replace_facts(&self, unit: &AutomationUnit, facts: &[FieldReferenceFact]) -> Result<(), GraphError> {
        self.locked(&unit.unit_id, self.write_facts(unit, facts)).await
    }

    async fn replace_dependent_edges(
        &self,
        kind: DependentKind,
        dependent_id: &str,
        dependent_name: &str,
        refs: &[DependentReference],
    ) -> Result<(), GraphError> {
        if kind == DependentKind::Process {
            return Err(GraphError::Database(
                "process edges are derived from facts; use replace_facts".to_string(),
            ));
        }

        let key = format!("{}:{}", kind, dependent_id);
        self.locked(&key, self.write_dependent(&key, kind, dependent_id, dependent_name, refs))
            .await
    }

    async fn dependents_of(&self, schema_entity: &str, field_name: &str) -> Result<Vec<DependencyEdge>, GraphError> {
        let query = format!(
            "SELECT {} FROM dependency_edge WHERE schema_entity = $entity AND field_name = $field \
             ORDER BY dependent_kind, dependent_name, dependent_id, reference_type",
            EDGE_COLUMNS
        );
        let edges: Vec<DependencyEdge> = self
            .db
            .query(query)
            .bind(("entity", schema_entity.to_string()))
            .bind(("field", field_name.to_string()))
            .await?
            .take(0)?;
        Ok(edges)
    }

    async fn references_of(&self, dependent_id: &str) -> Result<Vec<FieldReferenceFact>, GraphError> {
        let query = format!(
            "SELECT {} FROM field_ref WHERE unit_id = $unit_id \
             ORDER BY version_number, schema_entity, field_name, element_name, element_kind",
            FACT_COLUMNS
        );
        let facts: Vec<FieldReferenceFact> = self
            .db
            .query(query)
            .bind(("unit_id", dependent_id.to_string()))
            .await?
            .take(0)?;
        Ok(facts)
    }

    async fn recompute_coverage(&self, scope: &CoverageScope) -> Result<Vec<CoverageAggregate>, GraphError> {
        let (edges, scope_key): (Vec<DependencyEdge>, String) = match scope {
            CoverageScope::Global => {
                let query = format!("SELECT {} FROM dependency_edge", EDGE_COLUMNS);
                (self.db.query(query).await?.take(0)?, "global".to_string())
            }
            CoverageScope::Entity(entity) => {
                let query = format!("SELECT {} FROM dependency_edge WHERE schema_entity = $entity", EDGE_COLUMNS);
                let edges = self
                    .db
                    .query(query)
                    .bind(("entity", entity.clone()))
                    .await?
                    .take(0)?;
                (edges, format!("entity {}", entity))
            }
        };

        if edges.is_empty() {
            tracing::debug!(scope = %scope_key, "No dependency edges in coverage scope");
        }

        let rows = projection::coverage(&edges, &Datetime::default());

        let delete = match scope {
            CoverageScope::Global => "DELETE coverage;",
            CoverageScope::Entity(_) => "DELETE coverage WHERE schema_entity = $entity;",
        };
        let entity = match scope {
            CoverageScope::Global => String::new(),
            CoverageScope::Entity(entity) => entity.clone(),
        };
        let statement = format!(
            "BEGIN TRANSACTION; {} FOR $row IN $rows {{ CREATE coverage CONTENT $row; }}; COMMIT TRANSACTION;",
            delete
        );

        self.db
            .query(statement)
            .bind(("entity", entity))
            .bind(("rows", rows.clone()))
            .await
            .and_then(|response| response.check())
            .map_err(|e| GraphError::transaction(format!("coverage {}", scope_key), e))?;

        Ok(rows)
    }

    async fn get_coverage(&self, scope: &CoverageScope) -> Result<Vec<CoverageAggregate>, GraphError> {
        let rows: Vec<CoverageAggregate> = match scope {
            CoverageScope::Global => {
                let query = format!("SELECT {} FROM coverage ORDER BY schema_entity, field_name", COVERAGE_COLUMNS);
                self.db.query(query).await?.take(0)?
            }
            CoverageScope::Entity(entity) => {
                let query = format!(
                    "SELECT {} FROM coverage WHERE schema_entity = $entity ORDER BY field_name",
                    COVERAGE_COLUMNS
                );
                self.db
                    .query(query)
                    .bind(("entity", entity.clone()))
                    .await?
                    .take(0)?
            }
        };
        Ok(rows)
    }

    async fn save_batch_report(&self, report: &BatchReport) -> Result<(), GraphError> {
        let json = serde_json::to_string(report)?;
        self.db
            .query("UPSERT batch_report:latest SET run_id = $run_id, report = $report, saved_at = time::now()")
            .bind(("run_id", report.run_id.clone()))
            .bind(("report", json))
            .await?
            .check()?;
        Ok(())
    }

    async fn latest_batch_report(&self) -> Result<Option<BatchReport>, GraphError> {
        let json: Option<String> = self
            .db
            .query("SELECT VALUE report FROM batch_report:latest")
            .await?
            .take(0)?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<GraphStats, GraphError> {
        Ok(GraphStats {
            units: self.count_table("automation_unit").await?,
            facts: self.count_table("field_ref").await?,
            edges: self.count_table("dependency_edge").await?,
            coverage_rows: self.count_table("coverage").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Direction;
    use crate::flow::{ElementKind, ElementSummary, ProcessKind, RawFormat, UnitStatus};

    fn unit(unit_id: &str) -> AutomationUnit {
        AutomationUnit {
            unit_id: unit_id.to_string(),
            version_number: 1,
            logical_name: format!("{}_flow", unit_id),
            kind: ProcessKind::RecordTriggered,
            trigger_object: Some("Account".to_string()),
            status: UnitStatus::Active,
            raw_format: RawFormat::StructuredDocument,
            element_summary: ElementSummary::default(),
            label: None,
            api_version: None,
            payload_hash: String::new(),
            ingested_at: Datetime::default(),
        }
    }

    fn fact(unit_id: &str, field: &str) -> FieldReferenceFact {
        FieldReferenceFact {
            schema_entity: "Account".to_string(),
            field_name: field.to_string(),
            unit_id: unit_id.to_string(),
            version_number: 1,
            element_name: "Update_Account".to_string(),
            element_kind: ElementKind::Update,
            direction: Direction::Write,
            bound_variable: None,
        }
    }

    #[tokio::test]
    async fn test_write_locks_are_released() {
        let store = SurrealGraphStore::in_memory("sma", "locks").await.unwrap();
        store.initialize().await.unwrap();

        for id in ["F1", "F2", "F3"] {
            store.replace_facts(&unit(id), &[fact(id, "Name")]).await.unwrap();
        }
        store
            .replace_dependent_edges(DependentKind::CodeTrigger, "01q1", "AccountTrigger", &[])
            .await
            .unwrap();

        assert!(store.write_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_releases_lock() {
        let store = SurrealGraphStore::in_memory("sma", "locks_failed").await.unwrap();
        store.initialize().await.unwrap();
        store.replace_facts(&unit("F1"), &[fact("F1", "Name")]).await.unwrap();

        let mut clash = unit("F2");
        clash.logical_name = "F1_flow".to_string();
        assert!(store.replace_facts(&clash, &[fact("F2", "Name")]).await.is_err());

        assert!(store.write_locks.lock().await.is_empty());
    }
}
