#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use sma_core::{ExtractionConfig, RawUnit, SurrealGraphStore};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

pub fn unit(unit_id: &str, version: u32, logical_name: &str, fixture_name: &str) -> RawUnit {
    RawUnit::new(unit_id, version, logical_name, fixture(fixture_name))
}

pub async fn memory_store() -> Arc<SurrealGraphStore> {
    use sma_core::GraphStore;

    let store = SurrealGraphStore::in_memory("sma", "test").await.unwrap();
    store.initialize().await.unwrap();
    Arc::new(store)
}

pub fn config(parallelism: usize) -> ExtractionConfig {
    ExtractionConfig {
        parallelism,
        ..Default::default()
    }
}

/// A structured-document flow writing `written` and reading `read` on Account.
pub fn account_flow(written: &[&str], read: &[&str]) -> String {
    let inputs: Vec<serde_json::Value> = written
        .iter()
        .map(|f| serde_json::json!({"field": f, "value": {"stringValue": "x"}}))
        .collect();
    let conditions: Vec<serde_json::Value> = read
        .iter()
        .map(|f| serde_json::json!({"leftValueReference": format!("$Record.{}", f), "operator": "IsNull"}))
        .collect();

    serde_json::json!({
        "processType": "AutoLaunchedFlow",
        "status": "Active",
        "start": {"object": "Account", "triggerType": "RecordAfterSave"},
        "recordUpdates": [{"name": "Update_Account", "inputReference": "$Record", "inputAssignments": inputs}],
        "decisions": [{"name": "Check_Account", "rules": [{"name": "Match", "conditions": conditions}]}]
    })
    .to_string()
}
