mod common;

use serde_json::json;
use sma_core::{
    extract_facts, Direction, ElementKind, FieldReferenceFact, NoResolver, ParserRegistry,
    RawPayload, VariableResolver,
};

fn facts_for(unit_id: &str, payload: impl Into<RawPayload>, resolver: &dyn VariableResolver) -> Vec<FieldReferenceFact> {
    let flow = ParserRegistry::new().parse(unit_id, &payload.into()).unwrap();
    let extraction = extract_facts(unit_id, 1, &flow, resolver);
    assert!(extraction.warnings.is_empty(), "{:?}", extraction.warnings);
    extraction.facts
}

fn keys(facts: &[FieldReferenceFact]) -> Vec<(&str, &str, &str, Direction)> {
    facts
        .iter()
        .map(|f| {
            (
                f.schema_entity.as_str(),
                f.field_name.as_str(),
                f.element_name.as_str(),
                f.direction,
            )
        })
        .collect()
}

#[test]
fn test_lead_convert_yields_two_facts() {
    let facts = facts_for("F1", common::fixture("lead_convert.json"), &NoResolver);

    assert_eq!(
        keys(&facts),
        vec![
            ("Account", "Industry", "Check_Industry", Direction::Read),
            ("Account", "Rating", "Set_Rating", Direction::Write),
        ]
    );
    assert!(facts.iter().all(|f| f.unit_id == "F1" && f.version_number == 1));
    assert_eq!(facts[0].element_kind, ElementKind::Decision);
    assert_eq!(facts[1].element_kind, ElementKind::Update);
}

#[test]
fn test_account_rollup_facts() {
    let facts = facts_for("F10", common::fixture("account_rollup.json"), &NoResolver);

    assert_eq!(
        keys(&facts),
        vec![
            ("Account", "AnnualRevenue", "Is_Hot", Direction::Read),
            ("Account", "Description", "Stamp_Account", Direction::Write),
            ("Account", "Id", "Get_Contacts", Direction::Read),
            ("Account", "Rating", "Is_Hot", Direction::Read),
            ("Account", "Rating", "Stamp_Account", Direction::Write),
            ("Contact", "AccountId", "Get_Contacts", Direction::Read),
            ("Contact", "Description", "Copy_Email", Direction::Write),
            ("Contact", "Email", "Copy_Email", Direction::Read),
            ("Contact", "Email", "Get_Contacts", Direction::Read),
            ("Contact", "Id", "Get_Contacts", Direction::Read),
            ("User", "Username", "Stamp_Account", Direction::Read),
        ]
    );

    let email = facts
        .iter()
        .find(|f| f.element_name == "Get_Contacts" && f.field_name == "Email")
        .unwrap();
    assert_eq!(email.bound_variable.as_deref(), Some("Get_Contacts"));
}

#[test]
fn test_formats_yield_identical_facts() {
    let markup = facts_for("F10", common::fixture("account_rollup.flow-meta.xml"), &NoResolver);
    let document = facts_for("F10", common::fixture("account_rollup.json"), &NoResolver);
    assert_eq!(markup, document);
}

#[test]
fn test_same_field_read_and_written_is_one_fact() {
    let payload = json!({
        "start": {"object": "Case", "triggerType": "RecordBeforeSave"},
        "recordUpdates": [{
            "name": "Escalate",
            "inputReference": "$Record",
            "filters": [{"field": "Priority", "operator": "EqualTo", "value": {"stringValue": "High"}}],
            "inputAssignments": [{"field": "Priority", "value": {"stringValue": "Critical"}}]
        }]
    });
    let facts = facts_for("F20", payload, &NoResolver);

    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].direction, Direction::Both);
}

#[test]
fn test_same_field_in_two_elements_is_two_facts() {
    let payload = json!({
        "start": {"object": "Case", "triggerType": "RecordAfterSave"},
        "decisions": [
            {"name": "First", "rules": [{"conditions": [{"leftValueReference": "$Record.Status"}]}]},
            {"name": "Second", "rules": [{"conditions": [{"leftValueReference": "$Record.Status"}]}]}
        ]
    });
    let facts = facts_for("F21", payload, &NoResolver);
    assert_eq!(facts.len(), 2);
}

struct SchemaResolver;

impl VariableResolver for SchemaResolver {
    fn resolve_variable_source_entity(&self, unit_id: &str, variable_name: &str) -> Option<String> {
        assert_eq!(unit_id, "F22");
        (variable_name == "inputOpportunity").then(|| "Opportunity".to_string())
    }
}

#[test]
fn test_undeclared_variable_uses_collaborator_then_literal() {
    let payload = json!({
        "processType": "AutoLaunchedFlow",
        "assignments": [{
            "name": "Copy",
            "assignmentItems": [{
                "assignToReference": "inputOpportunity.NextStep",
                "value": {"elementReference": "unknownVar.Name"}
            }]
        }]
    });

    let resolved = facts_for("F22", payload.clone(), &SchemaResolver);
    assert_eq!(
        keys(&resolved),
        vec![
            ("Opportunity", "NextStep", "Copy", Direction::Write),
            ("unknownVar", "Name", "Copy", Direction::Read),
        ]
    );

    let literal = facts_for("F22", payload, &NoResolver);
    assert_eq!(literal[0].schema_entity, "inputOpportunity");
}

#[test]
fn test_element_without_object_is_skipped_with_warning() {
    let payload = json!({
        "processType": "AutoLaunchedFlow",
        "recordCreates": [{
            "name": "Make_Task",
            "inputAssignments": [{"field": "Subject", "value": {"stringValue": "Follow up"}}]
        }],
        "recordLookups": [{
            "name": "Get_User",
            "object": "User",
            "filters": [{"field": "IsActive", "operator": "EqualTo", "value": {"booleanValue": true}}]
        }]
    });

    let flow = ParserRegistry::new().parse("F23", &payload.into()).unwrap();
    let extraction = extract_facts("F23", 1, &flow, &NoResolver);

    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].element_name, "Make_Task");
    assert_eq!(extraction.warnings[0].element_kind, ElementKind::Create);
    assert_eq!(keys(&extraction.facts), vec![("User", "IsActive", "Get_User", Direction::Read)]);
}

#[test]
fn test_polymorphic_relationship_keeps_element_facts() {
    let payload = json!({
        "start": {"object": "Case", "triggerType": "RecordAfterSave"},
        "decisions": [{
            "name": "Owner_Active",
            "rules": [{"name": "Active", "conditions": [
                {"leftValueReference": "$Record.Status", "operator": "EqualTo",
                 "rightValue": {"stringValue": "New"}},
                {"leftValueReference": "$Record.Owner:User.IsActive", "operator": "EqualTo",
                 "rightValue": {"booleanValue": true}}
            ]}]
        }]
    });
    let facts = facts_for("F24", payload, &NoResolver);

    assert_eq!(
        keys(&facts),
        vec![
            ("Case", "Owner:User.IsActive", "Owner_Active", Direction::Read),
            ("Case", "Status", "Owner_Active", Direction::Read),
        ]
    );
}
