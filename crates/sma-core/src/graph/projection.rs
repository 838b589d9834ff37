//! Pure projections: facts to edges, edges to coverage.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use surrealdb::sql::Datetime;

use crate::extract::FieldReferenceFact;

use super::models::{
    CoverageAggregate, DependencyEdge, DependentKind, DependentReference, ReferenceType,
};

type EdgeKey = (String, String, ReferenceType);

fn discovered_index(previous: &[DependencyEdge]) -> HashMap<EdgeKey, Datetime> {
    previous
        .iter()
        .map(|e| {
            (
                (e.schema_entity.clone(), e.field_name.clone(), e.reference_type),
                e.discovered_at.clone(),
            )
        })
        .collect()
}

fn build_edges(
    refs: BTreeSet<EdgeKey>,
    kind: DependentKind,
    dependent_id: &str,
    dependent_name: &str,
    previous: &[DependencyEdge],
    now: &Datetime,
) -> Vec<DependencyEdge> {
    let discovered = discovered_index(previous);
    refs.into_iter()
        .map(|key| {
            let discovered_at = discovered.get(&key).cloned().unwrap_or_else(|| now.clone());
            let (schema_entity, field_name, reference_type) = key;
            DependencyEdge {
                schema_entity,
                field_name,
                dependent_kind: kind,
                dependent_id: dependent_id.to_string(),
                dependent_name: dependent_name.to_string(),
                reference_type,
                discovered_at,
                last_verified_at: now.clone(),
            }
        })
        .collect()
}

/// Process edges for one unit from the facts of all its stored versions.
///
/// Each touched field yields a `read` row if any element reads it and a
/// `write` row if any element writes it.
pub(crate) fn process_edges(
    unit_id: &str,
    logical_name: &str,
    facts: &[FieldReferenceFact],
    previous: &[DependencyEdge],
    now: &Datetime,
) -> Vec<DependencyEdge> {
    let mut refs = BTreeSet::new();
    for fact in facts {
        if fact.direction.reads() {
            refs.insert((fact.schema_entity.clone(), fact.field_name.clone(), ReferenceType::Read));
        }
        if fact.direction.writes() {
            refs.insert((fact.schema_entity.clone(), fact.field_name.clone(), ReferenceType::Write));
        }
    }
    build_edges(refs, DependentKind::Process, unit_id, logical_name, previous, now)
}

/// Edges for a non-process dependent, deduplicated on the edge key.
pub(crate) fn dependent_edges(
    kind: DependentKind,
    dependent_id: &str,
    dependent_name: &str,
    refs: &[DependentReference],
    previous: &[DependencyEdge],
    now: &Datetime,
) -> Vec<DependencyEdge> {
    let refs = refs
        .iter()
        .map(|r| (r.schema_entity.clone(), r.field_name.clone(), r.reference_type))
        .collect();
    build_edges(refs, kind, dependent_id, dependent_name, previous, now)
}

/// Coverage rows per `(entity, field)` and per entity, counting distinct dependents.
pub(crate) fn coverage(edges: &[DependencyEdge], now: &Datetime) -> Vec<CoverageAggregate> {
    let mut groups: BTreeMap<(String, Option<String>), BTreeSet<(DependentKind, String)>> = BTreeMap::new();

    for edge in edges {
        let dependent = (edge.dependent_kind, edge.dependent_id.clone());
        groups
            .entry((edge.schema_entity.clone(), Some(edge.field_name.clone())))
            .or_default()
            .insert(dependent.clone());
        groups
            .entry((edge.schema_entity.clone(), None))
            .or_default()
            .insert(dependent);
    }

    groups
        .into_iter()
        .map(|((schema_entity, field_name), dependents)| {
            let count = |kind: DependentKind| dependents.iter().filter(|(k, _)| *k == kind).count();
            CoverageAggregate {
                process_count: count(DependentKind::Process),
                code_trigger_count: count(DependentKind::CodeTrigger),
                validation_count: count(DependentKind::Validation),
                other_count: count(DependentKind::Other),
                total_count: dependents.len(),
                schema_entity,
                field_name,
                computed_at: now.clone(),
            }
        })
        .collect()
}
