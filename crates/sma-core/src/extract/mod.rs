//! Field-reference extraction over the canonical element tree.
//!
//! Works only on [`NormalizedFlow`], never on a source format. Each element
//! kind has its own rule (see `rules`); references through variables are
//! resolved by a per-unit scope, falling back to the [`VariableResolver`]
//! collaborator and then to the literal prefix.

mod fact;
mod reference;
mod rules;
mod scope;

pub use fact::{Direction, Extraction, ExtractionWarning, FieldReferenceFact};
pub use scope::{NoResolver, VariableResolver};

use std::collections::BTreeMap;

use crate::flow::{ElementKind, NormalizedFlow};

use scope::Scope;

/// Extract the deduplicated fact set of one unit version.
///
/// Facts are unique per `(entity, field, element, kind)`; an element reaching
/// the same field for both reading and writing yields one `both` fact. An
/// element with unreadable references contributes a warning and no facts.
pub fn extract_facts(
    unit_id: &str,
    version_number: u32,
    flow: &NormalizedFlow,
    resolver: &dyn VariableResolver,
) -> Extraction {
    let scope = Scope::build(unit_id, flow, resolver);
    let mut merged: BTreeMap<(String, String, String, ElementKind), FieldReferenceFact> = BTreeMap::new();
    let mut warnings = Vec::new();

    for element in &flow.elements {
        let touches = match rules::touches(&scope, element) {
            Ok(touches) => touches,
            Err(message) => {
                tracing::warn!(
                    unit_id,
                    element = %element.name,
                    kind = %element.kind(),
                    "Skipping element: {}",
                    message
                );
                warnings.push(ExtractionWarning {
                    element_name: element.name.clone(),
                    element_kind: element.kind(),
                    message,
                });
                continue;
            }
        };

        for touch in touches {
            let key = (
                touch.schema_entity.clone(),
                touch.field_name.clone(),
                element.name.clone(),
                element.kind(),
            );
            merged
                .entry(key)
                .and_modify(|fact| {
                    fact.direction = fact.direction.union(touch.direction);
                    if fact.bound_variable.is_none() {
                        fact.bound_variable = touch.bound_variable.clone();
                    }
                })
                .or_insert_with(|| FieldReferenceFact {
                    schema_entity: touch.schema_entity,
                    field_name: touch.field_name,
                    unit_id: unit_id.to_string(),
                    version_number,
                    element_name: element.name.clone(),
                    element_kind: element.kind(),
                    direction: touch.direction,
                    bound_variable: touch.bound_variable,
                });
        }
    }

    Extraction {
        facts: merged.into_values().collect(),
        warnings,
    }
}
