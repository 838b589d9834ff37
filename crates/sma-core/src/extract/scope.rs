//! Variable scope: which schema entity a reference prefix stands for.

use std::collections::HashMap;

use crate::flow::{ElementBody, NormalizedFlow};

use super::reference::parse_reference;

/// Schema collaborator lookup for variables the unit does not declare itself.
pub trait VariableResolver: Send + Sync {
    /// Schema entity a variable of `unit_id` holds records of, if known.
    fn resolve_variable_source_entity(&self, unit_id: &str, variable_name: &str) -> Option<String>;
}

/// Resolver that knows nothing; prefixes fall back to their literal text.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl VariableResolver for NoResolver {
    fn resolve_variable_source_entity(&self, _unit_id: &str, _variable_name: &str) -> Option<String> {
        None
    }
}

/// Global variables that stand for a fixed entity.
const GLOBAL_ENTITIES: &[(&str, &str)] = &[
    ("$user", "User"),
    ("$profile", "Profile"),
    ("$organization", "Organization"),
    ("$userrole", "UserRole"),
];

/// Variable-to-entity bindings known for one unit.
pub(crate) struct Scope<'a> {
    unit_id: &'a str,
    trigger_object: Option<&'a str>,
    /// Keyed by lowercased variable name.
    entities: HashMap<String, String>,
    resolver: &'a dyn VariableResolver,
}

impl<'a> Scope<'a> {
    pub fn build(unit_id: &'a str, flow: &'a NormalizedFlow, resolver: &'a dyn VariableResolver) -> Self {
        let mut scope = Self {
            unit_id,
            trigger_object: flow.metadata.trigger_object.as_deref(),
            entities: HashMap::new(),
            resolver,
        };

        for var in &flow.variables {
            if let Some(object) = &var.object_type {
                scope.bind(&var.name, object);
            }
        }

        for element in &flow.elements {
            if let ElementBody::Lookup {
                object: Some(object),
                output_reference,
                stores_output,
                ..
            } = &element.body
            {
                if *stores_output {
                    scope.bind(&element.name, object);
                }
                if let Some(output) = output_reference {
                    scope.bind(output, object);
                }
            }
        }

        // Loop variables iterate whatever their collection holds.
        for element in &flow.elements {
            if let ElementBody::Loop {
                collection_reference: Some(collection),
            } = &element.body
            {
                if let Some(entity) = scope.collection_entity(collection) {
                    scope.bind(&element.name, &entity);
                }
            }
        }

        scope
    }

    /// First binding wins: declarations outrank element outputs.
    fn bind(&mut self, name: &str, entity: &str) {
        self.entities
            .entry(name.to_lowercase())
            .or_insert_with(|| entity.to_string());
    }

    fn collection_entity(&self, collection: &str) -> Option<String> {
        match parse_reference(collection) {
            Ok(None) => self.known(collection),
            // `$Record.Contacts` style child relationships are not typed here.
            _ => None,
        }
    }

    /// Entity bound by declarations, element outputs or the collaborator.
    fn known(&self, name: &str) -> Option<String> {
        if let Some(entity) = self.entities.get(&name.to_lowercase()) {
            return Some(entity.clone());
        }
        self.resolver.resolve_variable_source_entity(self.unit_id, name)
    }

    /// Entity for the prefix of a dotted reference.
    ///
    /// `None` means the prefix is a global with no schema entity behind it
    /// (`$Flow`, `$Label`, `$Api`, ...); no fact is recorded for it. Unknown
    /// variables resolve to their literal name.
    pub fn entity_for(&self, prefix: &str) -> Option<String> {
        if prefix.starts_with('$') {
            let lower = prefix.to_lowercase();
            if lower == "$record" || lower == "$record__prior" {
                return Some(
                    self.trigger_object
                        .map(str::to_string)
                        .unwrap_or_else(|| prefix.to_string()),
                );
            }
            return GLOBAL_ENTITIES
                .iter()
                .find(|(name, _)| *name == lower)
                .map(|(_, entity)| entity.to_string());
        }

        Some(self.known(prefix).unwrap_or_else(|| prefix.to_string()))
    }
}
