//! Per-kind field-reference rules.

use crate::flow::{CanonicalElement, ElementBody, FlowValue, RecordFilter};

use super::fact::Direction;
use super::reference::{is_identifier, merge_fields, parse_reference};
use super::scope::Scope;

/// One field touched by one element, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Touch {
    pub schema_entity: String,
    pub field_name: String,
    pub direction: Direction,
    pub bound_variable: Option<String>,
}

struct Collector<'s, 'a> {
    scope: &'s Scope<'a>,
    touches: Vec<Touch>,
}

impl<'s, 'a> Collector<'s, 'a> {
    /// A field named directly on the element's own object.
    fn field(&mut self, entity: &str, field: &str, direction: Direction, bound: Option<&str>) -> Result<(), String> {
        if !field.split('.').all(is_identifier) {
            return Err(format!("invalid field name `{}`", field));
        }
        self.touches.push(Touch {
            schema_entity: entity.to_string(),
            field_name: field.to_string(),
            direction,
            bound_variable: bound.map(str::to_string),
        });
        Ok(())
    }

    /// A `prefix.field` reference resolved through the scope.
    fn reference(&mut self, raw: &str, direction: Direction) -> Result<(), String> {
        let Some(path) = parse_reference(raw)? else {
            return Ok(());
        };
        if let Some(entity) = self.scope.entity_for(&path.prefix) {
            self.touches.push(Touch {
                schema_entity: entity,
                field_name: path.field,
                direction,
                bound_variable: None,
            });
        }
        Ok(())
    }

    fn value(&mut self, value: Option<&FlowValue>) -> Result<(), String> {
        match value {
            Some(FlowValue::Reference(raw)) => self.reference(raw, Direction::Read),
            Some(FlowValue::Text(text)) => {
                for merge in merge_fields(text)? {
                    self.reference(&merge, Direction::Read)?;
                }
                Ok(())
            }
            Some(FlowValue::Constant) | None => Ok(()),
        }
    }

    fn filters(&mut self, entity: &str, filters: &[RecordFilter]) -> Result<(), String> {
        for filter in filters {
            self.field(entity, &filter.field, Direction::Read, None)?;
            self.value(filter.value.as_ref())?;
        }
        Ok(())
    }
}

/// Entity an element operates on: its object, else its resolved input record.
fn target_entity(scope: &Scope<'_>, object: &Option<String>, input_reference: &Option<String>) -> Option<String> {
    if let Some(object) = object {
        return Some(object.clone());
    }
    let input = input_reference.as_deref()?;
    match parse_reference(input) {
        Ok(None) => scope.entity_for(input),
        _ => None,
    }
}

fn require(entity: Option<String>, needed: bool) -> Result<String, String> {
    match entity {
        Some(entity) => Ok(entity),
        None if needed => Err("element names fields but has no object or resolvable input record".to_string()),
        None => Ok(String::new()),
    }
}

/// Fields touched by one element.
///
/// An `Err` means the element's references are unreadable; the caller drops
/// the whole element and records a warning.
pub(crate) fn touches(scope: &Scope<'_>, element: &CanonicalElement) -> Result<Vec<Touch>, String> {
    let mut c = Collector {
        scope,
        touches: Vec::new(),
    };

    match &element.body {
        ElementBody::Lookup {
            object,
            filters,
            outputs,
            queried_fields,
            output_reference,
            stores_output,
        } => {
            let needed = !(filters.is_empty() && outputs.is_empty() && queried_fields.is_empty());
            let entity = require(object.clone(), needed)?;
            c.filters(&entity, filters)?;
            for output in outputs {
                c.field(&entity, &output.field, Direction::Read, output.target.as_deref())?;
            }
            let bound = output_reference
                .as_deref()
                .or(stores_output.then_some(element.name.as_str()));
            for field in queried_fields {
                c.field(&entity, field, Direction::Read, bound)?;
            }
        }
        ElementBody::Create {
            object,
            inputs,
            input_reference,
        } => {
            let entity = require(target_entity(scope, object, input_reference), !inputs.is_empty())?;
            for input in inputs {
                c.field(&entity, &input.field, Direction::Write, None)?;
                c.value(input.value.as_ref())?;
            }
        }
        ElementBody::Update {
            object,
            filters,
            inputs,
            input_reference,
        } => {
            let needed = !(filters.is_empty() && inputs.is_empty());
            let entity = require(target_entity(scope, object, input_reference), needed)?;
            c.filters(&entity, filters)?;
            for input in inputs {
                c.field(&entity, &input.field, Direction::Write, None)?;
                c.value(input.value.as_ref())?;
            }
        }
        ElementBody::Delete {
            object,
            filters,
            input_reference,
        } => {
            let entity = require(target_entity(scope, object, input_reference), !filters.is_empty())?;
            c.filters(&entity, filters)?;
        }
        ElementBody::Decision { rules } => {
            for rule in rules {
                for condition in &rule.conditions {
                    c.reference(&condition.left, Direction::Read)?;
                    c.value(condition.right.as_ref())?;
                }
            }
        }
        ElementBody::Assignment { items } => {
            for item in items {
                c.reference(&item.target, Direction::Write)?;
                c.value(item.value.as_ref())?;
            }
        }
        ElementBody::Loop {
            collection_reference,
        } => {
            if let Some(collection) = collection_reference {
                c.reference(collection, Direction::Read)?;
            }
        }
        ElementBody::Other { .. } => {}
    }

    Ok(c.touches)
}
