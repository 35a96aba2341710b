// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facet evaluation
//!
//! The engine only borrows the model and the caller's [`RegexCache`]; it keeps
//! no state between calls, so one engine per execution unit and task is cheap.
//! Missing data never raises an error: it produces a `Fail` verdict with a detail
//! naming what was not found.

use ifc_ids_core::{Entity, IfcModel, Value};

use crate::properties::{property_sets, PropertySetView};
use crate::regex_cache::RegexCache;
use crate::result::{BatchValidationResult, EntityValidationResult, FacetResult, Status};
use crate::specification::{Constraint, Facet, Specification};

/// Relative tolerance for numeric literal comparison
const NUMERIC_TOLERANCE: f64 = 1e-6;

/// Position of well-known attributes in IfcRoot / IfcObject / IfcProduct / IfcElement
fn attribute_position(name: &str) -> Option<usize> {
    Some(match name {
        "GlobalId" => 0,
        "OwnerHistory" => 1,
        "Name" => 2,
        "Description" => 3,
        "ObjectType" => 4,
        "ObjectPlacement" => 5,
        "Representation" => 6,
        "Tag" => 7,
        "PredefinedType" => 8,
        _ => return None,
    })
}

/// Predefined type: the last enumeration argument, or ObjectType when USERDEFINED
fn predefined_type(entity: &Entity) -> Option<&str> {
    let value = entity.arguments.iter().rev().find_map(Value::as_enum)?;
    if value == "USERDEFINED" {
        // IfcObject: [4]=ObjectType
        return entity.get_string(4).or(Some(value));
    }
    Some(value)
}

struct Check {
    passed: bool,
    detail: String,
}

impl Check {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

fn describe(constraint: Option<&Constraint>) -> String {
    constraint.map_or_else(|| "*".to_string(), |c| c.to_string())
}

/// Rule evaluator over one model
pub struct ValidationEngine<'m, 'c> {
    model: &'m IfcModel,
    cache: &'c mut RegexCache,
}

impl<'m, 'c> ValidationEngine<'m, 'c> {
    pub fn new(model: &'m IfcModel, cache: &'c mut RegexCache) -> Self {
        Self { model, cache }
    }

    /// Entities satisfying every applicability facet
    pub fn filter_by_applicability<'e>(&mut self, entities: &'e [Entity], facets: &[Facet]) -> Vec<&'e Entity> {
        entities
            .iter()
            .filter(|entity| self.is_applicable(entity, facets))
            .collect()
    }

    /// Conjunction of all applicability facets
    pub fn is_applicable(&mut self, entity: &Entity, facets: &[Facet]) -> bool {
        facets.iter().all(|facet| self.evaluate(entity, facet).passed)
    }

    /// Evaluate every requirement facet; no short-circuiting
    pub fn validate_entity(&mut self, entity: &Entity, requirements: &[Facet], spec_name: &str) -> EntityValidationResult {
        let facet_results: Vec<FacetResult> = requirements
            .iter()
            .map(|facet| {
                let check = self.evaluate(entity, facet);
                FacetResult {
                    facet: facet.to_string(),
                    status: Status::from_bool(check.passed),
                    detail: check.detail,
                }
            })
            .collect();

        let status = Status::from_bool(facet_results.iter().all(|r| r.status.is_pass()));
        EntityValidationResult {
            entity_id: entity.id,
            type_name: entity.type_name.clone(),
            specification_name: spec_name.to_string(),
            status,
            facet_results,
        }
    }

    /// Validate the applicable entities of a slice; `start_index` is the slice's model offset
    pub fn validate_batch(&mut self, entities: &[Entity], spec: &Specification, start_index: usize) -> BatchValidationResult {
        let mut batch = BatchValidationResult::new(start_index);
        batch.entity_count = entities.len();

        for entity in entities {
            if self.is_applicable(entity, &spec.applicability) {
                let result = self.validate_entity(entity, &spec.requirements, &spec.name);
                batch.push(result);
            }
        }

        tracing::debug!(
            spec = %spec.name,
            start_index,
            scanned = batch.entity_count,
            passed = batch.passed,
            failed = batch.failed,
            "Validated batch"
        );
        batch
    }

    /// Validate the whole model in chunks, reporting `(processed, total)` after each chunk
    pub fn validate_spec(
        &mut self,
        spec: &Specification,
        chunk_size: usize,
        mut on_progress: impl FnMut(usize, usize),
    ) -> BatchValidationResult {
        let model = self.model;
        let entities = model.entities();
        let total = entities.len();
        let mut result = BatchValidationResult::new(0);

        for (i, chunk) in entities.chunks(chunk_size.max(1)).enumerate() {
            let offset = i * chunk_size.max(1);
            let batch = self.validate_batch(chunk, spec, offset);
            result.merge(batch);
            on_progress(offset + chunk.len(), total);
        }

        result
    }

    fn evaluate(&mut self, entity: &Entity, facet: &Facet) -> Check {
        match facet {
            Facet::Entity {
                name,
                predefined_type: expected,
            } => self.check_entity(entity, name, expected.as_deref()),
            Facet::Property {
                property_set,
                base_name,
                value,
            } => self.check_property(entity, property_set.as_ref(), base_name.as_ref(), value.as_ref()),
            Facet::Attribute { name, value } => self.check_attribute(entity, name, value.as_ref()),
        }
    }

    fn check_entity(&mut self, entity: &Entity, name: &str, expected: Option<&str>) -> Check {
        if entity.type_name != name {
            return Check::fail(format!("Expected entity {}, found {}", name, entity.type_name));
        }
        let Some(expected) = expected else {
            return Check::pass(format!("Entity is {}", name));
        };
        match predefined_type(entity) {
            Some(found) if found == expected => Check::pass(format!("Entity is {}.{}", name, expected)),
            Some(found) => Check::fail(format!("Expected predefined type {}, found {}", expected, found)),
            None => Check::fail(format!("Expected predefined type {}, none set", expected)),
        }
    }

    fn check_attribute(&mut self, entity: &Entity, name: &str, constraint: Option<&Constraint>) -> Check {
        let Some(position) = attribute_position(name) else {
            return Check::fail(format!("Unknown attribute {}", name));
        };

        let value = match entity.get(position) {
            Some(v) if !v.is_null() && v.as_string() != Some("") => v,
            _ => return Check::fail(format!("Attribute {} is not set", name)),
        };

        let Some(constraint) = constraint else {
            return Check::pass(format!("Attribute {} is set", name));
        };

        match value.as_text() {
            Some(text) if self.matches(constraint, &text) => {
                Check::pass(format!("Attribute {} = '{}'", name, text))
            }
            Some(text) => Check::fail(format!(
                "Attribute {} value '{}' does not match {}",
                name, text, constraint
            )),
            None => Check::fail(format!("Attribute {} has no comparable value", name)),
        }
    }

    fn check_property(
        &mut self,
        entity: &Entity,
        property_set: Option<&Constraint>,
        base_name: Option<&Constraint>,
        value: Option<&Constraint>,
    ) -> Check {
        let model = self.model;
        let label = format!("{}.{}", describe(property_set), describe(base_name));

        if property_set.is_none() && base_name.is_none() && value.is_none() {
            return if model.property_definitions(entity.id).is_empty() && property_sets(model, entity.id).is_empty() {
                Check::fail("No property set attached")
            } else {
                Check::pass("Property set attached")
            };
        }

        let sets: Vec<PropertySetView<'_>> = property_sets(model, entity.id)
            .into_iter()
            .filter(|set| property_set.map_or(true, |c| self.matches(c, set.name)))
            .collect();

        if sets.is_empty() {
            return Check::fail(format!(
                "Property {} not found: no property set {}",
                label,
                describe(property_set)
            ));
        }

        if base_name.is_none() && value.is_none() {
            return Check::pass(format!("Property set {} found", sets[0].name));
        }

        let mut found_property = false;
        let mut seen: Vec<String> = Vec::new();

        for set in &sets {
            for property in &set.properties {
                if !base_name.map_or(true, |c| self.matches(c, property.name)) {
                    continue;
                }
                found_property = true;

                let Some(value_constraint) = value else {
                    return Check::pass(format!("Property {}.{} found", set.name, property.name));
                };

                for text in property.values.iter().filter_map(|v| v.as_text()) {
                    if self.matches(value_constraint, &text) {
                        return Check::pass(format!("Property {}.{} = '{}'", set.name, property.name, text));
                    }
                    seen.push(text);
                }
            }
        }

        match (found_property, value) {
            (false, _) => Check::fail(format!("Property {} not found", label)),
            (true, Some(constraint)) if seen.is_empty() => {
                Check::fail(format!("Property {} has no value (expected {})", label, constraint))
            }
            (true, Some(constraint)) => Check::fail(format!(
                "Property {} value '{}' does not match {}",
                label,
                seen.join("', '"),
                constraint
            )),
            (true, None) => Check::pass(format!("Property {} found", label)),
        }
    }

    fn matches(&mut self, constraint: &Constraint, text: &str) -> bool {
        match constraint {
            Constraint::Literal(expected) => text == expected || numeric_eq(expected, text),
            Constraint::Pattern { pattern, flags } => self.cache.matches(pattern, flags, text),
        }
    }
}

fn numeric_eq(a: &str, b: &str) -> bool {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => {
            (x - y).abs() <= NUMERIC_TOLERANCE * x.abs().max(y.abs())
        }
        _ => false,
    }
}
