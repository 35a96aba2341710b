// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validation verdicts per facet, entity, batch and specification

use serde::{Deserialize, Serialize};

use crate::specification::{Cardinality, Specification};

/// Pass/fail verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Status::Pass
        } else {
            Status::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Status::Pass
    }
}

/// Outcome of one requirement facet on one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResult {
    /// Display form of the facet
    pub facet: String,
    pub status: Status,
    pub detail: String,
}

/// All requirement outcomes for one applicable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityValidationResult {
    pub entity_id: u32,
    pub type_name: String,
    pub specification_name: String,
    pub status: Status,
    pub facet_results: Vec<FacetResult>,
}

impl EntityValidationResult {
    /// Failed facets only
    pub fn failures(&self) -> impl Iterator<Item = &FacetResult> {
        self.facet_results.iter().filter(|r| !r.status.is_pass())
    }
}

/// Aggregate over a contiguous slice of the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchValidationResult {
    /// Position of the slice's first entity in the model
    pub start_index: usize,
    /// Entities scanned (applicable or not)
    pub entity_count: usize,
    pub passed: usize,
    pub failed: usize,
    /// Results for applicable entities, in model order
    pub results: Vec<EntityValidationResult>,
}

impl BatchValidationResult {
    pub fn new(start_index: usize) -> Self {
        Self {
            start_index,
            ..Self::default()
        }
    }

    /// Record one entity verdict
    pub fn push(&mut self, result: EntityValidationResult) {
        match result.status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
        }
        self.results.push(result);
    }

    /// Number of applicable entities
    pub fn applicable(&self) -> usize {
        self.passed + self.failed
    }

    /// Append a batch that directly follows this one
    pub fn merge(&mut self, other: BatchValidationResult) {
        self.entity_count += other.entity_count;
        self.passed += other.passed;
        self.failed += other.failed;
        self.results.extend(other.results);
    }
}

/// Final verdict for one specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificationReport {
    pub identifier: String,
    pub name: String,
    pub cardinality: Cardinality,
    pub status: Status,
    pub applicable: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<EntityValidationResult>,
}

impl SpecificationReport {
    /// Reassemble batches (in any arrival order) and apply the cardinality rule
    pub fn from_batches(spec: &Specification, mut batches: Vec<BatchValidationResult>) -> Self {
        batches.sort_by_key(|b| b.start_index);
        let mut total = BatchValidationResult::new(0);
        for batch in batches {
            total.merge(batch);
        }

        let applicable = total.applicable();
        let passed = match spec.cardinality {
            Cardinality::Required => applicable > 0 && total.failed == 0,
            Cardinality::Optional => total.failed == 0,
            Cardinality::Prohibited => applicable == 0,
        };

        Self {
            identifier: spec.identifier.clone(),
            name: spec.name.clone(),
            cardinality: spec.cardinality,
            status: Status::from_bool(passed),
            applicable,
            passed: total.passed,
            failed: total.failed,
            results: total.results,
        }
    }
}
