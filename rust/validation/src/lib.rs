// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-IDS Validation
//!
//! Evaluates IDS specifications against a parsed [`IfcModel`](ifc_ids_core::IfcModel).
//!
//! A specification selects entities with its applicability facets and checks
//! every selected entity against all of its requirement facets. Results are
//! produced per entity, aggregated per batch, and reassembled per specification
//! with the cardinality rule applied last.
//!
//! ```rust,ignore
//! use ifc_ids_validation::{load_specifications, RegexCache, SpecificationReport, ValidationEngine};
//!
//! let specs = load_specifications(&ids_json)?;
//! let mut cache = RegexCache::new();
//! let mut engine = ValidationEngine::new(&model, &mut cache);
//!
//! for spec in &specs {
//!     let batch = engine.validate_spec(spec, 1000, |done, total| println!("{}/{}", done, total));
//!     let report = SpecificationReport::from_batches(spec, vec![batch]);
//!     println!("{}: {:?}", report.name, report.status);
//! }
//! ```

pub mod engine;
pub mod error;
pub mod properties;
pub mod regex_cache;
pub mod result;
pub mod specification;

pub use engine::ValidationEngine;
pub use error::{Error, Result};
pub use properties::{property_sets, PropertySetView, PropertyView};
pub use regex_cache::{RegexCache, RegexCacheStats};
pub use result::{BatchValidationResult, EntityValidationResult, FacetResult, SpecificationReport, Status};
pub use specification::{load_specifications, Cardinality, Constraint, Facet, Specification};
