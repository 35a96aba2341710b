// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-IDS Core
//!
//! Streaming STEP/IFC entity parser and reference index, the input side of
//! IDS validation.
//!
//! ## Overview
//!
//! - **Record Parsing**: `#id = TYPE(args);` records into typed [`Entity`] values (nom)
//! - **Streaming Parser**: chunked, stream-safe decoding with progress events
//! - **Reference Index**: object → property definition lookups in O(1)
//! - **Model**: id-addressable entity table shared read-only between workers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_ids_core::{parse_bytes, IfcModel, StreamConfig};
//!
//! let parsed = parse_bytes(content.as_bytes(), StreamConfig::default());
//! let model = IfcModel::from_entities(parsed.entities);
//!
//! for pset_id in model.property_definitions(42) {
//!     println!("#42 has property set #{}", pset_id);
//! }
//! ```
//!
//! ## Streaming Parser
//!
//! ```rust,ignore
//! use ifc_ids_core::{parse_stream, ParseEvent, StreamConfig};
//!
//! let mut stream = parse_stream(reader, StreamConfig::default());
//! while let Some(event) = stream.next().await {
//!     if let ParseEvent::Progress(p) = event? {
//!         println!("{} bytes, {} entities", p.processed_bytes, p.entity_count);
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for parsed data

pub mod entity;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod streaming;

pub use entity::{Entity, Value};
pub use error::{Error, Result};
pub use index::{build_reference_index, ReferenceIndex, RelationKind, RelationRecord};
pub use model::IfcModel;
pub use parser::{classify_token, parse_arguments, parse_record, split_arguments};
pub use streaming::{
    parse_bytes, parse_stream, EntityReader, ParseEvent, ParseProgress, ParsedFile, StreamConfig,
    StreamingParser,
};
