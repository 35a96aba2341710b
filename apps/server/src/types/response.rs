// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response types for the API.

use std::collections::BTreeMap;

use ifc_ids_processing::ValidationReport;
use serde::{Deserialize, Serialize};

/// Validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Cache key for this result (SHA256 of model and specifications).
    pub cache_key: String,
    pub report: ValidationReport,
    /// Whether result was from cache.
    pub from_cache: bool,
}

/// Metadata-only response (no validation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataResponse {
    /// Number of parsed entities.
    pub entity_count: usize,
    /// Records that did not match the record grammar.
    pub skipped_records: usize,
    /// IFC schema version.
    pub schema_version: String,
    /// File size in bytes.
    pub file_size: usize,
    /// Entity count per type name.
    pub entity_types: BTreeMap<String, usize>,
}

/// Terminal Server-Sent Events of a streaming validation.
///
/// Progress is sent as the pipeline's own events before these.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Validation complete.
    Complete {
        cache_key: String,
        report: ValidationReport,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
        code: String,
    },
}
