// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parse endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Multipart, State},
    Json,
};
use futures::stream::StreamExt;
use ifc_ids_core::{parse_stream, ParseEvent, StreamConfig};

use crate::error::ApiError;
use crate::services::extract_upload;
use crate::types::MetadataResponse;
use crate::AppState;

/// Schema identifier from the FILE_SCHEMA header record.
fn detect_schema(head: &[u8]) -> &'static str {
    let head = String::from_utf8_lossy(head).to_ascii_uppercase();
    if head.contains("IFC4X3") {
        "IFC4X3"
    } else if head.contains("IFC4") {
        "IFC4"
    } else {
        "IFC2X3"
    }
}

/// POST /api/v1/parse/metadata - Entity counts only (no validation).
pub async fn parse_metadata(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MetadataResponse>, ApiError> {
    let upload = extract_upload(&mut multipart, state.config.max_file_size_bytes()).await?;
    let file = upload.require_file()?;

    // The header section is tiny; the schema never appears past the first few KB
    let schema_version = detect_schema(&file[..file.len().min(8 * 1024)]);

    let config = StreamConfig {
        chunk_size: state.config.parse_chunk_size,
        total_bytes: Some(file.len() as u64),
        ..StreamConfig::default()
    };

    let mut entity_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut entity_count = 0;
    let mut skipped_records = 0;

    let events = parse_stream(&file[..], config);
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        match event? {
            ParseEvent::Entity(entity) => {
                *entity_types.entry(entity.type_name).or_default() += 1;
            }
            ParseEvent::Batch(batch) => {
                for entity in batch {
                    *entity_types.entry(entity.type_name).or_default() += 1;
                }
            }
            ParseEvent::Completed {
                entity_count: count,
                skipped_count,
                ..
            } => {
                entity_count = count;
                skipped_records = skipped_count;
            }
            ParseEvent::Skipped { .. } | ParseEvent::Progress(_) => {}
        }
    }

    tracing::info!(
        entities = entity_count,
        skipped = skipped_records,
        types = entity_types.len(),
        "Extracted metadata"
    );

    Ok(Json(MetadataResponse {
        entity_count,
        skipped_records,
        schema_version: schema_version.to_string(),
        file_size: file.len(),
        entity_types,
    }))
}
