// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multipart upload extraction.

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::ApiError;

/// Fields of a validation upload.
#[derive(Debug, Default)]
pub struct Upload {
    /// IFC model (`file` field).
    pub file: Option<Bytes>,
    /// IDS specifications as JSON (`ids` field).
    pub ids: Option<String>,
}

impl Upload {
    pub fn require_file(&self) -> Result<Bytes, ApiError> {
        self.file.clone().ok_or(ApiError::MissingFile)
    }

    pub fn require_ids(&self) -> Result<&str, ApiError> {
        self.ids
            .as_deref()
            .filter(|ids| !ids.trim().is_empty())
            .ok_or(ApiError::MissingSpecifications)
    }
}

/// Read the `file` and `ids` fields, rejecting files above `max_bytes`.
pub async fn extract_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        tracing::debug!(field_name = %field_name, "Processing multipart field");

        match field_name.as_str() {
            "file" => {
                let bytes = field.bytes().await?;
                if bytes.len() > max_bytes {
                    return Err(ApiError::FileTooLarge {
                        max_mb: max_bytes / (1024 * 1024),
                    });
                }
                tracing::debug!(size = bytes.len(), "Extracted file from multipart");
                upload.file = Some(bytes);
            }
            "ids" => upload.ids = Some(field.text().await?),
            _ => {}
        }
    }

    if upload.file.is_none() {
        tracing::warn!("No 'file' field found in multipart request");
    }
    Ok(upload)
}
