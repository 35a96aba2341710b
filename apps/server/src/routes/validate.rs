// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validation endpoints.

use std::convert::Infallible;

use axum::{
    extract::{Multipart, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use ifc_ids_processing::{ParseSource, PipelineEvent, ValidationPipeline, ValidationReport};
use serde::Serialize;
use tokio::sync::{mpsc::unbounded_channel, oneshot};

use crate::error::ApiError;
use crate::services::{extract_upload, DiskCache};
use crate::types::{StreamEvent, ValidateOptions, ValidateResponse};
use crate::AppState;

/// Store a report without holding up the response.
fn cache_in_background(state: &AppState, cache_key: String, report: ValidationReport) {
    let cache = state.cache.clone();
    tokio::spawn(async move {
        if let Err(e) = cache.set(&cache_key, &report).await {
            tracing::error!(error = %e, "Failed to cache result");
        }
    });
}

/// POST /api/v1/validate - Full synchronous validation.
pub async fn validate(
    State(state): State<AppState>,
    Query(options): Query<ValidateOptions>,
    mut multipart: Multipart,
) -> Result<Json<ValidateResponse>, ApiError> {
    let upload = extract_upload(&mut multipart, state.config.max_file_size_bytes()).await?;
    let file = upload.require_file()?;
    let ids = upload.require_ids()?;

    let cache_key = DiskCache::generate_key(&[&file[..], ids.as_bytes()]);

    if !options.skip_cache {
        if let Some(report) = state.cache.get::<ValidationReport>(&cache_key).await? {
            tracing::info!(cache_key = %cache_key, "Cache HIT");
            return Ok(Json(ValidateResponse {
                cache_key,
                report,
                from_cache: true,
            }));
        }
    }

    tracing::info!(cache_key = %cache_key, size = file.len(), "Cache MISS - validating");

    let pipeline = ValidationPipeline::new(state.pool.clone(), state.config.pipeline());
    let report = pipeline.run_json(ParseSource::Bytes(file), ids, None).await?;

    cache_in_background(&state, cache_key.clone(), report.clone());

    Ok(Json(ValidateResponse {
        cache_key,
        report,
        from_cache: false,
    }))
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Event {
    let json = serde_json::to_string(payload).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","message":"{}","code":"INTERNAL_ERROR"}}"#, e)
    });
    Event::default().event(name).data(json)
}

fn event_name(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::Parse(_) => "parse",
        PipelineEvent::Validation { .. } => "validation",
        PipelineEvent::SpecificationDone { .. } => "specification_done",
    }
}

/// POST /api/v1/validate/stream - Streaming SSE validation.
///
/// Emits pipeline progress events, then one `complete` or `error` event.
pub async fn validate_stream(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let upload = extract_upload(&mut multipart, state.config.max_file_size_bytes()).await?;
    let file = upload.require_file()?;
    let ids = upload.require_ids()?.to_string();
    let cache_key = DiskCache::generate_key(&[&file[..], ids.as_bytes()]);

    let (events_tx, mut events_rx) = unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let pipeline = ValidationPipeline::new(state.pool.clone(), state.config.pipeline());

    tokio::spawn(async move {
        let result = pipeline.run_json(ParseSource::Bytes(file), &ids, Some(events_tx)).await;
        let _ = done_tx.send(result);
    });

    let stream = async_stream::stream! {
        while let Some(event) = events_rx.recv().await {
            yield Ok::<_, Infallible>(sse_event(event_name(&event), &event));
        }

        let final_event = match done_rx.await {
            Ok(Ok(report)) => {
                cache_in_background(&state, cache_key.clone(), report.clone());
                sse_event("complete", &StreamEvent::Complete { cache_key, report })
            }
            Ok(Err(e)) => {
                let error = ApiError::from(e);
                let code = error.status_and_code().1.to_string();
                sse_event("error", &StreamEvent::Error { message: error.to_string(), code })
            }
            Err(_) => sse_event(
                "error",
                &StreamEvent::Error {
                    message: "validation task aborted".to_string(),
                    code: "INTERNAL_ERROR".to_string(),
                },
            ),
        };
        yield Ok::<_, Infallible>(final_event);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
