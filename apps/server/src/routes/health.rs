// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Health check endpoint.

use axum::{extract::State, Json};
use ifc_ids_processing::PoolStats;
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub pool: PoolStats,
}

/// API information response.
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

/// Endpoint information.
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

/// GET /api/v1/health - Health check endpoint.
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.pool.is_terminated() { "unavailable" } else { "healthy" };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "ifc-ids-server",
        pool: state.pool.stats(),
    })
}

/// GET / - API information endpoint.
pub async fn info() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "ifc-ids-server",
        version: env!("CARGO_PKG_VERSION"),
        description: "IFC model validation against IDS specifications",
        endpoints: vec![
            EndpointInfo {
                method: "GET",
                path: "/api/v1/health",
                description: "Health check with task pool statistics",
            },
            EndpointInfo {
                method: "POST",
                path: "/api/v1/validate",
                description: "Validate an IFC file (multipart 'file') against IDS JSON ('ids')",
            },
            EndpointInfo {
                method: "POST",
                path: "/api/v1/validate/stream",
                description: "Streaming validation (Server-Sent Events)",
            },
            EndpointInfo {
                method: "POST",
                path: "/api/v1/parse/metadata",
                description: "Entity counts without validation",
            },
            EndpointInfo {
                method: "GET",
                path: "/api/v1/cache/:key",
                description: "Retrieve cached validation result",
            },
        ],
    })
}
