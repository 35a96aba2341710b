// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC-IDS Server - validates IFC models against IDS specifications.
//!
//! Uploads are parsed and validated on a shared task pool; results are
//! cached on disk keyed by the model and specification contents.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Health check with pool statistics
//! - `POST /api/v1/validate` - Full validation report (JSON)
//! - `POST /api/v1/validate/stream` - Validation with progress (SSE)
//! - `POST /api/v1/parse/metadata` - Entity counts without validation
//! - `GET /api/v1/cache/:key` - Retrieve cached report

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use ifc_ids_processing::{PoolConfig, TaskPool};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

mod config;
mod error;
mod routes;
mod services;
mod types;

use config::Config;
use services::cache::DiskCache;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DiskCache>,
    pub config: Arc<Config>,
    pub pool: Arc<TaskPool>,
}

fn app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    Router::new()
        // Root endpoint - API information
        .route("/", get(routes::health::info))
        .route("/api/v1/health", get(routes::health::check))
        // Validation endpoints
        .route("/api/v1/validate", post(routes::validate::validate))
        .route("/api/v1/validate/stream", post(routes::validate::validate_stream))
        .route("/api/v1/parse/metadata", post(routes::parse::parse_metadata))
        .route("/api/v1/cache/:key", get(routes::cache::get_cached))
        // Middleware
        .layer(DefaultBodyLimit::max(config.max_file_size_bytes()))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug,ifc_ids_server=debug".into()),
        )
        .pretty()
        .init();

    let config = Config::from_env();

    tracing::info!(
        port = config.port,
        cache_dir = %config.cache_dir,
        max_file_size_mb = config.max_file_size_mb,
        worker_threads = config.worker_threads,
        batch_size = config.validation_batch_size,
        "Starting IFC-IDS Server"
    );

    let pool = Arc::new(TaskPool::new(PoolConfig {
        size: config.worker_threads,
    })?);
    pool.wait_ready().await;

    let cache = Arc::new(DiskCache::new(&config.cache_dir).await);

    let state = AppState {
        cache,
        config: Arc::new(config.clone()),
        pool: Arc::clone(&pool),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    pool.terminate();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "X";

    async fn test_state(cache_dir: &std::path::Path) -> AppState {
        let config = Config {
            port: 0,
            cache_dir: cache_dir.to_string_lossy().into_owned(),
            max_file_size_mb: 4,
            request_timeout_secs: 30,
            worker_threads: 2,
            parse_chunk_size: 64,
            validation_batch_size: 10,
            progress_interval: 10,
        };
        let pool = Arc::new(TaskPool::new(PoolConfig { size: 2 }).unwrap());
        pool.wait_ready().await;
        AppState {
            cache: Arc::new(DiskCache::new(&config.cache_dir).await),
            config: Arc::new(config),
            pool,
        }
    }

    fn multipart(fields: &[(&str, &str)]) -> Body {
        let mut body = String::new();
        for (name, content) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, content
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        Body::from(body)
    }

    fn post(uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(body)
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const MODEL: &str = "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n\
        #1=IFCWALL('GUID',$,$,$,$,$,$,$);\n\
        #2=IFCRELDEFINESBYPROPERTIES('r',$,$,$,(#1),#3);\nENDSEC;\nEND-ISO-10303-21;\n";

    const IDS: &str = r#"[{ "name": "Walls have property sets",
        "applicability": [{ "entity": { "name": "IFCWALL" } }],
        "requirements": [{ "property": {} }] }]"#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path()).await);

        let response = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["pool"]["size"], 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_validate_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let response = app(state.clone())
            .oneshot(post("/api/v1/validate", multipart(&[("file", MODEL), ("ids", IDS)])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["report"]["status"], "pass");
        assert_eq!(body["report"]["entity_count"], 2);
        assert_eq!(body["from_cache"], false);

        // Stored in the background
        let key = body["cache_key"].as_str().unwrap().to_string();
        let mut cached = None;
        for _ in 0..50 {
            if let Some(report) = state
                .cache
                .get::<ifc_ids_processing::ValidationReport>(&key)
                .await
                .unwrap()
            {
                cached = Some(report);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cached.is_some());

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/cache/{}", key))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["from_cache"], true);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_validate_without_specifications() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path()).await);

        let response = app
            .oneshot(post("/api/v1/validate", multipart(&[("file", MODEL)])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "MISSING_SPECIFICATIONS");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalid_specification() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path()).await);

        let response = app
            .oneshot(post("/api/v1/validate", multipart(&[("file", MODEL), ("ids", "{ nope")])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path()).await);

        let response = app
            .oneshot(post("/api/v1/parse/metadata", multipart(&[("file", MODEL)])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["entity_count"], 2);
        assert_eq!(body["schema_version"], "IFC4");
        assert_eq!(body["entity_types"]["IFCWALL"], 1);
    }
}
