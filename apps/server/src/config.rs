// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration loaded from environment variables.

use ifc_ids_core::StreamConfig;
use ifc_ids_processing::{default_pool_size, PipelineConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Directory for cache storage.
    pub cache_dir: String,
    /// Maximum upload size in MB.
    pub max_file_size_mb: usize,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Number of execution units in the task pool.
    pub worker_threads: usize,
    /// Bytes read per parse chunk.
    pub parse_chunk_size: usize,
    /// Entities per validation batch task.
    pub validation_batch_size: usize,
    /// Entities between validation progress events.
    pub progress_interval: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 8080),
            cache_dir: std::env::var("CACHE_DIR").unwrap_or_else(|_| {
                // Docker images ship /app/cache; local runs use ./.cache
                if std::path::Path::new("/.dockerenv").exists() {
                    "/app/cache".into()
                } else {
                    std::env::current_dir()
                        .ok()
                        .and_then(|dir| dir.join(".cache").to_str().map(|s| s.to_string()))
                        .unwrap_or_else(|| "./.cache".into())
                }
            }),
            max_file_size_mb: env_or("MAX_FILE_SIZE_MB", 500),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 300),
            worker_threads: env_or("WORKER_THREADS", default_pool_size()).max(1),
            parse_chunk_size: env_or("PARSE_CHUNK_SIZE", 1024 * 1024).max(1),
            validation_batch_size: env_or("VALIDATION_BATCH_SIZE", 1000).max(1),
            progress_interval: env_or("PROGRESS_INTERVAL", 500).max(1),
        }
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Pipeline settings for one request.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.validation_batch_size,
            chunk_size: self.progress_interval,
            stream: StreamConfig {
                chunk_size: self.parse_chunk_size,
                ..StreamConfig::default()
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
