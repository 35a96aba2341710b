// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-IDS Processing
//!
//! Parallel execution of parse and validation tasks.
//!
//! - [`TaskPool`]: `K` isolated execution units behind a priority queue,
//!   talking to the orchestrator only through task-id correlated messages
//! - [`ValidationPipeline`]: parse → index → fan out validation → reassemble
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ifc_ids_processing::{ParseSource, PipelineConfig, PoolConfig, TaskPool, ValidationPipeline};
//!
//! let pool = Arc::new(TaskPool::new(PoolConfig::default())?);
//! let pipeline = ValidationPipeline::new(pool, PipelineConfig::default());
//! let report = pipeline.run_json(ParseSource::Path(path), &ids_json, None).await?;
//! ```

pub mod error;
pub mod pipeline;
pub mod pool;
pub mod protocol;
mod worker;

pub use error::{PipelineError, PoolError, Result};
pub use pipeline::{PipelineConfig, PipelineEvent, ValidationPipeline, ValidationReport};
pub use pool::{default_pool_size, PoolConfig, PoolStats, TaskHandle, TaskPool};
pub use protocol::{
    ParseSource, Priority, ProgressUpdate, Request, Response, ResponseBody, TaskKind, TaskOutput, TaskPayload,
    TaskProgress,
};
