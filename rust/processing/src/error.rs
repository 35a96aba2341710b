// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Failures surfaced to pool callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool terminated")]
    Terminated,

    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: u64, message: String },

    #[error("Task {task_id} returned {found}, expected {expected}")]
    UnexpectedOutput {
        task_id: u64,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Failed to start execution unit: {0}")]
    Spawn(String),
}

/// Failures of a full parse/validate run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Specification(#[from] ifc_ids_validation::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
