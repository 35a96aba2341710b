// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messages exchanged between the pool and its execution units
//!
//! Every request carries a task id; every response echoes it so results can
//! be matched to their callers regardless of completion order. Task id `0` is
//! reserved for unit-level messages (`READY`).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use ifc_ids_core::{IfcModel, ParseProgress, ParsedFile, StreamConfig};
use ifc_ids_validation::{BatchValidationResult, Specification};
use serde::Serialize;

/// Scheduling priority; higher runs first, FIFO among equals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub u8);

impl Priority {
    pub const LOW: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(5);
    pub const HIGH: Priority = Priority(10);
}

/// Request type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ParseFile,
    ValidateBatch,
    ValidateSpec,
    Ping,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::ParseFile => "PARSE_FILE",
            TaskKind::ValidateBatch => "VALIDATE_BATCH",
            TaskKind::ValidateSpec => "VALIDATE_SPEC",
            TaskKind::Ping => "PING",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parse task reads its input from
#[derive(Debug, Clone)]
pub enum ParseSource {
    Path(PathBuf),
    Bytes(Bytes),
}

impl From<PathBuf> for ParseSource {
    fn from(path: PathBuf) -> Self {
        ParseSource::Path(path)
    }
}

impl From<Bytes> for ParseSource {
    fn from(bytes: Bytes) -> Self {
        ParseSource::Bytes(bytes)
    }
}

/// Work description; models and specifications are immutable snapshots
#[derive(Debug, Clone)]
pub enum TaskPayload {
    ParseFile {
        source: ParseSource,
        config: StreamConfig,
    },
    /// Validate `model.entities()[start_index..end_index]`
    ValidateBatch {
        model: Arc<IfcModel>,
        specification: Arc<Specification>,
        start_index: usize,
        end_index: usize,
    },
    /// Validate the whole model, reporting progress every `chunk_size` entities
    ValidateSpec {
        model: Arc<IfcModel>,
        specification: Arc<Specification>,
        chunk_size: usize,
    },
    Ping,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::ParseFile { .. } => TaskKind::ParseFile,
            TaskPayload::ValidateBatch { .. } => TaskKind::ValidateBatch,
            TaskPayload::ValidateSpec { .. } => TaskKind::ValidateSpec,
            TaskPayload::Ping => TaskKind::Ping,
        }
    }
}

/// Orchestrator → unit
#[derive(Debug, Clone)]
pub struct Request {
    pub task_id: u64,
    pub payload: TaskPayload,
}

/// Intermediate progress of a running task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum ProgressUpdate {
    Parse(ParseProgress),
    Validation { processed: usize, total: usize },
}

/// Progress notification delivered to a task's progress channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgress {
    pub task_id: u64,
    pub update: ProgressUpdate,
}

/// Unit → orchestrator payload
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Ready,
    Progress(ProgressUpdate),
    ParseResult(ParsedFile),
    BatchResult(BatchValidationResult),
    SpecResult(BatchValidationResult),
    Pong,
    Error { message: String },
}

impl ResponseBody {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::Ready => "READY",
            ResponseBody::Progress(_) => "PROGRESS",
            ResponseBody::ParseResult(_) => "PARSE_RESULT",
            ResponseBody::BatchResult(_) => "BATCH_RESULT",
            ResponseBody::SpecResult(_) => "SPEC_RESULT",
            ResponseBody::Pong => "PONG",
            ResponseBody::Error { .. } => "ERROR",
        }
    }
}

/// Unit → orchestrator
#[derive(Debug, Clone)]
pub struct Response {
    pub task_id: u64,
    /// Index of the responding unit
    pub unit: usize,
    pub body: ResponseBody,
}

/// Successful task result as seen by the submitter
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Parsed(ParsedFile),
    Batch(BatchValidationResult),
    Spec(BatchValidationResult),
    /// Index of the unit that answered
    Pong(usize),
}

impl TaskOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskOutput::Parsed(_) => "PARSE_RESULT",
            TaskOutput::Batch(_) => "BATCH_RESULT",
            TaskOutput::Spec(_) => "SPEC_RESULT",
            TaskOutput::Pong(_) => "PONG",
        }
    }
}
