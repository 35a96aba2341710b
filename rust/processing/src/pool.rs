// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task execution pool
//!
//! `K` execution units, each a thread fed through its own request channel.
//! All units answer on one shared response channel that a dispatcher thread
//! drains: it resolves the caller's future, forwards progress, and hands the
//! freed unit the highest-priority queued task.
//!
//! ```rust,ignore
//! let pool = TaskPool::new(PoolConfig::default())?;
//! pool.wait_ready().await;
//! let parsed = pool.parse(ParseSource::Path(path), StreamConfig::default(), None).await?;
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::thread;

use ifc_ids_core::{IfcModel, ParsedFile, StreamConfig};
use ifc_ids_validation::{BatchValidationResult, Specification};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{mpsc::UnboundedSender, oneshot, watch};

use crate::error::PoolError;
use crate::protocol::{
    ParseSource, Priority, Request, Response, ResponseBody, TaskKind, TaskOutput, TaskPayload, TaskProgress,
};
use crate::worker::run_unit;

type Reply = oneshot::Sender<Result<TaskOutput, PoolError>>;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of execution units
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}

/// Available parallelism minus one (for the orchestrator), at least one
pub fn default_pool_size() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Pool occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub active: usize,
    pub idle: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Future of one submitted task
#[derive(Debug)]
pub struct TaskHandle {
    task_id: u64,
    receiver: oneshot::Receiver<Result<TaskOutput, PoolError>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }
}

impl Future for TaskHandle {
    type Output = Result<TaskOutput, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped reply sender means the pool went away without answering
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PoolError::Terminated)))
    }
}

struct PendingTask {
    kind: TaskKind,
    reply: Reply,
    progress: Option<UnboundedSender<TaskProgress>>,
}

struct QueuedTask {
    priority: Priority,
    request: Request,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// Max-heap: higher priority first, then lower (earlier) task id
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.request.task_id.cmp(&self.request.task_id))
    }
}

struct PoolState {
    terminated: bool,
    next_task_id: u64,
    /// Request channel per unit; emptied on terminate
    units: Vec<Sender<Request>>,
    idle: VecDeque<usize>,
    /// unit → running task
    busy: FxHashMap<usize, u64>,
    queue: BinaryHeap<QueuedTask>,
    pending: FxHashMap<u64, PendingTask>,
    completed: u64,
    failed: u64,
}

impl PoolState {
    /// Send a request to a unit, failing the task if the unit is gone
    fn dispatch(&mut self, unit: usize, request: Request) {
        let task_id = request.task_id;
        let sent = self
            .units
            .get(unit)
            .map(|sender| sender.send(request).is_ok())
            .unwrap_or(false);

        if sent {
            self.busy.insert(unit, task_id);
        } else {
            tracing::error!(unit, task_id, "Execution unit unavailable");
            self.finish(
                task_id,
                Err(PoolError::TaskFailed {
                    task_id,
                    message: format!("execution unit {} unavailable", unit),
                }),
            );
        }
    }

    /// Give a freed unit the next queued task, or mark it idle
    fn release(&mut self, unit: usize) {
        self.busy.remove(&unit);
        if self.terminated {
            return;
        }
        match self.queue.pop() {
            Some(next) => self.dispatch(unit, next.request),
            None => self.idle.push_back(unit),
        }
    }

    fn finish(&mut self, task_id: u64, result: Result<TaskOutput, PoolError>) {
        let Some(task) = self.pending.remove(&task_id) else {
            return;
        };
        match &result {
            Ok(_) => self.completed += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(task_id, kind = %task.kind, error = %e, "Task failed");
            }
        }
        let _ = task.reply.send(result);
    }
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded pool of execution units
pub struct TaskPool {
    size: usize,
    state: Arc<Mutex<PoolState>>,
    ready: watch::Receiver<usize>,
}

impl TaskPool {
    /// Start `config.size` units (at least one) and the response dispatcher
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let size = config.size.max(1);
        let (response_tx, response_rx) = mpsc::channel::<Response>();
        let (ready_tx, ready_rx) = watch::channel(0usize);

        let mut units = Vec::with_capacity(size);
        for unit in 0..size {
            let (request_tx, request_rx) = mpsc::channel::<Request>();
            let responses = response_tx.clone();
            thread::Builder::new()
                .name(format!("ifc-ids-unit-{}", unit))
                .spawn(move || run_unit(unit, request_rx, responses))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            units.push(request_tx);
        }
        // Units hold the only response senders; the dispatcher stops once they all exit
        drop(response_tx);

        let state = Arc::new(Mutex::new(PoolState {
            terminated: false,
            next_task_id: 1,
            units,
            idle: (0..size).collect(),
            busy: FxHashMap::default(),
            queue: BinaryHeap::new(),
            pending: FxHashMap::default(),
            completed: 0,
            failed: 0,
        }));

        let dispatcher_state = Arc::clone(&state);
        thread::Builder::new()
            .name("ifc-ids-dispatcher".to_string())
            .spawn(move || dispatch_responses(dispatcher_state, response_rx, ready_tx))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        tracing::info!(size, "Task pool started");
        Ok(Self {
            size,
            state,
            ready: ready_rx,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue a task; the returned handle resolves with its result
    pub fn submit(&self, payload: TaskPayload, priority: Priority) -> TaskHandle {
        self.enqueue(payload, priority, None)
    }

    /// Enqueue a task whose progress notifications go to `progress`
    pub fn submit_with_progress(
        &self,
        payload: TaskPayload,
        priority: Priority,
        progress: UnboundedSender<TaskProgress>,
    ) -> TaskHandle {
        self.enqueue(payload, priority, Some(progress))
    }

    fn enqueue(
        &self,
        payload: TaskPayload,
        priority: Priority,
        progress: Option<UnboundedSender<TaskProgress>>,
    ) -> TaskHandle {
        let (reply, receiver) = oneshot::channel();
        let mut state = lock(&self.state);

        if state.terminated {
            let _ = reply.send(Err(PoolError::Terminated));
            return TaskHandle { task_id: 0, receiver };
        }

        let task_id = state.next_task_id;
        state.next_task_id += 1;
        let kind = payload.kind();
        state.pending.insert(task_id, PendingTask { kind, reply, progress });

        let request = Request { task_id, payload };
        match state.idle.pop_front() {
            Some(unit) => {
                tracing::trace!(task_id, kind = %kind, unit, "Dispatching task");
                state.dispatch(unit, request);
            }
            None => {
                tracing::trace!(task_id, kind = %kind, priority = priority.0, "Queueing task");
                state.queue.push(QueuedTask { priority, request });
            }
        }

        TaskHandle { task_id, receiver }
    }

    /// Stop all units and fail every queued and in-flight task.
    ///
    /// Units finish their current task in the background; its result is discarded.
    pub fn terminate(&self) {
        let mut state = lock(&self.state);
        if state.terminated {
            return;
        }
        state.terminated = true;
        state.units.clear();
        state.idle.clear();
        state.busy.clear();
        state.queue.clear();

        let pending: Vec<(u64, PendingTask)> = state.pending.drain().collect();
        let count = pending.len();
        for (_, task) in pending {
            let _ = task.reply.send(Err(PoolError::Terminated));
        }
        state.failed += count as u64;
        tracing::info!(failed = count, "Task pool terminated");
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.state).terminated
    }

    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.state);
        PoolStats {
            size: self.size,
            active: state.busy.len(),
            idle: state.idle.len(),
            queued: state.queue.len(),
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Resolves once every unit has reported `READY` (or the pool shut down)
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.clone();
        let size = self.size;
        let _ = ready.wait_for(|&count| count >= size).await;
    }

    pub async fn parse(
        &self,
        source: ParseSource,
        config: StreamConfig,
        progress: Option<UnboundedSender<TaskProgress>>,
    ) -> Result<ParsedFile, PoolError> {
        let handle = self.enqueue(TaskPayload::ParseFile { source, config }, Priority::HIGH, progress);
        let task_id = handle.task_id();
        match handle.await? {
            TaskOutput::Parsed(parsed) => Ok(parsed),
            other => Err(unexpected(task_id, "PARSE_RESULT", &other)),
        }
    }

    pub async fn validate_batch(
        &self,
        model: Arc<IfcModel>,
        specification: Arc<Specification>,
        start_index: usize,
        end_index: usize,
    ) -> Result<BatchValidationResult, PoolError> {
        let payload = TaskPayload::ValidateBatch {
            model,
            specification,
            start_index,
            end_index,
        };
        let handle = self.submit(payload, Priority::NORMAL);
        let task_id = handle.task_id();
        match handle.await? {
            TaskOutput::Batch(result) => Ok(result),
            other => Err(unexpected(task_id, "BATCH_RESULT", &other)),
        }
    }

    pub async fn validate_spec(
        &self,
        model: Arc<IfcModel>,
        specification: Arc<Specification>,
        chunk_size: usize,
        progress: Option<UnboundedSender<TaskProgress>>,
    ) -> Result<BatchValidationResult, PoolError> {
        let payload = TaskPayload::ValidateSpec {
            model,
            specification,
            chunk_size,
        };
        let handle = self.enqueue(payload, Priority::NORMAL, progress);
        let task_id = handle.task_id();
        match handle.await? {
            TaskOutput::Spec(result) => Ok(result),
            other => Err(unexpected(task_id, "SPEC_RESULT", &other)),
        }
    }

    /// Round-trip through an idle unit; returns the unit index
    pub async fn ping(&self) -> Result<usize, PoolError> {
        let handle = self.submit(TaskPayload::Ping, Priority::LOW);
        let task_id = handle.task_id();
        match handle.await? {
            TaskOutput::Pong(unit) => Ok(unit),
            other => Err(unexpected(task_id, "PONG", &other)),
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn unexpected(task_id: u64, expected: &'static str, found: &TaskOutput) -> PoolError {
    PoolError::UnexpectedOutput {
        task_id,
        expected,
        found: found.kind(),
    }
}

/// Dispatcher loop: runs until every unit has dropped its response sender
fn dispatch_responses(state: Arc<Mutex<PoolState>>, responses: Receiver<Response>, ready: watch::Sender<usize>) {
    for Response { task_id, unit, body } in responses {
        let mut pool = lock(&state);

        let result = match body {
            ResponseBody::Ready => {
                ready.send_modify(|count| *count += 1);
                continue;
            }
            ResponseBody::Progress(update) => {
                if let Some(sender) = pool.pending.get(&task_id).and_then(|t| t.progress.as_ref()) {
                    let _ = sender.send(TaskProgress { task_id, update });
                }
                continue;
            }
            ResponseBody::ParseResult(parsed) => Ok(TaskOutput::Parsed(parsed)),
            ResponseBody::BatchResult(result) => Ok(TaskOutput::Batch(result)),
            ResponseBody::SpecResult(result) => Ok(TaskOutput::Spec(result)),
            ResponseBody::Pong => Ok(TaskOutput::Pong(unit)),
            ResponseBody::Error { message } => Err(PoolError::TaskFailed { task_id, message }),
        };

        // Results arriving after terminate belong to tasks that were already failed
        if pool.terminated {
            continue;
        }
        pool.finish(task_id, result);
        pool.release(unit);
    }
    tracing::debug!("Response dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_order() {
        let task = |task_id, priority| QueuedTask {
            priority,
            request: Request {
                task_id,
                payload: TaskPayload::Ping,
            },
        };
        let mut queue = BinaryHeap::new();
        queue.push(task(1, Priority::LOW));
        queue.push(task(2, Priority::NORMAL));
        queue.push(task(3, Priority::HIGH));
        queue.push(task(4, Priority::NORMAL));
        queue.push(task(5, Priority::HIGH));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop().map(|t| t.request.task_id)).collect();
        assert_eq!(order, vec![3, 5, 2, 4, 1]);
    }

    #[test]
    fn test_default_size() {
        assert!(PoolConfig::default().size >= 1);
    }

    #[test]
    fn test_submit_after_terminate_fails() {
        let pool = TaskPool::new(PoolConfig { size: 1 }).unwrap();
        pool.terminate();
        let handle = pool.submit(TaskPayload::Ping, Priority::NORMAL);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(rt.block_on(handle).unwrap_err(), PoolError::Terminated);
        assert!(pool.is_terminated());
    }
}
