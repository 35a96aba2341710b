// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parse → index → validate orchestration over a [`TaskPool`]

use std::sync::Arc;
use std::time::Instant;

use futures_util::future;
use futures_util::stream::{FuturesUnordered, StreamExt};
use ifc_ids_core::{IfcModel, ParseProgress, StreamConfig};
use ifc_ids_validation::{
    load_specifications, BatchValidationResult, Specification, SpecificationReport, Status,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::{PoolError, Result};
use crate::pool::TaskPool;
use crate::protocol::{ParseSource, Priority, ProgressUpdate, TaskOutput, TaskPayload, TaskProgress};

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Entities per `VALIDATE_BATCH` task
    pub batch_size: usize,
    /// Progress granularity of `VALIDATE_SPEC` tasks, in entities
    pub chunk_size: usize,
    pub stream: StreamConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            chunk_size: 500,
            stream: StreamConfig::default(),
        }
    }
}

/// Progress notifications of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Parse(ParseProgress),
    Validation {
        specification: String,
        processed: usize,
        total: usize,
    },
    SpecificationDone {
        identifier: String,
        name: String,
        status: Status,
        passed: usize,
        failed: usize,
    },
}

/// Outcome of a full run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: Status,
    pub specifications: Vec<SpecificationReport>,
    pub entity_count: usize,
    pub skipped_records: usize,
    pub parse_time_ms: u64,
    pub validation_time_ms: u64,
    pub total_time_ms: u64,
}

/// Drives one file through the pool
pub struct ValidationPipeline {
    pool: Arc<TaskPool>,
    config: PipelineConfig,
}

impl ValidationPipeline {
    pub fn new(pool: Arc<TaskPool>, config: PipelineConfig) -> Self {
        Self { pool, config }
    }

    /// Load specifications from JSON, then [`run`](Self::run)
    pub async fn run_json(
        &self,
        source: ParseSource,
        specifications: &str,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) -> Result<ValidationReport> {
        let specifications = load_specifications(specifications)?;
        self.run(source, specifications, events).await
    }

    pub async fn run(
        &self,
        source: ParseSource,
        specifications: Vec<Specification>,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) -> Result<ValidationReport> {
        let total_start = Instant::now();
        let emit = |event: PipelineEvent| {
            if let Some(events) = &events {
                let _ = events.send(event);
            }
        };

        // Parse on a unit, ahead of anything else queued
        let parse_start = Instant::now();
        let (progress_tx, progress_rx) = unbounded_channel();
        let handle = self.pool.submit_with_progress(
            TaskPayload::ParseFile {
                source,
                config: self.config.stream.clone(),
            },
            Priority::HIGH,
            progress_tx,
        );
        let task_id = handle.task_id();
        let forward = forward_progress(progress_rx, |progress| {
            if let ProgressUpdate::Parse(p) = progress.update {
                emit(PipelineEvent::Parse(p));
            }
        });
        let (parsed, ()) = future::join(handle, forward).await;
        let parsed = match parsed? {
            TaskOutput::Parsed(parsed) => parsed,
            other => {
                return Err(PoolError::UnexpectedOutput {
                    task_id,
                    expected: "PARSE_RESULT",
                    found: other.kind(),
                }
                .into())
            }
        };
        let parse_time_ms = parse_start.elapsed().as_millis() as u64;
        let skipped_records = parsed.skipped_count;

        let model = Arc::new(IfcModel::from_entities(parsed.entities));
        tracing::info!(
            entities = model.len(),
            skipped = skipped_records,
            time_ms = parse_time_ms,
            "Parsed model"
        );

        let validation_start = Instant::now();
        let specifications: Vec<Arc<Specification>> = specifications.into_iter().map(Arc::new).collect();
        let reports = if specifications.len() >= self.pool.size() {
            self.validate_per_specification(&model, &specifications, &emit).await?
        } else {
            self.validate_in_batches(&model, &specifications, &emit).await?
        };
        let validation_time_ms = validation_start.elapsed().as_millis() as u64;

        let status = Status::from_bool(reports.iter().all(|r| r.status.is_pass()));
        tracing::info!(
            specifications = reports.len(),
            status = ?status,
            time_ms = validation_time_ms,
            "Validation complete"
        );

        Ok(ValidationReport {
            status,
            specifications: reports,
            entity_count: model.len(),
            skipped_records,
            parse_time_ms,
            validation_time_ms,
            total_time_ms: total_start.elapsed().as_millis() as u64,
        })
    }

    /// One `VALIDATE_SPEC` task per specification
    async fn validate_per_specification(
        &self,
        model: &Arc<IfcModel>,
        specifications: &[Arc<Specification>],
        emit: &impl Fn(PipelineEvent),
    ) -> Result<Vec<SpecificationReport>> {
        let (progress_tx, progress_rx) = unbounded_channel();
        let mut names: FxHashMap<u64, &str> = FxHashMap::default();
        let mut running = FuturesUnordered::new();

        for (index, spec) in specifications.iter().enumerate() {
            let handle = self.pool.submit_with_progress(
                TaskPayload::ValidateSpec {
                    model: Arc::clone(model),
                    specification: Arc::clone(spec),
                    chunk_size: self.config.chunk_size,
                },
                Priority::NORMAL,
                progress_tx.clone(),
            );
            names.insert(handle.task_id(), spec.name.as_str());
            running.push(async move { (index, handle.task_id(), handle.await) });
        }
        drop(progress_tx);

        let forward = forward_progress(progress_rx, |progress| {
            if let (ProgressUpdate::Validation { processed, total }, Some(name)) =
                (progress.update, names.get(&progress.task_id))
            {
                emit(PipelineEvent::Validation {
                    specification: name.to_string(),
                    processed,
                    total,
                });
            }
        });

        let collect = async {
            let mut reports: Vec<Option<SpecificationReport>> = vec![None; specifications.len()];
            while let Some((index, task_id, result)) = running.next().await {
                let batch = match result? {
                    TaskOutput::Spec(batch) => batch,
                    other => {
                        return Err(PoolError::UnexpectedOutput {
                            task_id,
                            expected: "SPEC_RESULT",
                            found: other.kind(),
                        })
                    }
                };
                let report = SpecificationReport::from_batches(&specifications[index], vec![batch]);
                emit(done_event(&report));
                reports[index] = Some(report);
            }
            Ok::<_, PoolError>(reports.into_iter().flatten().collect::<Vec<_>>())
        };

        let (reports, ()) = future::join(collect, forward).await;
        Ok(reports?)
    }

    /// Split every specification into `VALIDATE_BATCH` tasks
    async fn validate_in_batches(
        &self,
        model: &Arc<IfcModel>,
        specifications: &[Arc<Specification>],
        emit: &impl Fn(PipelineEvent),
    ) -> Result<Vec<SpecificationReport>> {
        let total = model.len();
        let batch_size = self.config.batch_size.max(1);
        let mut running = FuturesUnordered::new();
        let mut outstanding = vec![0usize; specifications.len()];

        for (index, spec) in specifications.iter().enumerate() {
            for start in (0..total).step_by(batch_size) {
                let end = (start + batch_size).min(total);
                let handle = self.pool.submit(
                    TaskPayload::ValidateBatch {
                        model: Arc::clone(model),
                        specification: Arc::clone(spec),
                        start_index: start,
                        end_index: end,
                    },
                    Priority::NORMAL,
                );
                outstanding[index] += 1;
                running.push(async move { (index, handle.task_id(), handle.await) });
            }
        }
        tracing::debug!(
            specifications = specifications.len(),
            tasks = running.len(),
            batch_size,
            "Submitted validation batches"
        );

        let mut batches: Vec<Vec<BatchValidationResult>> = vec![Vec::new(); specifications.len()];
        let mut processed = vec![0usize; specifications.len()];
        let mut reports: Vec<Option<SpecificationReport>> = vec![None; specifications.len()];

        // Specifications with nothing to validate are complete immediately
        for (index, spec) in specifications.iter().enumerate() {
            if outstanding[index] == 0 {
                let report = SpecificationReport::from_batches(spec, Vec::new());
                emit(done_event(&report));
                reports[index] = Some(report);
            }
        }

        while let Some((index, task_id, result)) = running.next().await {
            let batch = match result? {
                TaskOutput::Batch(batch) => batch,
                other => {
                    return Err(PoolError::UnexpectedOutput {
                        task_id,
                        expected: "BATCH_RESULT",
                        found: other.kind(),
                    }
                    .into())
                }
            };

            let spec = &specifications[index];
            processed[index] += batch.entity_count;
            emit(PipelineEvent::Validation {
                specification: spec.name.clone(),
                processed: processed[index],
                total,
            });

            batches[index].push(batch);
            outstanding[index] -= 1;
            if outstanding[index] == 0 {
                let report = SpecificationReport::from_batches(spec, std::mem::take(&mut batches[index]));
                emit(done_event(&report));
                reports[index] = Some(report);
            }
        }

        Ok(reports.into_iter().flatten().collect())
    }
}

fn done_event(report: &SpecificationReport) -> PipelineEvent {
    PipelineEvent::SpecificationDone {
        identifier: report.identifier.clone(),
        name: report.name.clone(),
        status: report.status,
        passed: report.passed,
        failed: report.failed,
    }
}

/// Drain a progress channel until every sender is gone
async fn forward_progress(mut progress: UnboundedReceiver<TaskProgress>, mut on_progress: impl FnMut(TaskProgress)) {
    while let Some(update) = progress.recv().await {
        on_progress(update);
    }
}
