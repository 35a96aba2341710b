// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Execution unit
//!
//! Each unit is a dedicated thread that runs one task at a time, in dispatch
//! order, and owns its own [`RegexCache`]. A failing or panicking task turns
//! into an `ERROR` response for that task only; the unit keeps serving.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};

use ifc_ids_core::{EntityReader, ParsedFile, StreamConfig, StreamingParser};
use ifc_ids_validation::{RegexCache, ValidationEngine};

use crate::protocol::{ParseSource, ProgressUpdate, Request, Response, ResponseBody, TaskPayload};

/// Unit main loop; returns once the request channel is closed
pub(crate) fn run_unit(unit: usize, requests: Receiver<Request>, responses: Sender<Response>) {
    serve(unit, requests, responses, execute);
}

fn serve<H>(unit: usize, requests: Receiver<Request>, responses: Sender<Response>, mut handler: H)
where
    H: FnMut(TaskPayload, &mut RegexCache, &dyn Fn(ProgressUpdate)) -> ResponseBody,
{
    let mut cache = RegexCache::new();

    if responses
        .send(Response {
            task_id: 0,
            unit,
            body: ResponseBody::Ready,
        })
        .is_err()
    {
        return;
    }
    tracing::debug!(unit, "Execution unit ready");

    while let Ok(Request { task_id, payload }) = requests.recv() {
        let kind = payload.kind();
        let progress = |update: ProgressUpdate| {
            let _ = responses.send(Response {
                task_id,
                unit,
                body: ResponseBody::Progress(update),
            });
        };

        let body = match guarded(|| handler(payload, &mut cache, &progress as &dyn Fn(ProgressUpdate))) {
            Ok(body) => body,
            Err(message) => {
                tracing::error!(unit, task_id, kind = %kind, error = %message, "Task panicked, resetting unit state");
                cache.clear();
                ResponseBody::Error { message }
            }
        };

        if responses.send(Response { task_id, unit, body }).is_err() {
            break;
        }
    }

    tracing::debug!(unit, "Execution unit stopped");
}

/// Run `f`, converting a panic into its message
pub(crate) fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| panic_message(panic.as_ref()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

fn execute(payload: TaskPayload, cache: &mut RegexCache, progress: &dyn Fn(ProgressUpdate)) -> ResponseBody {
    match payload {
        TaskPayload::ParseFile { source, config } => match parse(source, config, progress) {
            Ok(parsed) => ResponseBody::ParseResult(parsed),
            Err(message) => ResponseBody::Error { message },
        },

        TaskPayload::ValidateBatch {
            model,
            specification,
            start_index,
            end_index,
        } => {
            let Some(entities) = model.entities().get(start_index..end_index) else {
                return ResponseBody::Error {
                    message: format!(
                        "Batch {}..{} out of range for {} entities",
                        start_index,
                        end_index,
                        model.len()
                    ),
                };
            };
            let mut engine = ValidationEngine::new(&model, cache);
            ResponseBody::BatchResult(engine.validate_batch(entities, &specification, start_index))
        }

        TaskPayload::ValidateSpec {
            model,
            specification,
            chunk_size,
        } => {
            let mut engine = ValidationEngine::new(&model, cache);
            let result = engine.validate_spec(&specification, chunk_size, |processed, total| {
                progress(ProgressUpdate::Validation { processed, total })
            });
            ResponseBody::SpecResult(result)
        }

        TaskPayload::Ping => ResponseBody::Pong,
    }
}

fn parse(source: ParseSource, config: StreamConfig, progress: &dyn Fn(ProgressUpdate)) -> Result<ParsedFile, String> {
    let mut parsed = ParsedFile::default();

    match source {
        ParseSource::Path(path) => {
            let reader = EntityReader::open(&path, config)
                .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
            for event in reader {
                let event = event.map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
                if let Some(p) = parsed.absorb(event) {
                    progress(ProgressUpdate::Parse(p));
                }
            }
        }
        ParseSource::Bytes(bytes) => {
            let chunk_size = config.chunk_size.max(1);
            let mut config = config;
            config.total_bytes.get_or_insert(bytes.len() as u64);

            let mut parser = StreamingParser::new(config);
            for chunk in bytes.chunks(chunk_size) {
                for event in parser.feed(chunk) {
                    if let Some(p) = parsed.absorb(event) {
                        progress(ProgressUpdate::Parse(p));
                    }
                }
            }
            for event in parser.finish() {
                parsed.absorb(event);
            }
        }
    }

    tracing::debug!(
        entities = parsed.entities.len(),
        skipped = parsed.skipped_count,
        bytes = parsed.processed_bytes,
        "Parse task complete"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    use bytes::Bytes;
    use ifc_ids_core::{parse_bytes, IfcModel};
    use ifc_ids_validation::{Facet, Specification};

    const CONTENT: &str = "DATA;\n#1=IFCWALL('a',$,'A',$,$,$,$,$);\n#2=IFCSLAB('b',$,$,$,$,$,$,$);\nENDSEC;\n";

    fn spec() -> Arc<Specification> {
        Arc::new(Specification {
            identifier: "S".to_string(),
            name: "Named walls".to_string(),
            description: None,
            cardinality: Default::default(),
            applicability: vec![Facet::entity("IFCWALL")],
            requirements: vec![Facet::attribute("Name")],
        })
    }

    fn model() -> Arc<IfcModel> {
        Arc::new(IfcModel::from_entities(
            parse_bytes(CONTENT.as_bytes(), StreamConfig::default()).entities,
        ))
    }

    #[test]
    fn test_guarded_catches_panics() {
        assert_eq!(guarded(|| 7), Ok(7));
        let err = guarded(|| -> u32 { panic!("unit fault") }).unwrap_err();
        assert!(err.contains("unit fault"));
    }

    #[test]
    fn test_parse_bytes_reports_progress() {
        let updates = std::cell::RefCell::new(Vec::new());
        let config = StreamConfig {
            chunk_size: 16,
            ..StreamConfig::default()
        };
        let parsed = parse(
            ParseSource::Bytes(Bytes::from_static(CONTENT.as_bytes())),
            config,
            &|u| updates.borrow_mut().push(u),
        )
        .unwrap();

        assert_eq!(parsed.entities.len(), 2);
        let updates = updates.into_inner();
        assert!(!updates.is_empty());
        match updates.last() {
            Some(ProgressUpdate::Parse(p)) => assert_eq!(p.total_bytes, Some(CONTENT.len() as u64)),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_an_error_response() {
        let mut cache = RegexCache::new();
        let body = execute(
            TaskPayload::ParseFile {
                source: ParseSource::Path("/nonexistent/model.ifc".into()),
                config: StreamConfig::default(),
            },
            &mut cache,
            &|_| {},
        );
        assert!(matches!(body, ResponseBody::Error { message } if message.contains("model.ifc")));
    }

    #[test]
    fn test_out_of_range_batch_is_an_error_response() {
        let mut cache = RegexCache::new();
        let body = execute(
            TaskPayload::ValidateBatch {
                model: model(),
                specification: spec(),
                start_index: 1,
                end_index: 5,
            },
            &mut cache,
            &|_| {},
        );
        assert!(matches!(body, ResponseBody::Error { .. }));
    }

    #[test]
    fn test_unit_loop() {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || run_unit(3, request_rx, response_tx));

        request_tx
            .send(Request {
                task_id: 1,
                payload: TaskPayload::ValidateSpec {
                    model: model(),
                    specification: spec(),
                    chunk_size: 1,
                },
            })
            .unwrap();
        request_tx.send(Request { task_id: 2, payload: TaskPayload::Ping }).unwrap();
        drop(request_tx);
        handle.join().unwrap();

        let responses: Vec<Response> = response_rx.iter().collect();
        let kinds: Vec<(u64, &str)> = responses.iter().map(|r| (r.task_id, r.body.kind())).collect();
        assert_eq!(
            kinds,
            vec![
                (0, "READY"),
                (1, "PROGRESS"),
                (1, "PROGRESS"),
                (1, "SPEC_RESULT"),
                (2, "PONG"),
            ]
        );
        assert!(responses.iter().all(|r| r.unit == 3));
        match &responses[3].body {
            ResponseBody::SpecResult(result) => assert_eq!((result.passed, result.failed), (1, 0)),
            other => panic!("unexpected body {:?}", other.kind()),
        }
    }

    #[test]
    fn test_panicking_task_resets_unit() {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            serve(7, request_rx, response_tx, |payload, cache, progress| {
                match payload {
                    TaskPayload::ValidateSpec { .. } => {
                        assert!(cache.matches("^T[0-9]+$", "", "T12"));
                        progress(ProgressUpdate::Validation { processed: 1, total: 2 });
                        panic!("corrupt model");
                    }
                    _ if cache.stats().entries > 0 => ResponseBody::Error {
                        message: "stale pattern cache".to_string(),
                    },
                    _ => ResponseBody::Pong,
                }
            })
        });

        request_tx
            .send(Request {
                task_id: 1,
                payload: TaskPayload::ValidateSpec {
                    model: model(),
                    specification: spec(),
                    chunk_size: 1,
                },
            })
            .unwrap();
        request_tx.send(Request { task_id: 2, payload: TaskPayload::Ping }).unwrap();
        drop(request_tx);
        handle.join().unwrap();

        let responses: Vec<Response> = response_rx.iter().collect();
        let kinds: Vec<(u64, &str)> = responses.iter().map(|r| (r.task_id, r.body.kind())).collect();
        assert_eq!(kinds, vec![(0, "READY"), (1, "PROGRESS"), (1, "ERROR"), (2, "PONG")]);
        match &responses[2].body {
            ResponseBody::Error { message } => assert!(message.contains("corrupt model")),
            other => panic!("unexpected body {:?}", other.kind()),
        }
    }
}
