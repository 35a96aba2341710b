// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Full parse → validate runs through the pool.

use std::sync::Arc;

use bytes::Bytes;
use ifc_ids_core::{parse_bytes, IfcModel, StreamConfig};
use ifc_ids_processing::{
    ParseSource, PipelineConfig, PipelineError, PipelineEvent, PoolConfig, PoolError, TaskPool, ValidationPipeline,
};
use ifc_ids_validation::{load_specifications, RegexCache, SpecificationReport, Status, ValidationEngine};
use tokio::sync::mpsc::unbounded_channel;

const FIRE_RATING: &str = r#"[{
    "identifier": "F1",
    "name": "Fire rating",
    "applicability": [{ "entity": { "name": "IFCWALL" } }],
    "requirements": [{ "property": { "propertySet": "Pset_WallCommon", "baseName": "FireRating" } }]
}, {
    "identifier": "N1",
    "name": "Named slabs",
    "cardinality": "optional",
    "applicability": [{ "entity": { "name": "IFCSLAB" } }],
    "requirements": [{ "attribute": { "name": "Name" } }]
}]"#;

/// Walls (every fourth rated) and slabs (every other one named)
fn building(walls: u32, slabs: u32) -> String {
    let mut content = String::from("ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n");
    content.push_str("#900000=IFCPROPERTYSET('p',$,'Pset_WallCommon',$,(#900001));\n");
    content.push_str("#900001=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('1HR'),$);\n");
    let mut rated = Vec::new();
    for id in 1..=walls {
        content.push_str(&format!("#{}=IFCWALL('w{}',$,$,$,$,$,$,$);\n", id, id));
        if id % 4 == 0 {
            rated.push(format!("#{}", id));
        }
    }
    for i in 0..slabs {
        let id = 100_000 + i;
        let name = if i % 2 == 0 { format!("'Slab {}'", i) } else { "$".to_string() };
        content.push_str(&format!("#{}=IFCSLAB('s{}',$,{},$,$,$,$,$,.FLOOR.);\n", id, id, name));
    }
    if !rated.is_empty() {
        content.push_str(&format!(
            "#900002=IFCRELDEFINESBYPROPERTIES('r',$,$,$,({}),#900000);\n",
            rated.join(",")
        ));
    }
    content.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    content
}

fn sequential_reports(content: &str, ids: &str) -> Vec<SpecificationReport> {
    let model = IfcModel::from_entities(parse_bytes(content.as_bytes(), StreamConfig::default()).entities);
    let mut cache = RegexCache::new();
    let mut engine = ValidationEngine::new(&model, &mut cache);
    load_specifications(ids)
        .unwrap()
        .iter()
        .map(|spec| SpecificationReport::from_batches(spec, vec![engine.validate_batch(model.entities(), spec, 0)]))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batched_run_matches_sequential() {
    let content = building(40, 15);
    let pool = Arc::new(TaskPool::new(PoolConfig { size: 4 }).unwrap());
    let config = PipelineConfig {
        batch_size: 7,
        ..PipelineConfig::default()
    };
    let pipeline = ValidationPipeline::new(pool, config);
    let (events_tx, mut events_rx) = unbounded_channel();

    let report = pipeline
        .run_json(ParseSource::Bytes(Bytes::from(content.clone())), FIRE_RATING, Some(events_tx))
        .await
        .unwrap();

    assert_eq!(report.specifications, sequential_reports(&content, FIRE_RATING));
    assert_eq!(report.entity_count, 58);
    assert_eq!(report.skipped_records, 0);

    let fire = &report.specifications[0];
    assert_eq!((fire.passed, fire.failed), (10, 30));
    assert_eq!(fire.status, Status::Fail);
    let slabs = &report.specifications[1];
    assert_eq!((slabs.passed, slabs.failed), (8, 7));
    assert_eq!(report.status, Status::Fail);

    let mut events = Vec::new();
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(PipelineEvent::Parse(_))));

    let fire_progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Validation {
                specification,
                processed,
                ..
            } if specification == "Fire rating" => Some(*processed),
            _ => None,
        })
        .collect();
    assert!(fire_progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(fire_progress.last(), Some(&58));

    let done: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::SpecificationDone { identifier, .. } => Some(identifier.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(done.len(), 2);
    assert!(done.contains(&"F1") && done.contains(&"N1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_task_per_specification() {
    let content = building(12, 4);
    let pool = Arc::new(TaskPool::new(PoolConfig { size: 1 }).unwrap());
    let config = PipelineConfig {
        chunk_size: 5,
        ..PipelineConfig::default()
    };
    let pipeline = ValidationPipeline::new(pool, config);
    let (events_tx, mut events_rx) = unbounded_channel();

    let report = pipeline
        .run_json(ParseSource::Bytes(Bytes::from(content.clone())), FIRE_RATING, Some(events_tx))
        .await
        .unwrap();
    assert_eq!(report.specifications, sequential_reports(&content, FIRE_RATING));
    let identifiers: Vec<&str> = report.specifications.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["F1", "N1"]);

    let mut slab_progress = Vec::new();
    while let Some(event) = events_rx.recv().await {
        if let PipelineEvent::Validation {
            specification,
            processed,
            total,
        } = event
        {
            assert_eq!(total, 19);
            if specification == "Named slabs" {
                slab_progress.push(processed);
            }
        }
    }
    assert_eq!(slab_progress, vec![5, 10, 15, 19]);
}

#[tokio::test]
async fn test_two_record_file() {
    let pool = Arc::new(TaskPool::new(PoolConfig { size: 2 }).unwrap());
    let pipeline = ValidationPipeline::new(pool, PipelineConfig::default());
    let content = "DATA;\n#1=IFCWALL('GUID',$,$,$,$,$,$,$);\n#2=IFCRELDEFINESBYPROPERTIES('r',$,$,$,(#1),#3);\nENDSEC;\n";
    let ids = r#"{ "name": "Walls have property sets",
                   "applicability": [{ "entity": { "name": "IFCWALL" } }],
                   "requirements": [{ "property": {} }] }"#;

    let report = pipeline
        .run_json(ParseSource::Bytes(Bytes::from_static(content.as_bytes())), ids, None)
        .await
        .unwrap();

    let spec = &report.specifications[0];
    assert_eq!(spec.results.len(), 1);
    assert_eq!(spec.results[0].entity_id, 1);
    assert_eq!(spec.results[0].status, Status::Pass);
    assert_eq!(report.status, Status::Pass);
}

#[tokio::test]
async fn test_failures_propagate() {
    let pool = Arc::new(TaskPool::new(PoolConfig { size: 1 }).unwrap());
    let pipeline = ValidationPipeline::new(Arc::clone(&pool), PipelineConfig::default());

    let missing = pipeline
        .run_json(ParseSource::Path("/nonexistent/model.ifc".into()), FIRE_RATING, None)
        .await;
    assert!(matches!(
        missing,
        Err(PipelineError::Pool(PoolError::TaskFailed { .. }))
    ));

    let bad_ids = pipeline
        .run_json(ParseSource::Bytes(Bytes::from_static(b"DATA;\nENDSEC;\n")), "{ not json", None)
        .await;
    assert!(matches!(bad_ids, Err(PipelineError::Specification(_))));

    pool.terminate();
    let terminated = pipeline
        .run_json(ParseSource::Bytes(Bytes::from_static(b"DATA;\nENDSEC;\n")), FIRE_RATING, None)
        .await;
    assert!(matches!(terminated, Err(PipelineError::Pool(PoolError::Terminated))));
}
