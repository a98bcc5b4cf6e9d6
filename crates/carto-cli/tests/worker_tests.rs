//! The `carto worker` binary driven by the orchestrator

use carto_render::{
    Category, OrchestratorConfig, RenderError, TaskDescriptor, TaskOrchestrator, WorkerCommand,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn orchestrator() -> TaskOrchestrator {
    let worker = WorkerCommand::new(env!("CARGO_BIN_EXE_carto"), ["worker"]);
    TaskOrchestrator::new(
        OrchestratorConfig::new()
            .with_worker(worker)
            .with_render_timeout(Duration::from_secs(30)),
    )
}

#[tokio::test]
async fn code_task_renders_builder_elements() {
    let orch = orchestrator();
    let task = TaskDescriptor::new(
        Category::CODE,
        json!({"code": "import xatra\nxatra.Flag(label=\"Doab\", value=gadm(\"IND.31\") - (KURU | PANCALA))\n"}),
    );

    let outcome = orch.submit(task.clone()).await.unwrap();
    assert_eq!(
        outcome.artifact["elements"][0],
        json!({
            "type": "flag",
            "label": "Doab",
            "value": [
                {"op": "union", "type": "gadm", "value": "IND.31"},
                {"op": "difference", "type": "group", "value": [
                    {"op": "union", "type": "predefined", "value": "KURU"},
                    {"op": "union", "type": "predefined", "value": "PANCALA"},
                ]},
            ],
            "args": {},
        })
    );

    // Identical resubmission is answered without a worker
    let again = orch.submit(task).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(orch.stats().workers_spawned, 1);
}

#[tokio::test]
async fn builder_task_renders_code() {
    let orch = orchestrator();
    let task = TaskDescriptor::new(
        Category::BUILDER,
        json!({
            "elements": [{"type": "flag", "label": "India", "value": "IND"}],
        }),
    );
    let outcome = orch.submit(task).await.unwrap();
    assert_eq!(outcome.artifact["code"], json!("xatra.Flag(label=\"India\", value=gadm(\"IND\"))\n"));
}

#[tokio::test]
async fn renderer_failure_is_reported() {
    let orch = orchestrator();
    let err = orch
        .submit(TaskDescriptor::new(Category::CODE, json!({"code": "xatra.Flag(value=gadm(\"IND\"\n"})))
        .await
        .unwrap_err();
    match err {
        RenderError::Failed { reason, .. } => assert!(reason.contains("syntax error"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }

    let err = orch.submit(TaskDescriptor::new(Category::PICKER, json!({}))).await.unwrap_err();
    assert!(matches!(err, RenderError::Failed { .. }));
}
