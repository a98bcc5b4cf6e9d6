//! Worker processes driven through `/bin/sh`
#![cfg(unix)]

use carto_render::{
    Category, OrchestratorConfig, RenderError, TaskDescriptor, TaskOrchestrator, WorkerCommand,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn shell(script: &str) -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_worker(WorkerCommand::new("/bin/sh", ["-c", script]))
        .with_termination_grace(Duration::from_secs(5))
}

#[tokio::test]
async fn process_result_line_is_returned() {
    let orch = TaskOrchestrator::new(shell(
        r#"cat >/dev/null; echo "starting" >&2; echo '{"status":"success","artifact":{"html":"<div/>"}}'"#,
    ));
    let outcome = orch.submit(TaskDescriptor::new(Category::CODE, json!({"code": ""}))).await.unwrap();
    assert_eq!(*outcome.artifact, json!({"html": "<div/>"}));
}

#[tokio::test]
async fn process_reads_its_task() {
    // Echo the descriptor back inside the artifact
    let orch = TaskOrchestrator::new(shell(
        r#"task=$(cat); printf '{"status":"success","artifact":%s}\n' "$task""#,
    ));
    let task = TaskDescriptor::new(Category::BUILDER, json!({"elements": []}));
    let outcome = orch.submit(task).await.unwrap();
    assert_eq!(outcome.artifact["category"], json!("builder"));
    assert_eq!(outcome.artifact["payload"], json!({"elements": []}));
}

#[tokio::test]
async fn process_failure_message_is_reported() {
    let orch = TaskOrchestrator::new(shell(r#"cat >/dev/null; echo '{"status":"failure","reason":"bad code"}'"#));
    let err = orch.submit(TaskDescriptor::new(Category::CODE, json!(1))).await.unwrap_err();
    assert!(matches!(err, RenderError::Failed { reason, .. } if reason == "bad code"));
}

#[tokio::test]
async fn process_dying_silently_is_a_failure() {
    let orch = TaskOrchestrator::new(shell("exit 3"));
    let err = orch.submit(TaskDescriptor::new(Category::CODE, json!(1))).await.unwrap_err();
    match err {
        RenderError::Failed { reason, .. } => assert!(reason.contains("without a result"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn hung_process_is_killed_on_timeout() {
    let config = shell("exec sleep 30").with_render_timeout(Duration::from_millis(300));
    let orch = TaskOrchestrator::new(config);
    let started = Instant::now();

    let err = orch.submit(TaskDescriptor::new(Category::PICKER, json!(1))).await.unwrap_err();
    assert!(matches!(err, RenderError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(orch.stats().termination_failures, 0);
}

#[tokio::test]
async fn stop_kills_running_process() {
    let orch = Arc::new(TaskOrchestrator::new(shell("exec sleep 30")));
    let picker = Category::new(Category::PICKER);

    let pending = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(TaskDescriptor::new(Category::PICKER, json!(1))).await })
    };
    while !orch.is_running(&picker).await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(orch.stop(&picker).await.unwrap());
    let result = tokio::time::timeout(Duration::from_secs(10), pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(RenderError::Cancelled { .. })));
}
