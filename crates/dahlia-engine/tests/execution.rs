mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::{EXPORT_URL, Harness, IMPORT_URL, fast_config, scenario};
use dahlia_config::{ConfigError, WorkflowDef};
use dahlia_engine::{
  ChannelNotifier, EngineError, ExecutionEvent, ExecutionStatus, OutputStatus, StepStatus,
  WorkerStatus,
};
use dahlia_runtime::{InstanceStatus, Runtime};
use dahlia_value::{Value, ValueKind};
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_create_execution_writes_pending_records() {
  let harness = Harness::new();
  let execution = harness.create("run-1").await;

  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Pending);
  assert_eq!(
    execution.step_statuses().await.unwrap(),
    vec![StepStatus::Pending; scenario().steps.len()]
  );

  let summary = execution.summary().await.unwrap();
  assert_eq!(summary.workers.len(), 2);
  assert!(summary
    .workers
    .iter()
    .all(|worker| worker.status == WorkerStatus::Pending && worker.url.is_none()));
  assert_eq!(summary.outputs.len(), 1);
  assert_eq!(summary.outputs[0].label, "Exported model");
  assert_eq!(summary.outputs[0].status, OutputStatus::Pending);
  assert_eq!(harness.read("run-1/arguments/dataset/kind").await, "url");
  assert_eq!(harness.read("run-1/arguments/epochs/value").await, "3");

  assert!(harness.runtime.get_application("run-1").await.unwrap().is_some());
  assert_eq!(harness.executor.names().await.unwrap(), vec!["run-1"]);

  assert!(matches!(
    harness
      .executor
      .create_execution(harness.request("run-1", scenario()))
      .await,
    Err(EngineError::ExecutionAlreadyExists(_))
  ));
  assert!(matches!(
    harness
      .executor
      .create_execution(harness.request("../escape", scenario()))
      .await,
    Err(EngineError::InvalidName(_))
  ));
}

#[tokio::test]
async fn test_incomplete_creation_is_replaced() {
  let harness = Harness::new();
  // A creation that died after its application and a few keys were written.
  harness
    .runtime
    .create_application("run-x", &json!({}))
    .await
    .unwrap();
  harness.write("run-x/application", "run-x").await;
  harness.write("run-x/steps/0/status", "completed").await;

  let execution = harness.create("run-x").await;
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Pending);
  assert_eq!(
    execution.step_statuses().await.unwrap(),
    vec![StepStatus::Pending; scenario().steps.len()]
  );
  assert!(harness.runtime.get_application("run-x").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_creation_removes_what_it_wrote() {
  let harness = Harness::new();
  let mut request = harness.request("run-f", scenario());
  request
    .context
    .insert("../outside".to_string(), Bytes::from_static(b"x"));

  assert!(matches!(
    harness.executor.create_execution(request).await,
    Err(EngineError::Storage(_))
  ));
  assert!(harness.executor.names().await.unwrap().is_empty());
  assert!(harness.runtime.get_application("run-f").await.unwrap().is_none());

  let execution = harness.create("run-f").await;
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Pending);
}

#[tokio::test]
async fn test_incomplete_execution_can_be_deleted() {
  let harness = Harness::new();
  harness.write("run-half/steps/0/status", "pending").await;
  assert!(execution_status_is_missing(&harness, "run-half").await);

  harness.executor.delete_execution("run-half").await.unwrap();
  assert!(harness.executor.names().await.unwrap().is_empty());
}

async fn execution_status_is_missing(harness: &Harness, name: &str) -> bool {
  let execution = harness.executor.execution(name).await.unwrap();
  matches!(execution.status().await, Err(EngineError::Stored(_)))
}

#[tokio::test]
async fn test_undeclared_parameter_fails_before_anything_is_created() {
  let harness = Harness::new();
  let mut workflow = scenario();
  workflow.steps[0].arguments.clear();
  workflow.steps[0].arguments.insert(
    "source".into(),
    json!({"type": "workflow-parameter", "name": "missing"}),
  );

  let result = harness
    .executor
    .create_execution(harness.request("run-b", workflow))
    .await;
  assert!(matches!(
    result,
    Err(EngineError::Config(ConfigError::UndeclaredParameter { name, .. })) if name == "missing"
  ));

  assert!(harness.runtime.get_application("run-b").await.unwrap().is_none());
  assert!(harness.executor.names().await.unwrap().is_empty());
  assert_eq!(harness.importer.request_count(), 0);
}

#[tokio::test]
async fn test_missing_argument_is_rejected() {
  let harness = Harness::new();
  let mut request = harness.request("run-m", scenario());
  request.arguments.clear();

  assert!(matches!(
    harness.executor.create_execution(request).await,
    Err(EngineError::MissingArgument(name)) if name == "dataset"
  ));
  assert!(harness.runtime.get_application("run-m").await.unwrap().is_none());
}

#[tokio::test]
async fn test_import_export_review_round_trip() {
  let (sender, mut receiver) = mpsc::unbounded_channel();
  let harness = Harness::new().with_notifier(Arc::new(ChannelNotifier::new(sender)));
  harness.exporter.state().polls_before_done = 2;
  let execution = harness.create("run-a").await;

  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Suspended);
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Suspended);
  assert_eq!(
    execution.step_statuses().await.unwrap(),
    vec![
      StepStatus::Completed,
      StepStatus::Completed,
      StepStatus::Suspended
    ]
  );
  assert_eq!(execution.current_step().await.unwrap(), Some(2));

  let import = harness.importer.last_request();
  assert_eq!(import.artifact_name, "dataset");
  assert_eq!(import.action, "create");
  assert_eq!(
    import.arguments["source"].url().unwrap().as_str(),
    "http://data.local/set.csv"
  );

  let export = harness.exporter.last_request();
  assert_eq!(export.action, "export");
  assert_eq!(export.arguments["input"].kind(), ValueKind::Url);
  assert_eq!(
    export.arguments["input"].url().unwrap().as_str(),
    "http://import.local:8000/artifacts/dataset/data/"
  );
  assert_eq!(
    export.arguments["epochs"].as_plain_object().await.unwrap(),
    json!(3)
  );

  let summary = execution.summary().await.unwrap();
  let result = &summary.outputs[0];
  assert_eq!(result.status, OutputStatus::Assigned);
  assert_eq!(result.worker.as_deref(), Some("exporter"));
  assert_eq!(result.artifact.as_deref(), Some("model"));
  let urls: Vec<_> = summary
    .workers
    .iter()
    .map(|worker| worker.url.as_ref().unwrap().to_string())
    .collect();
  assert_eq!(urls, vec![EXPORT_URL, IMPORT_URL]);

  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Completed);
  assert_eq!(
    execution.step_statuses().await.unwrap(),
    vec![StepStatus::Completed; 3]
  );
  assert_eq!(harness.importer.request_count(), 1);
  assert_eq!(harness.exporter.request_count(), 1);

  let application = harness.runtime.get_application("run-a").await.unwrap().unwrap();
  let instance = application
    .get_instance("worker-importer")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(instance.status().await.unwrap(), InstanceStatus::Stopped);

  let mut events = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    events.push(event);
  }
  let created = events
    .iter()
    .filter(|event| matches!(event, ExecutionEvent::WorkerCreated { .. }))
    .count();
  assert_eq!(created, 2);
  assert!(events.contains(&ExecutionEvent::ExecutionSuspended {
    execution: "run-a".into(),
    step: 2,
  }));
  assert_eq!(
    events.last(),
    Some(&ExecutionEvent::ExecutionCompleted {
      execution: "run-a".into()
    })
  );
}

#[tokio::test]
async fn test_execute_on_completed_execution_is_a_no_op() {
  let harness = Harness::new();
  let execution = harness.create("run-done").await;
  execution.execute().await.unwrap();
  execution.execute().await.unwrap();

  let before = execution.summary().await.unwrap();
  assert_eq!(before.status, ExecutionStatus::Completed);
  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Completed);

  let after = execution.summary().await.unwrap();
  let statuses = |summary: &dahlia_engine::ExecutionSummary| {
    summary.steps.iter().map(|step| step.status).collect::<Vec<_>>()
  };
  assert_eq!(after.status, ExecutionStatus::Completed);
  assert_eq!(statuses(&after), statuses(&before));
  assert_eq!(harness.importer.request_count(), 1);
  assert_eq!(harness.exporter.request_count(), 1);
}

#[tokio::test]
async fn test_restarted_process_resumes_after_last_completed_step() {
  let harness = Harness::new();
  let execution = harness.create("run-r").await;
  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Suspended);

  let reopened = harness.restarted().execution("run-r").await.unwrap();
  assert_eq!(reopened.execute().await.unwrap(), ExecutionStatus::Completed);
  assert_eq!(harness.importer.request_count(), 1);
  assert_eq!(harness.exporter.request_count(), 1);
}

#[tokio::test]
async fn test_restart_between_action_steps_runs_only_the_rest() {
  let harness = Harness::new();
  let execution = harness.create("run-k").await;
  execution.execute().await.unwrap();

  // As if the process died right after import completed.
  harness.write("run-k/status", "in-progress").await;
  harness.write("run-k/current_step", "0").await;
  harness.write("run-k/steps/1/status", "pending").await;
  harness.remove("run-k/steps/1/command_index").await;
  harness.write("run-k/steps/2/status", "pending").await;
  {
    let mut exporter = harness.exporter.state();
    exporter.requests.clear();
    exporter.artifacts.clear();
  }

  let reopened = harness.restarted().execution("run-k").await.unwrap();
  assert_eq!(reopened.execute().await.unwrap(), ExecutionStatus::Suspended);
  assert_eq!(
    reopened.step_statuses().await.unwrap(),
    vec![
      StepStatus::Completed,
      StepStatus::Completed,
      StepStatus::Suspended
    ]
  );
  assert_eq!(harness.importer.request_count(), 1);
  assert_eq!(harness.exporter.request_count(), 1);
  assert_eq!(
    harness.exporter.last_request().arguments["input"]
      .url()
      .unwrap()
      .as_str(),
    "http://import.local:8000/artifacts/dataset/data/"
  );
}

#[tokio::test]
async fn test_in_progress_step_is_not_sent_again() {
  let harness = Harness::new();
  let execution = harness.create("run-crash").await;
  execution.execute().await.unwrap();

  // As if the process died while polling the export.
  harness.write("run-crash/status", "in-progress").await;
  harness.write("run-crash/steps/1/status", "in-progress").await;
  harness.write("run-crash/steps/2/status", "pending").await;

  let reopened = harness.restarted().execution("run-crash").await.unwrap();
  assert_eq!(reopened.execute().await.unwrap(), ExecutionStatus::Suspended);
  assert_eq!(harness.exporter.request_count(), 1);

  // The remote artifact is gone this time, so it is created again.
  harness.write("run-crash/status", "in-progress").await;
  harness.write("run-crash/steps/1/status", "in-progress").await;
  harness.write("run-crash/steps/2/status", "pending").await;
  harness.exporter.state().artifacts.clear();

  assert_eq!(reopened.execute().await.unwrap(), ExecutionStatus::Suspended);
  assert_eq!(harness.exporter.request_count(), 2);
}

#[tokio::test]
async fn test_failed_action_fails_step_and_execution() {
  let harness = Harness::new();
  harness.exporter.state().failing.insert("model".into());
  let execution = harness.create("run-c").await;

  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Failed);
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Failed);
  assert_eq!(
    execution.step_statuses().await.unwrap(),
    vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]
  );

  let summary = execution.summary().await.unwrap();
  assert!(summary.steps[1].error.as_deref().unwrap().contains("failed"));
  assert_eq!(execution.step_log("export").await.unwrap(), "model command 0");

  assert!(matches!(
    execution.execute().await,
    Err(EngineError::InvalidState {
      status: ExecutionStatus::Failed,
      ..
    })
  ));
}

#[tokio::test]
async fn test_interrupt_is_forwarded_once() {
  let harness = Harness::new();
  harness.importer.state().polls_before_done = 3;
  let execution = harness.create("run-i").await;

  execution.request_interrupt().await.unwrap();
  assert_eq!(harness.read("run-i/interrupt_requested").await, "true");

  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Suspended);
  assert_eq!(harness.importer.state().interrupts, 1);
  assert_eq!(harness.exporter.state().interrupts, 0);
  assert_eq!(harness.read("run-i/interrupt_requested").await, "false");
}

#[tokio::test]
async fn test_poll_timeout_fails_the_step() {
  let mut config = fast_config();
  config.poll_timeout = Some(Duration::from_millis(10));
  let harness = Harness::with_config(config);
  harness.importer.state().polls_before_done = usize::MAX;
  let execution = harness.create("run-t").await;

  assert!(matches!(
    execution.execute().await,
    Err(EngineError::PollTimeout { artifact, .. }) if artifact == "dataset"
  ));
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Failed);
  assert_eq!(execution.step_statuses().await.unwrap()[0], StepStatus::Failed);
}

#[tokio::test]
async fn test_tool_that_never_comes_online() {
  let harness = Harness::new();
  harness.exporter.state().offline = true;
  let execution = harness.create("run-off").await;

  assert!(matches!(
    execution.execute().await,
    Err(EngineError::UnavailableTool { worker, .. }) if worker == "exporter"
  ));
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Failed);
  assert_eq!(
    execution.step_statuses().await.unwrap(),
    vec![StepStatus::Pending; 3]
  );
}

#[tokio::test]
async fn test_missing_instance_is_a_hard_failure() {
  let harness = Harness::new();
  let execution = harness.create("run-lost").await;
  execution.execute().await.unwrap();

  let application = harness
    .runtime
    .get_application("run-lost")
    .await
    .unwrap()
    .unwrap();
  application
    .get_instance("worker-importer")
    .await
    .unwrap()
    .unwrap()
    .delete()
    .await
    .unwrap();

  assert!(matches!(
    execution.execute().await,
    Err(EngineError::InstanceMissing(worker)) if worker == "importer"
  ));
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Failed);
}

#[tokio::test]
async fn test_source_addresses_resolve_to_the_cloned_instance() {
  let harness = Harness::new();
  harness.create("run-a").await.execute().await.unwrap();

  let workflow = WorkflowDef::from_yaml(
    r#"
workers:
  consumer:
    image: dahlia/import
steps:
  - name: consume
    worker: consumer
    artifact: copy
    arguments:
      source: source://previous/artifacts/model/data/
"#,
  )
  .unwrap();
  let mut request = harness.request("run-s", workflow);
  request.arguments.clear();
  request
    .sources
    .insert("previous".into(), "run-a:exporter".parse().unwrap());
  let execution = harness.executor.create_execution(request).await.unwrap();

  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Completed);
  let consume = harness.importer.last_request();
  assert_eq!(consume.artifact_name, "copy");
  assert_eq!(
    consume.arguments["source"].url().unwrap().as_str(),
    "http://export.local:8000/artifacts/model/data/"
  );

  let summary = execution.summary().await.unwrap();
  assert_eq!(summary.sources.len(), 1);
  assert_eq!(summary.sources[0].status, WorkerStatus::Created);
  assert_eq!(
    summary.sources[0].url.as_ref().unwrap().as_str(),
    EXPORT_URL
  );
}

#[tokio::test]
async fn test_typed_parameters_accept_source_addresses() {
  let harness = Harness::new();
  harness.create("run-a").await.execute().await.unwrap();

  let workflow = WorkflowDef::from_yaml(
    r#"
parameters:
  model:
    type: resource
    default: source://previous/artifacts/model/data/
  weights:
    type: archive
workers:
  consumer:
    image: dahlia/import
steps:
  - name: consume-model
    worker: consumer
    artifact: model-copy
    arguments:
      source:
        type: workflow-parameter
        name: model
  - name: consume-weights
    worker: consumer
    artifact: weights-copy
    arguments:
      source:
        type: workflow-parameter
        name: weights
"#,
  )
  .unwrap();
  let mut request = harness.request("run-typed", workflow);
  request.arguments.clear();
  request.arguments.insert(
    "weights".to_string(),
    Value::from("source://previous/artifacts/model/history/0/"),
  );
  request
    .sources
    .insert("previous".into(), "run-a:exporter".parse().unwrap());
  let execution = harness.executor.create_execution(request).await.unwrap();

  assert_eq!(execution.execute().await.unwrap(), ExecutionStatus::Completed);
  let requests = harness.importer.state().requests.clone();
  let sources: Vec<_> = requests
    .iter()
    .filter(|request| request.artifact_name.ends_with("-copy"))
    .map(|request| request.arguments["source"].url().unwrap().to_string())
    .collect();
  assert_eq!(
    sources,
    vec![
      "http://export.local:8000/artifacts/model/data/",
      "http://export.local:8000/artifacts/model/history/0/",
    ]
  );
}

#[tokio::test]
async fn test_unknown_source_fails_execution() {
  let harness = Harness::new();
  let mut request = harness.request("run-orphan-source", scenario());
  request
    .sources
    .insert("previous".into(), "nowhere:exporter".parse().unwrap());
  let execution = harness.executor.create_execution(request).await.unwrap();

  assert!(matches!(
    execution.execute().await,
    Err(EngineError::ExecutionNotFound(name)) if name == "nowhere"
  ));
}

#[tokio::test]
async fn test_delete_execution_removes_application() {
  let harness = Harness::new();
  harness.create("run-d").await;

  harness.executor.delete_execution("run-d").await.unwrap();
  assert!(harness.executor.names().await.unwrap().is_empty());
  assert!(harness.runtime.get_application("run-d").await.unwrap().is_none());
  assert!(matches!(
    harness.executor.execution("run-d").await,
    Err(EngineError::ExecutionNotFound(_))
  ));
}

#[tokio::test]
async fn test_orphaned_execution() {
  let harness = Harness::new();
  let execution = harness.create("run-o").await;
  harness
    .runtime
    .get_application("run-o")
    .await
    .unwrap()
    .unwrap()
    .delete()
    .await
    .unwrap();

  assert!(matches!(
    execution.execute().await,
    Err(EngineError::OrphanedExecution(_))
  ));
  assert_eq!(execution.status().await.unwrap(), ExecutionStatus::Pending);
}
