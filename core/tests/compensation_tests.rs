// tests/compensation_tests.rs
mod common;

use common::*;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, SkipCondition};
use std::sync::Arc;
use serial_test::serial;

fn three_step_pipeline() -> Pipeline<TestContext, TestError> {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("reserve", false, None),
    ("persist", false, None),
    ("notify", false, None),
  ]);
  pipeline.on_root("reserve", create_simple_handler("reserve", "r"));
  pipeline.on_root("persist", create_simple_handler("persist", "p"));
  pipeline.compensate_with("reserve", create_recording_compensator("reserve"));
  pipeline.compensate_with("persist", create_recording_compensator("persist"));
  pipeline
}

#[tokio::test]
#[serial]
async fn test_failure_runs_compensators_in_reverse_order() {
  setup_tracing();
  let mut pipeline = three_step_pipeline();
  pipeline.on_root("notify", create_failing_handler("notify", "smtp down"));

  let ctx = ContextData::new(TestContext::default());
  let err = pipeline.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Handler("smtp down".to_string()));
  assert_eq!(ctx.read().compensated, vec!["persist", "reserve"]);
}

#[tokio::test]
#[serial]
async fn test_failing_step_compensates_its_partial_work() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("first", false, None), ("partial", false, None)]);
  pipeline.on_root("first", create_simple_handler("first", "1"));
  pipeline.on_root("partial", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().counter += 100;
      Err::<PipelineControl, _>(TestError::Handler("half-way".to_string()))
    })
  });
  pipeline.compensate_with("partial", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter -= 100;
      guard.compensated.push("partial".to_string());
      Ok::<(), TestError>(())
    })
  });
  pipeline.compensate_with("first", create_recording_compensator("first"));

  let ctx = ContextData::new(TestContext::default());
  assert!(pipeline.run(ctx.clone()).await.is_err());

  let guard = ctx.read();
  assert_eq!(guard.counter, 1);
  assert_eq!(guard.compensated, vec!["partial", "first"]);
}

#[tokio::test]
#[serial]
async fn test_compensator_failure_does_not_stop_others() {
  setup_tracing();
  let mut pipeline = three_step_pipeline();
  pipeline.compensate_with("persist", |_ctx: ContextData<TestContext>| {
    Box::pin(async move { Err::<(), _>(TestError::Handler("undo failed".to_string())) })
  });
  pipeline.on_root("notify", create_failing_handler("notify", "boom"));

  let ctx = ContextData::new(TestContext::default());
  let err = pipeline.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Handler("boom".to_string()));
  assert_eq!(ctx.read().compensated, vec!["reserve"]);
}

#[tokio::test]
#[serial]
async fn test_skipped_steps_are_not_compensated() {
  setup_tracing();
  let mut pipeline = three_step_pipeline();
  let always: SkipCondition<TestContext> = Arc::new(|_ctx: ContextData<TestContext>| true);
  pipeline.set_skip_condition("persist", Some(always));
  pipeline.on_root("notify", create_failing_handler("notify", "boom"));

  let ctx = ContextData::new(TestContext::default());
  assert!(pipeline.run(ctx.clone()).await.is_err());
  assert_eq!(ctx.read().compensated, vec!["reserve"]);
}

#[tokio::test]
#[serial]
async fn test_success_runs_no_compensators() {
  setup_tracing();
  let mut pipeline = three_step_pipeline();
  pipeline.on_root("notify", create_simple_handler("notify", "n"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert!(ctx.read().compensated.is_empty());
  assert_eq!(ctx.read().message, "rpn");
}
