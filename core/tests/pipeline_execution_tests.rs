// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use farmgate_flow::{ContextData, FlowError, Pipeline, PipelineControl, PipelineResult, SkipCondition};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn test_pipeline_runs_steps_in_order() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("step1", false, None), ("step2", false, None), ("step3", false, None)]);

  pipeline.on_root("step1", create_simple_handler("step1", " S1"));
  pipeline.on_root("step2", create_simple_handler("step2", " S2"));
  pipeline.on_root("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " S1 S2 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_run_in_phase_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("only", false, None)]);
  pipeline.after_root("only", create_simple_handler("after", "c"));
  pipeline.on_root("only", create_simple_handler("on", "b"));
  pipeline.before_root("only", create_simple_handler("before", "a"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  assert_eq!(ctx.read().message, "abc");
  assert_eq!(ctx.read().steps_executed, vec!["before", "on", "after"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_stops_on_pipeline_control_stop() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("stepA", false, None),
    ("stopStep", false, None),
    ("stepC", false, None),
  ]);

  pipeline.on_root("stepA", create_simple_handler("stepA", "A"));
  pipeline.on_root("stopStep", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push("stopStep".to_string());
      Ok::<PipelineControl, FlowError>(PipelineControl::Stop)
    })
  });
  pipeline.on_root("stepC", create_simple_handler("stepC", "C"));
  pipeline.compensate_with("stepA", create_recording_compensator("stepA"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  let guard = ctx.read();
  assert_eq!(guard.message, "A");
  assert_eq!(guard.steps_executed, vec!["stepA", "stopStep"]);
  assert!(guard.compensated.is_empty(), "a stop is not a failure");
}

#[tokio::test]
#[serial]
async fn test_pipeline_propagates_handler_error() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("good_step", false, None),
    ("bad_step", false, None),
    ("another_step", false, None),
  ]);

  pipeline.on_root("good_step", create_simple_handler("good_step", "Good"));
  pipeline.on_root("bad_step", create_failing_handler("bad_step", "I am a bad step!"));
  pipeline.on_root("another_step", create_simple_handler("another_step", "NeverRun"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("I am a bad step!".to_string()));
  assert_eq!(ctx.read().steps_executed, vec!["good_step", "bad_step"]);
}

#[tokio::test]
#[serial]
async fn test_skip_condition_and_optional_steps() {
  setup_tracing();
  let skip_when_flagged: SkipCondition<TestContext> = Arc::new(|ctx: ContextData<TestContext>| ctx.read().message.contains("skip"));
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("mark", false, None),
    ("maybe", false, Some(skip_when_flagged)),
    ("empty_optional", true, None),
    ("last", false, None),
  ]);
  pipeline.on_root("mark", create_simple_handler("mark", "skip"));
  pipeline.on_root("maybe", create_simple_handler("maybe", "!"));
  pipeline.on_root("last", create_simple_handler("last", "."));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["mark", "last"]);
}

#[tokio::test]
#[serial]
async fn test_structural_edits() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("a", false, None), ("c", false, None)]);
  pipeline.insert_after_step("a", "b", false, None);
  pipeline.insert_before_step("a", "start", true, None);
  assert_eq!(pipeline.step_names(), vec!["start", "a", "b", "c"]);

  pipeline.on_root("c", create_simple_handler("c", "c"));
  pipeline.compensate_with("c", create_recording_compensator("c"));
  assert!(pipeline.has_compensator("c"));
  pipeline.remove_step("c");
  assert_eq!(pipeline.step_names(), vec!["start", "a", "b"]);
  assert!(!pipeline.has_compensator("c"));
}

#[test]
#[should_panic(expected = "is not defined")]
fn test_registering_on_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("a", false, None)]);
  pipeline.on_root("typo", create_simple_handler("typo", ""));
}
