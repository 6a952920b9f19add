// tests/context_management_tests.rs
mod common;

use common::*;
use farmgate_flow::{ContextData, FlowError, Pipeline, PipelineControl};
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_context_data_is_shared_and_modified() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("step1_modify", false, None), ("step2_read_modify", false, None)]);

  pipeline.on_root("step1_modify", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter = 10;
      guard.message = "SetByStep1".to_string();
      Ok::<PipelineControl, FlowError>(PipelineControl::Continue)
    })
  });

  pipeline.on_root("step2_read_modify", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      assert_eq!(guard.counter, 10);
      guard.counter += 5;
      guard.message.push_str("_ThenStep2");
      Ok::<PipelineControl, FlowError>(PipelineControl::Continue)
    })
  });

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  let guard = ctx.read();
  assert_eq!(guard.counter, 15);
  assert_eq!(guard.message, "SetByStep1_ThenStep2");
}

#[tokio::test]
#[serial]
async fn test_guard_released_before_await() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("slow", false, None)]);
  pipeline.on_root("slow", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let before = ctx.read().counter;
      tokio::time::sleep(Duration::from_millis(5)).await;
      ctx.write().counter = before + 1;
      Ok::<PipelineControl, TestError>(PipelineControl::Continue)
    })
  });

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(*ctx.map_read(|c| &c.counter), 1);
}

#[test]
fn test_into_inner_returns_value() {
  let ctx = ContextData::new(TestContext {
    counter: 7,
    ..Default::default()
  });
  let other = ctx.clone();
  assert_eq!(other.into_inner().counter, 7);
  assert_eq!(ctx.into_inner().counter, 7);
}
