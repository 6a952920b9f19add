// tests/registry_tests.rs
mod common;

use common::*;
use farmgate_flow::{ContextData, FlowError, Pipeline, PipelineControl, PipelineResult, Registry};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct RegistryContextAlpha {
  val: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct RegistryContextBeta {
  num: i32,
}

#[tokio::test]
async fn test_registry_run_correct_pipeline() {
  setup_tracing();
  let registry = Registry::<TestError>::new();

  let mut p_alpha = Pipeline::<RegistryContextAlpha, TestError>::new(&[("alpha_task", false, None)]);
  p_alpha.on_root("alpha_task", |ctx: ContextData<RegistryContextAlpha>| {
    Box::pin(async move {
      ctx.write().val = "alpha_processed".to_string();
      Ok::<PipelineControl, FlowError>(PipelineControl::Continue)
    })
  });
  registry.register_pipeline(p_alpha);

  let mut p_beta = Pipeline::<RegistryContextBeta, TestError>::new(&[("beta_task", false, None)]);
  p_beta.on_root("beta_task", |ctx: ContextData<RegistryContextBeta>| {
    Box::pin(async move {
      ctx.write().num = 100;
      Ok::<PipelineControl, FlowError>(PipelineControl::Continue)
    })
  });
  registry.register_pipeline(p_beta);

  assert!(registry.contains::<RegistryContextAlpha>());
  assert!(registry.contains::<RegistryContextBeta>());

  let ctx_alpha = ContextData::new(RegistryContextAlpha::default());
  assert_eq!(registry.run(ctx_alpha.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx_alpha.read().val, "alpha_processed");

  let ctx_beta = ContextData::new(RegistryContextBeta::default());
  assert_eq!(registry.run(ctx_beta.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx_beta.read().num, 100);
}

#[tokio::test]
async fn test_registry_unregistered_context_is_configuration_error() {
  setup_tracing();
  let registry = Registry::<TestError>::new();
  let err = registry
    .run(ContextData::new(RegistryContextAlpha::default()))
    .await
    .unwrap_err();
  match err {
    TestError::Flow(s) => assert!(s.contains("ConfigurationError")),
    other => panic!("Expected configuration error, got {:?}", other),
  }
}

#[tokio::test]
async fn test_registry_propagates_handler_error() {
  setup_tracing();
  let registry = Registry::<TestError>::default();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("fail", false, None)]);
  pipeline.on_root("fail", create_failing_handler("fail", "nope"));
  registry.register_pipeline(pipeline);

  let err = registry.run(ContextData::new(TestContext::default())).await.unwrap_err();
  assert_eq!(err, TestError::Handler("nope".to_string()));
}
