// core/src/pipeline/execution.rs

//! `Pipeline::run()`: executes steps in order and unwinds through the
//! registered compensators when a handler fails.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes the pipeline against the shared context `ctx_data`.
  ///
  /// For each step: the skip condition is evaluated first, then the `before`,
  /// `on` and `after` handlers run in registration order. A handler returning
  /// `PipelineControl::Stop` ends the run with `PipelineResult::Stopped`.
  ///
  /// When a handler fails, the compensators of the failing step and of every
  /// step that ran before it are invoked in reverse order, and the handler's
  /// error is returned. A compensator error is logged and does not prevent the
  /// remaining compensators from running.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    // Indices of steps whose handlers started, in execution order.
    let mut entered: Vec<usize> = Vec::with_capacity(self.steps.len());

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = span!(
        Level::INFO,
        "pipeline_step",
        step_name = step_name,
        step_index = step_idx,
        optional = step_def.optional
      );

      if let Some(skip_cond_fn) = &step_def.skip_if {
        if skip_cond_fn(ctx_data.clone()) {
          event!(parent: &step_span, Level::DEBUG, "Step skipped by condition.");
          continue;
        }
      }

      let has_handlers = [&self.before, &self.on, &self.after]
        .iter()
        .any(|table| table.get(step_name).map_or(false, |v| !v.is_empty()));

      if !has_handlers {
        if step_def.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Non-optional step has no handlers.");
        let err = Err::from(FlowError::HandlerMissing {
          step_name: step_def.name.clone(),
        });
        self.compensate(&entered, &ctx_data).await;
        return Err(err);
      }

      entered.push(step_idx);

      let outcome = async {
        for (phase, table) in [("before", &self.before), ("on", &self.on), ("after", &self.after)] {
          if let Some(handlers) = table.get(step_name) {
            if let PipelineControl::Stop = run_handlers(phase, handlers, &ctx_data).await? {
              return Ok(PipelineControl::Stop);
            }
          }
        }
        Ok::<_, Err>(PipelineControl::Continue)
      }
      .instrument(step_span)
      .await;

      match outcome {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => {
          event!(Level::INFO, step_name, "Pipeline stopped by handler.");
          return Ok(PipelineResult::Stopped);
        }
        Err(e) => {
          event!(Level::WARN, step_name, error = %e, "Step failed, compensating.");
          self.compensate(&entered, &ctx_data).await;
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }

  async fn compensate(&self, entered: &[usize], ctx_data: &ContextData<TData>) {
    for &step_idx in entered.iter().rev() {
      let step_name = self.steps[step_idx].name.as_str();
      if let Some(compensator) = self.compensators.get(step_name) {
        event!(Level::DEBUG, step_name, "Running compensator.");
        if let Err(e) = compensator(ctx_data.clone()).await {
          event!(Level::ERROR, step_name, error = %e, "Compensator failed.");
        }
      }
    }
  }
}

async fn run_handlers<TData, Err>(
  phase: &'static str,
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
) -> Result<PipelineControl, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + Send + Sync + 'static,
{
  for (handler_idx, handler_fn) in handlers.iter().enumerate() {
    let handler_span = span!(Level::DEBUG, "handler", phase, handler_index = handler_idx);
    match handler_fn(ctx_data.clone()).instrument(handler_span).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => return Ok(PipelineControl::Stop),
      Err(e) => {
        event!(Level::DEBUG, phase, handler_index = handler_idx, error = %e, "Handler failed.");
        return Err(e);
      }
    }
  }
  Ok(PipelineControl::Continue)
}
