// core/src/core/context.rs

//! Handler and compensator signatures for pipeline steps.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every handler and compensator.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A step handler.
///
/// Receives a clone of the shared context handle and resolves to a
/// `PipelineControl` or the pipeline's error type. Lock guards taken on the
/// context must be dropped before the handler awaits anything.
pub type Handler<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> BoxFuture<Result<PipelineControl, Err>> + Send + Sync>;

/// Undo action for a step, run when that step or a later one fails.
///
/// Compensators run in reverse step order. Their own failures are logged and
/// do not prevent the remaining compensators from running.
pub type Compensator<TData, Err> = Box<dyn Fn(ContextData<TData>) -> BoxFuture<Result<(), Err>> + Send + Sync>;
