// core/src/lib.rs

//! farmgate-flow: asynchronous step pipelines for request workflows.
//!
//! A pipeline is an ordered list of named steps. Each step can carry
//! `before`, `on` and `after` handlers, an optional skip condition and an
//! optional compensator. Handlers share one `ContextData<T>` and may stop the
//! run early. When a handler fails, the compensators of the failing step and
//! of every step before it run in reverse order before the error is returned,
//! so multi-record writes can be expressed as a saga.
//!
//! Typical use:
//!   1. Define a context struct for the workflow.
//!   2. Build a `Pipeline<Ctx, Err>` with its step list.
//!   3. Attach handlers with `on_root` (and `before_root` / `after_root`).
//!   4. Attach compensators to the steps that write state with `compensate_with`.
//!   5. Register the pipeline in a `Registry<Err>` and call `registry.run(ctx)`.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context::{Compensator, Handler};
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Registry;
