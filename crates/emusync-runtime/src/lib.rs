//! Emusync Runtime
//!
//! This crate resolves fields. A [`Runtime`] owns the template [`Evaluator`]
//! and the data source [`Dispatcher`], and runs a bound resolver definition
//! against one [`FieldRequest`]:
//!
//! ```text
//! INIT → BEFORE_MAPPING → (REQUEST_MAPPING → DISPATCH → RESPONSE_MAPPING)* → AFTER_MAPPING → DONE
//! ```
//!
//! Any state can end in `ABORTED`. The outcome is normalized into an
//! [`InvocationResult`] carrying `data` and AppSync-shaped `errors`.
//!
//! [`Evaluator`]: emusync_template::Evaluator
//! [`Dispatcher`]: emusync_datasource::Dispatcher
//! [`FieldRequest`]: emusync_context::FieldRequest

mod error;
mod normalize;
mod pipeline;
mod runtime;

pub use error::RuntimeError;
pub use normalize::{ErrorLocation, GraphQLError, InvocationResult, normalize};
pub use pipeline::{PipelineOutcome, StageError};
pub use runtime::Runtime;
