//! Emusync Template
//!
//! Evaluator for AppSync-style mapping templates: a restricted Velocity
//! dialect with the `$util` helper namespace.
//!
//! The main entry point is [`Evaluator::evaluate`], which renders a template
//! against an `InvocationContext` and interprets the output as JSON. Parsed
//! templates are cached in a [`TemplateCache`] keyed by their source text.
//!
//! Template values (lists and maps with Java reference semantics) live only
//! for the duration of one synchronous `evaluate` call; inputs and outputs
//! are plain `serde_json` values.

mod ast;
mod cache;
mod error;
mod evaluator;
mod interpreter;
mod methods;
mod output;
mod parser;
mod util;
mod value;

pub use cache::{Template, TemplateCache};
pub use error::{MAPPING_TEMPLATE_ERROR_TYPE, RaisedError, TemplateError};
pub use evaluator::{Clock, Evaluator, Rendered, TemplateOutcome};
pub use util::{UNAUTHORIZED_ERROR_TYPE, VALIDATION_ERROR_TYPE};
