//! Function host capability for emusync.
//!
//! A function data source runs a handler with the resolver's event and returns
//! its JSON result. Two targets are supported:
//! - `process`: a command spawned per invocation, reading the event from stdin
//!   and writing the result to stdout
//! - `registered`: an in-process [`FunctionHandler`] registered on the
//!   [`FunctionInvoker`] under a name
//!
//! Failures of either kind become [`FunctionError`]s that carry the error type
//! the GraphQL client will see (`Lambda:Unhandled` unless the handler says otherwise).

mod error;
mod handler;
mod invoker;
mod process;

pub use error::{FunctionError, UNHANDLED_ERROR_TYPE};
pub use handler::{FunctionHandler, HandlerError, LambdaContext};
pub use invoker::FunctionInvoker;
