//! Emusync Data Source Dispatcher
//!
//! The [`Dispatcher`] takes a data source name and a rendered request and
//! returns a [`DispatchOutcome`]. It owns the registry of bound data sources and
//! one [`DataSourceBackend`] per kind:
//! - function sources run through `emusync-host-function`
//! - key-value tables through `emusync-host-kv`
//! - HTTP and search sources through `emusync-host-http`
//! - relational sources through `emusync-host-sql`
//! - `NONE` sources echo their payload back
//!
//! Concurrent `BatchInvoke` requests for the same function source and field
//! are sent together as one call.
//!
//! Every dispatch is bounded by a timeout and can be cancelled. Backend failures
//! never escape as Rust errors; they come back as [`DispatchError`] values with
//! the error type the client will see.

mod backend;
mod batch;
mod dispatcher;
mod error;
mod outcome;

pub use backend::{
  DataSourceBackend, FunctionBackend, HttpSourceBackend, KvTableBackend, NoneBackend,
  RelationalBackend,
};
pub use batch::{BATCH_RESULT_ERROR_TYPE, DEFAULT_BATCH_WINDOW};
pub use dispatcher::{DEFAULT_TIMEOUT, Dispatcher};
pub use error::BackendError;
pub use outcome::{
  DATA_SOURCE_NOT_FOUND_ERROR_TYPE, DispatchError, DispatchOutcome, INTERNAL_FAILURE_ERROR_TYPE,
  TIMEOUT_ERROR_TYPE,
};
