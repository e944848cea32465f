//! Emusync Context
//!
//! The [`InvocationContext`] is the mutable state of one field resolution.
//! It is created fresh from a [`FieldRequest`], handed to every template of
//! every stage, and dropped when the field completes. Templates only ever
//! write back to the stash; the orchestrator owns `result`, `prev` and `error`.

mod auth;
mod context;
mod request;

pub use auth::AuthType;
pub use context::{ContextError, InvocationContext};
pub use request::{FieldInfo, FieldRequest, PathSegment};
