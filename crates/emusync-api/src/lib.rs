//! Emusync Api
//!
//! This crate provides the bound API representation for emusync. A bound API
//! is the validated form of an `ApiDef` that is ready to execute.
//!
//! Key differences from `emusync-config`:
//! - Every data source and function reference is known to resolve
//! - Template text is loaded (no more file paths)
//! - Unit resolvers and pipeline resolvers share one shape: a list of
//!   [`FunctionUnit`]s, optionally framed by before/after templates
//! - Definitions are immutable and shared behind `Arc`

mod api;
mod data_source;
mod error;
mod resolver;

pub use api::{Api, FieldKey};
pub use data_source::{DataSourceConfig, DataSourceKind, DataSourceRef, DataSourceRegistry};
pub use error::ApiError;
pub use resolver::{FunctionUnit, ResolverDefinition, ResolverKind};
