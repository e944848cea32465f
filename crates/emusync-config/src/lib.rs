//! Emusync Config
//!
//! This crate contains the serializable API configuration types for emusync.
//! These types represent an API definition before it is bound: data sources,
//! pipeline functions and field resolvers, with templates still referenced by
//! path or given inline.
//!
//! Configuration is loaded from a JSON API definition file (via the CLI with
//! `emusync resolve api.json ...`). The binder takes these types, validates the
//! references between them and loads the templates to produce a bound `Api`.

mod api;
mod data_source;
mod error;
mod resolver;
mod template;

pub use api::{ApiDef, DEFAULT_MAPPING_TEMPLATES_LOCATION};
pub use data_source::{
  DataSourceDef, DataSourceKindDef, FunctionSourceConfig, FunctionTarget, HttpSourceConfig,
  KvTableConfig, RelationalSourceConfig, SearchSourceConfig,
};
pub use error::ConfigError;
pub use resolver::{FunctionDef, ResolverDef, ResolverKindDef};
pub use template::TemplateSource;
