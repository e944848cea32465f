use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while binding an API definition.
#[derive(Debug, Error)]
pub enum BindError {
  /// A resolver or function names a data source that is not defined.
  #[error("{owner} references unknown data source '{data_source}'")]
  UnknownDataSource { owner: String, data_source: String },

  /// A pipeline resolver names a function that is not defined.
  #[error("{owner} references unknown function '{function}'")]
  UnknownFunction { owner: String, function: String },

  /// A unit resolver without a data source.
  #[error("unit resolver {owner} has no data source")]
  MissingDataSource { owner: String },

  /// A pipeline resolver with an empty function list.
  #[error("pipeline resolver {owner} has no functions")]
  EmptyPipeline { owner: String },

  /// Two functions share a name.
  #[error("duplicate function: {name}")]
  DuplicateFunction { name: String },

  /// A template file could not be read.
  #[error("failed to read template {path}: {source}")]
  Template {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Duplicate data source or resolver.
  #[error(transparent)]
  Api(#[from] emusync_api::ApiError),
}
