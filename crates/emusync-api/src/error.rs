use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("duplicate data source: {0}")]
  DuplicateDataSource(String),

  #[error("duplicate resolver for {type_name}.{field_name}")]
  DuplicateResolver {
    type_name: String,
    field_name: String,
  },
}
