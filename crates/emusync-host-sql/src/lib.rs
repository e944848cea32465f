//! Relational host capability for emusync data sources.
//!
//! Executes resolver requests of the form
//! `{statements: [...], variableMap: {":name": value}}` against SQLite through
//! sqlx and returns results in the `sqlStatementResults` shape that
//! `$util.rds.toJsonObject` understands.

mod backend;
mod bind;
mod error;

pub use backend::SqlBackend;
pub use error::SqlError;
