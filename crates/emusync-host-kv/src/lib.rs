//! Key-value table host capability for emusync.
//!
//! This crate provides:
//! - The [`KvBackend`] trait the dispatcher calls for key-value table data sources
//! - [`InMemoryTables`], a DynamoDB-style table store kept in process memory
//! - The attribute-value codec used to turn stored items back into plain JSON
//!
//! Requests use the resolver request shape (`GetItem`, `PutItem`, `UpdateItem`,
//! `DeleteItem`, `Query`, `Scan` and the batch operations) with typed attribute
//! values such as `{"S": "abc"}`.

mod codec;
mod error;
mod expression;
mod memory;

pub use codec::{unmarshal, unmarshal_item};
pub use error::KvError;
pub use memory::InMemoryTables;

use async_trait::async_trait;
use serde_json::Value;

/// Storage trait for key-value table data sources.
#[async_trait]
pub trait KvBackend: Send + Sync {
  /// Execute one resolver request against `table`.
  async fn execute(&self, table: &str, request: &Value) -> Result<Value, KvError>;
}
