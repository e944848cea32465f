use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::KvBackend;
use crate::codec::{key_string, unmarshal_item};
use crate::error::KvError;
use crate::expression::{Condition, ExpressionDef, Update};

type Item = Map<String, Value>;

#[derive(Debug, Default)]
struct Table {
  /// Names of the key attributes, learned from the first keyed write.
  key_names: Vec<String>,
  items: BTreeMap<String, Item>,
}

impl Table {
  fn learn_key(&mut self, key: &Item) {
    if self.key_names.is_empty() {
      let mut names: Vec<String> = key.keys().cloned().collect();
      names.sort();
      self.key_names = names;
    }
  }

  fn key_of(&self, item: &Item) -> Result<Item, KvError> {
    if self.key_names.is_empty() {
      return Err(KvError::validation("table key schema is unknown"));
    }
    let mut key = Map::new();
    for name in &self.key_names {
      let value = item.get(name).ok_or_else(|| {
        KvError::validation(format!("One of the required keys was not given a value: {}", name))
      })?;
      key.insert(name.clone(), value.clone());
    }
    Ok(key)
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyedRequest {
  key: Item,
  #[serde(default)]
  attribute_values: Item,
  #[serde(default)]
  update: Option<ExpressionDef>,
  #[serde(default)]
  condition: Option<ExpressionDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest {
  #[serde(default)]
  query: Option<ExpressionDef>,
  #[serde(default)]
  filter: Option<ExpressionDef>,
  #[serde(default)]
  limit: Option<usize>,
  #[serde(default)]
  next_token: Option<String>,
  #[serde(default = "default_forward")]
  scan_index_forward: bool,
}

fn default_forward() -> bool {
  true
}

#[derive(Debug, Deserialize)]
struct BatchGetTable {
  keys: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct BatchRequest<T> {
  tables: BTreeMap<String, T>,
}

fn parse<T: DeserializeOwned>(operation: &str, request: &Value) -> Result<T, KvError> {
  serde_json::from_value(request.clone())
    .map_err(|e| KvError::validation(format!("invalid {} request: {}", operation, e)))
}

fn check(condition: &Option<ExpressionDef>, item: Option<&Item>) -> Result<(), KvError> {
  let Some(def) = condition else {
    return Ok(());
  };
  let empty = Map::new();
  if Condition::parse(def)?.matches(item.unwrap_or(&empty)) {
    Ok(())
  } else {
    Err(KvError::ConditionalCheckFailed)
  }
}

fn plain(item: Option<&Item>) -> Result<Value, KvError> {
  item.map(unmarshal_item).unwrap_or(Ok(Value::Null))
}

/// In-memory, DynamoDB-style tables.
///
/// Tables are created on first use. Each table learns its key attribute names
/// from the first `key` it is written with. Items are kept in key order, which
/// is the order `Query` and `Scan` return them in.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTables {
  tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl InMemoryTables {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare a table's key attributes ahead of time. Needed before batch writes
  /// to a table that has not seen a keyed request yet.
  pub async fn create_table(&self, name: &str, key_names: &[&str]) {
    let mut tables = self.tables.write().await;
    let table = tables.entry(name.to_string()).or_default();
    let mut names: Vec<String> = key_names.iter().map(|n| n.to_string()).collect();
    names.sort();
    table.key_names = names;
  }

  /// Number of items stored in `table`.
  pub async fn len(&self, table: &str) -> usize {
    self
      .tables
      .read()
      .await
      .get(table)
      .map(|t| t.items.len())
      .unwrap_or(0)
  }

  async fn get_item(&self, table: &str, request: &Value) -> Result<Value, KvError> {
    let req: KeyedRequest = parse("GetItem", request)?;
    let tables = self.tables.read().await;
    let item = tables
      .get(table)
      .and_then(|t| t.items.get(&key_string(&req.key)));
    plain(item)
  }

  async fn put_item(&self, table: &str, request: &Value) -> Result<Value, KvError> {
    let req: KeyedRequest = parse("PutItem", request)?;
    let mut tables = self.tables.write().await;
    let table = tables.entry(table.to_string()).or_default();
    table.learn_key(&req.key);

    let id = key_string(&req.key);
    check(&req.condition, table.items.get(&id))?;

    let mut item = req.attribute_values;
    for (name, value) in req.key {
      item.insert(name, value);
    }
    let result = unmarshal_item(&item)?;
    table.items.insert(id, item);
    Ok(result)
  }

  async fn update_item(&self, table: &str, request: &Value) -> Result<Value, KvError> {
    let req: KeyedRequest = parse("UpdateItem", request)?;
    let update = req
      .update
      .as_ref()
      .ok_or_else(|| KvError::validation("UpdateItem requires an update expression"))
      .and_then(Update::parse)?;

    let mut tables = self.tables.write().await;
    let table = tables.entry(table.to_string()).or_default();
    table.learn_key(&req.key);

    let id = key_string(&req.key);
    let existing = table.items.get(&id);
    check(&req.condition, existing)?;

    let mut item = existing.cloned().unwrap_or_else(|| req.key.clone());
    update.apply(&mut item)?;
    for (name, value) in &req.key {
      if item.get(name) != Some(value) {
        return Err(KvError::validation(format!(
          "Cannot update attribute {}. This attribute is part of the key",
          name
        )));
      }
    }

    let result = unmarshal_item(&item)?;
    table.items.insert(id, item);
    Ok(result)
  }

  async fn delete_item(&self, table: &str, request: &Value) -> Result<Value, KvError> {
    let req: KeyedRequest = parse("DeleteItem", request)?;
    let mut tables = self.tables.write().await;
    let Some(table) = tables.get_mut(table) else {
      check(&req.condition, None)?;
      return Ok(Value::Null);
    };

    let id = key_string(&req.key);
    check(&req.condition, table.items.get(&id))?;
    plain(table.items.remove(&id).as_ref())
  }

  async fn list(&self, table: &str, operation: &str, request: &Value) -> Result<Value, KvError> {
    let req: ListRequest = parse(operation, request)?;
    let key_condition = match (&req.query, operation) {
      (Some(def), _) => Some(Condition::parse(def)?),
      (None, "Query") => return Err(KvError::validation("Query requires a query expression")),
      (None, _) => None,
    };
    let filter = req.filter.as_ref().map(Condition::parse).transpose()?;
    let offset = match &req.next_token {
      Some(token) => token
        .parse::<usize>()
        .map_err(|_| KvError::validation(format!("invalid nextToken: {}", token)))?,
      None => 0,
    };

    let tables = self.tables.read().await;
    let mut candidates: Vec<&Item> = tables
      .get(table)
      .map(|t| t.items.values().collect())
      .unwrap_or_default();
    if let Some(condition) = &key_condition {
      candidates.retain(|item| condition.matches(item));
    }
    if !req.scan_index_forward {
      candidates.reverse();
    }

    let end = req
      .limit
      .map(|limit| offset.saturating_add(limit).min(candidates.len()))
      .unwrap_or(candidates.len());
    let scanned = candidates.get(offset..end).unwrap_or_default();

    let mut items = Vec::with_capacity(scanned.len());
    for item in scanned {
      if filter.as_ref().is_none_or(|f| f.matches(item)) {
        items.push(unmarshal_item(item)?);
      }
    }
    let next_token = (end < candidates.len()).then(|| end.to_string());

    Ok(json!({
      "items": items,
      "scannedCount": scanned.len(),
      "nextToken": next_token,
    }))
  }

  async fn batch_get_item(&self, request: &Value) -> Result<Value, KvError> {
    let req: BatchRequest<BatchGetTable> = parse("BatchGetItem", request)?;
    let tables = self.tables.read().await;

    let mut data = Map::new();
    let mut unprocessed = Map::new();
    for (name, spec) in req.tables {
      let table = tables.get(&name);
      let mut results = Vec::with_capacity(spec.keys.len());
      for key in &spec.keys {
        results.push(plain(table.and_then(|t| t.items.get(&key_string(key))))?);
      }
      data.insert(name.clone(), Value::Array(results));
      unprocessed.insert(name, json!([]));
    }

    Ok(json!({ "data": data, "unprocessedKeys": unprocessed }))
  }

  async fn batch_put_item(&self, request: &Value) -> Result<Value, KvError> {
    let req: BatchRequest<Vec<Item>> = parse("BatchPutItem", request)?;
    let mut tables = self.tables.write().await;

    let mut data = Map::new();
    let mut unprocessed = Map::new();
    for (name, items) in req.tables {
      let table = tables.entry(name.clone()).or_default();
      let mut results = Vec::with_capacity(items.len());
      for item in items {
        let id = key_string(&table.key_of(&item)?);
        results.push(unmarshal_item(&item)?);
        table.items.insert(id, item);
      }
      data.insert(name.clone(), Value::Array(results));
      unprocessed.insert(name, json!([]));
    }

    Ok(json!({ "data": data, "unprocessedItems": unprocessed }))
  }

  async fn batch_delete_item(&self, request: &Value) -> Result<Value, KvError> {
    let req: BatchRequest<Vec<Item>> = parse("BatchDeleteItem", request)?;
    let mut tables = self.tables.write().await;

    let mut data = Map::new();
    let mut unprocessed = Map::new();
    for (name, keys) in req.tables {
      let mut results = Vec::with_capacity(keys.len());
      if let Some(table) = tables.get_mut(&name) {
        for key in &keys {
          results.push(plain(table.items.remove(&key_string(key)).as_ref())?);
        }
      } else {
        results.resize(keys.len(), Value::Null);
      }
      data.insert(name.clone(), Value::Array(results));
      unprocessed.insert(name, json!([]));
    }

    Ok(json!({ "data": data, "unprocessedKeys": unprocessed }))
  }
}

#[async_trait]
impl KvBackend for InMemoryTables {
  #[instrument(name = "kv_execute", skip(self, request), fields(table = %table))]
  async fn execute(&self, table: &str, request: &Value) -> Result<Value, KvError> {
    let operation = request
      .get("operation")
      .and_then(Value::as_str)
      .ok_or_else(|| KvError::validation("request is missing an operation"))?;
    debug!(operation = %operation, "kv_request");

    match operation {
      "GetItem" => self.get_item(table, request).await,
      "PutItem" => self.put_item(table, request).await,
      "UpdateItem" => self.update_item(table, request).await,
      "DeleteItem" => self.delete_item(table, request).await,
      "Query" | "Scan" => self.list(table, operation, request).await,
      "BatchGetItem" => self.batch_get_item(request).await,
      "BatchPutItem" => self.batch_put_item(request).await,
      "BatchDeleteItem" => self.batch_delete_item(request).await,
      other => Err(KvError::UnknownOperation {
        operation: other.to_string(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn put(tables: &InMemoryTables, id: &str, sk: &str, extra: Value) -> Value {
    tables
      .execute(
        "posts",
        &json!({
          "version": "2017-02-28",
          "operation": "PutItem",
          "key": { "id": { "S": id }, "sk": { "S": sk } },
          "attributeValues": extra
        }),
      )
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_put_then_get() {
    let tables = InMemoryTables::new();
    let stored = put(&tables, "1", "a", json!({ "title": { "S": "Hello" } })).await;
    assert_eq!(stored, json!({ "title": "Hello", "id": "1", "sk": "a" }));

    let fetched = tables
      .execute(
        "posts",
        &json!({ "operation": "GetItem", "key": { "sk": { "S": "a" }, "id": { "S": "1" } } }),
      )
      .await
      .unwrap();
    assert_eq!(fetched, stored);

    let missing = tables
      .execute(
        "posts",
        &json!({ "operation": "GetItem", "key": { "id": { "S": "2" }, "sk": { "S": "a" } } }),
      )
      .await
      .unwrap();
    assert_eq!(missing, Value::Null);
  }

  #[tokio::test]
  async fn test_conditional_put_fails_when_item_exists() {
    let tables = InMemoryTables::new();
    put(&tables, "1", "a", json!({})).await;

    let err = tables
      .execute(
        "posts",
        &json!({
          "operation": "PutItem",
          "key": { "id": { "S": "1" }, "sk": { "S": "a" } },
          "attributeValues": {},
          "condition": { "expression": "attribute_not_exists(id)" }
        }),
      )
      .await
      .unwrap_err();

    assert!(matches!(err, KvError::ConditionalCheckFailed));
    assert_eq!(err.error_type(), "DynamoDB:ConditionalCheckFailedException");
  }

  #[tokio::test]
  async fn test_update_creates_and_modifies() {
    let tables = InMemoryTables::new();
    let request = json!({
      "operation": "UpdateItem",
      "key": { "id": { "S": "1" }, "sk": { "S": "a" } },
      "update": {
        "expression": "SET #v = if_not_exists(#v, :zero) + :one",
        "expressionNames": { "#v": "views" },
        "expressionValues": { ":zero": { "N": "0" }, ":one": { "N": "1" } }
      }
    });

    tables.execute("posts", &request).await.unwrap();
    let second = tables.execute("posts", &request).await.unwrap();

    assert_eq!(second, json!({ "id": "1", "sk": "a", "views": 2 }));
  }

  #[tokio::test]
  async fn test_delete_returns_removed_item() {
    let tables = InMemoryTables::new();
    put(&tables, "1", "a", json!({ "n": { "N": "1" } })).await;

    let request = json!({ "operation": "DeleteItem", "key": { "id": { "S": "1" }, "sk": { "S": "a" } } });
    let deleted = tables.execute("posts", &request).await.unwrap();
    assert_eq!(deleted, json!({ "n": 1, "id": "1", "sk": "a" }));
    assert_eq!(tables.len("posts").await, 0);
    assert_eq!(tables.execute("posts", &request).await.unwrap(), Value::Null);
  }

  #[tokio::test]
  async fn test_query_with_filter_and_paging() {
    let tables = InMemoryTables::new();
    for (sk, n) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
      put(&tables, "1", sk, json!({ "n": { "N": n.to_string() } })).await;
    }
    put(&tables, "2", "a", json!({ "n": { "N": "9" } })).await;

    let first = tables
      .execute(
        "posts",
        &json!({
          "operation": "Query",
          "query": { "expression": "id = :id", "expressionValues": { ":id": { "S": "1" } } },
          "filter": { "expression": "n <> :two", "expressionValues": { ":two": { "N": "2" } } },
          "limit": 3
        }),
      )
      .await
      .unwrap();

    assert_eq!(first["scannedCount"], 3);
    assert_eq!(first["nextToken"], "3");
    let sks: Vec<&str> = first["items"]
      .as_array()
      .unwrap()
      .iter()
      .map(|i| i["sk"].as_str().unwrap())
      .collect();
    assert_eq!(sks, vec!["a", "c"]);

    let rest = tables
      .execute(
        "posts",
        &json!({
          "operation": "Query",
          "query": { "expression": "id = :id", "expressionValues": { ":id": { "S": "1" } } },
          "nextToken": "3"
        }),
      )
      .await
      .unwrap();
    assert_eq!(rest["items"].as_array().unwrap().len(), 1);
    assert_eq!(rest["nextToken"], Value::Null);
  }

  #[tokio::test]
  async fn test_scan_backwards() {
    let tables = InMemoryTables::new();
    put(&tables, "1", "a", json!({})).await;
    put(&tables, "2", "a", json!({})).await;

    let result = tables
      .execute("posts", &json!({ "operation": "Scan", "scanIndexForward": false }))
      .await
      .unwrap();
    assert_eq!(result["items"][0]["id"], "2");
    assert_eq!(result["scannedCount"], 2);
  }

  #[tokio::test]
  async fn test_batch_operations() {
    let tables = InMemoryTables::new();
    tables.create_table("authors", &["id"]).await;

    let put = tables
      .execute(
        "ignored",
        &json!({
          "operation": "BatchPutItem",
          "tables": { "authors": [{ "id": { "S": "1" }, "name": { "S": "Ann" } }, { "id": { "S": "2" } }] }
        }),
      )
      .await
      .unwrap();
    assert_eq!(put["data"]["authors"][0], json!({ "id": "1", "name": "Ann" }));

    let got = tables
      .execute(
        "ignored",
        &json!({
          "operation": "BatchGetItem",
          "tables": { "authors": { "keys": [{ "id": { "S": "1" } }, { "id": { "S": "3" } }] } }
        }),
      )
      .await
      .unwrap();
    assert_eq!(got["data"]["authors"], json!([{ "id": "1", "name": "Ann" }, null]));

    tables
      .execute(
        "ignored",
        &json!({ "operation": "BatchDeleteItem", "tables": { "authors": [{ "id": { "S": "2" } }] } }),
      )
      .await
      .unwrap();
    assert_eq!(tables.len("authors").await, 1);
  }

  #[tokio::test]
  async fn test_unknown_operation() {
    let tables = InMemoryTables::new();
    let err = tables
      .execute("posts", &json!({ "operation": "TransactWriteItems" }))
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "Unknown operation name: TransactWriteItems");
    assert_eq!(err.error_type(), "DynamoDB:ValidationException");
  }
}
