use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Number, Value, json};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqliteConnection, SqlitePool, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::bind::positional;
use crate::error::SqlError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqlRequest {
  statements: Vec<String>,
  #[serde(default)]
  variable_map: Map<String, Value>,
}

/// Relational backend. Keeps one connection pool per database URL.
#[derive(Debug, Clone, Default)]
pub struct SqlBackend {
  pools: Arc<Mutex<HashMap<String, SqlitePool>>>,
}

impl SqlBackend {
  pub fn new() -> Self {
    Self::default()
  }

  async fn pool(&self, database_url: &str) -> Result<SqlitePool, SqlError> {
    let mut pools = self.pools.lock().await;
    if let Some(pool) = pools.get(database_url) {
      return Ok(pool.clone());
    }

    // An in-memory database lives only as long as its connection.
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let options = if in_memory {
      SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
    } else {
      SqlitePoolOptions::new().max_connections(5)
    };
    let pool = options.connect(database_url).await?;
    debug!(database_url = %database_url, "sql_pool_created");

    pools.insert(database_url.to_string(), pool.clone());
    Ok(pool)
  }

  /// Run every statement of the request in order on one connection.
  #[instrument(name = "sql_execute", skip(self, request))]
  pub async fn execute(&self, database_url: &str, request: &Value) -> Result<Value, SqlError> {
    let input: SqlRequest =
      serde_json::from_value(request.clone()).map_err(|e| SqlError::InvalidRequest {
        message: e.to_string(),
      })?;
    if input.statements.is_empty() {
      return Err(SqlError::InvalidRequest {
        message: "statements must not be empty".to_string(),
      });
    }

    let pool = self.pool(database_url).await?;
    let mut conn = pool.acquire().await?;

    let mut results = Vec::with_capacity(input.statements.len());
    for statement in &input.statements {
      results.push(run_statement(&mut conn, statement, &input.variable_map).await?);
    }

    Ok(json!({ "sqlStatementResults": results }))
  }
}

async fn run_statement(
  conn: &mut SqliteConnection,
  statement: &str,
  variables: &Map<String, Value>,
) -> Result<Value, SqlError> {
  let (sql, values) = positional(statement, variables)?;
  debug!(sql = %sql, "sql_statement");

  let mut query = sqlx::query(&sql);
  for value in values {
    query = match value {
      Value::Null => query.bind(None::<String>),
      Value::Bool(b) => query.bind(b),
      Value::Number(n) => match n.as_i64() {
        Some(i) => query.bind(i),
        None => query.bind(n.as_f64()),
      },
      Value::String(s) => query.bind(s),
      other => query.bind(other.to_string()),
    };
  }

  if returns_rows(&sql) {
    let rows = query.fetch_all(&mut *conn).await?;
    let records = rows.iter().map(row_to_json).collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "records": records, "numberOfRecordsUpdated": 0 }))
  } else {
    let done = query.execute(&mut *conn).await?;
    Ok(json!({ "records": [], "numberOfRecordsUpdated": done.rows_affected() }))
  }
}

fn returns_rows(sql: &str) -> bool {
  let head = sql.trim_start().to_ascii_uppercase();
  ["SELECT", "WITH", "PRAGMA", "VALUES"]
    .iter()
    .any(|keyword| head.starts_with(keyword))
    || head.contains("RETURNING")
}

fn row_to_json(row: &SqliteRow) -> Result<Value, SqlError> {
  let mut record = Map::new();
  for (index, column) in row.columns().iter().enumerate() {
    let (is_null, type_name) = {
      let raw = row.try_get_raw(index)?;
      (raw.is_null(), raw.type_info().name().to_string())
    };

    let value = if is_null {
      Value::Null
    } else {
      match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Number(row.try_get::<i64, _>(index)?.into()),
        "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?)
          .map(Value::Number)
          .unwrap_or(Value::Null),
        "BLOB" => {
          Value::String(String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned())
        }
        _ => Value::String(row.try_get::<String, _>(index)?),
      }
    };
    record.insert(column.name().to_string(), value);
  }
  Ok(Value::Object(record))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_statements_share_one_database() {
    let backend = SqlBackend::new();
    let url = "sqlite::memory:";

    let created = backend
      .execute(
        url,
        &json!({
          "statements": [
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, score REAL, note TEXT)",
            "INSERT INTO posts (id, title, score, note) VALUES (:ID, :TITLE, 1.5, NULL)"
          ],
          "variableMap": { ":ID": 1, ":TITLE": "Hello" }
        }),
      )
      .await
      .unwrap();
    assert_eq!(created["sqlStatementResults"][1]["numberOfRecordsUpdated"], 1);

    let selected = backend
      .execute(
        url,
        &json!({
          "statements": ["SELECT id, title, score, note FROM posts WHERE id = :ID"],
          "variableMap": { ":ID": 1 }
        }),
      )
      .await
      .unwrap();

    assert_eq!(
      selected,
      json!({
        "sqlStatementResults": [{
          "records": [{ "id": 1, "title": "Hello", "score": 1.5, "note": null }],
          "numberOfRecordsUpdated": 0
        }]
      })
    );
  }

  #[tokio::test]
  async fn test_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let backend = SqlBackend::new();

    let result = backend
      .execute(
        &url,
        &json!({
          "statements": [
            "CREATE TABLE t (name TEXT)",
            "INSERT INTO t (name) VALUES (:name) RETURNING name"
          ],
          "variableMap": { "name": "x" }
        }),
      )
      .await
      .unwrap();

    assert_eq!(result["sqlStatementResults"][1]["records"], json!([{ "name": "x" }]));
  }

  #[tokio::test]
  async fn test_database_error() {
    let err = SqlBackend::new()
      .execute("sqlite::memory:", &json!({ "statements": ["SELECT * FROM missing"] }))
      .await
      .unwrap_err();
    assert!(matches!(err, SqlError::Database(_)));
    assert_eq!(err.error_type(), "RDS:Error");
  }

  #[tokio::test]
  async fn test_empty_statements_rejected() {
    let err = SqlBackend::new()
      .execute("sqlite::memory:", &json!({ "statements": [] }))
      .await
      .unwrap_err();
    assert!(matches!(err, SqlError::InvalidRequest { .. }));
  }

  #[test]
  fn test_returns_rows() {
    assert!(returns_rows("  select 1"));
    assert!(returns_rows("DELETE FROM t RETURNING id"));
    assert!(!returns_rows("UPDATE t SET a = ?"));
  }
}
