//! The `$util` namespace.

mod dynamodb;
mod time;

use std::borrow::Cow;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use emusync_context::AuthType;
use indexmap::IndexMap;
use regex::Regex;

use crate::error::RaisedError;
use crate::interpreter::Interrupt;
use crate::value::{Namespace, Value};

/// Default error type for a failed `$util.validate`.
pub const VALIDATION_ERROR_TYPE: &str = "CustomTemplateException";
pub const UNAUTHORIZED_ERROR_TYPE: &str = "Unauthorized";

/// Per-evaluation state the utilities read and write.
pub(crate) struct UtilState {
  pub now: DateTime<Utc>,
  pub auth_type: AuthType,
  pub appended: Vec<RaisedError>,
}

pub(crate) fn call(
  state: &mut UtilState,
  namespace: Namespace,
  name: &str,
  args: &[Value],
) -> Result<Value, Interrupt> {
  let result = match namespace {
    Namespace::Util => return call_util(state, name, args),
    Namespace::Time => time::call(state.now, name, args),
    Namespace::List => call_list(name, args),
    Namespace::Map => call_map(name, args),
    Namespace::Math => call_math(name, args),
    Namespace::Dynamodb => dynamodb::call(name, args),
    Namespace::Rds => call_rds(name, args),
  };
  result.map_err(|message| Interrupt::Fault(format!("{}.{}: {}", namespace.path(), name, message)))
}

fn arg(args: &[Value], index: usize) -> Value {
  args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Argument rendered as text; null is rejected.
fn text_arg(args: &[Value], index: usize) -> Result<String, String> {
  match args.get(index) {
    Some(v) if !v.is_nullish() => Ok(v.render()),
    _ => Err(format!("argument {} must not be null", index + 1)),
  }
}

fn optional_text(value: Value) -> Option<String> {
  if value.is_nullish() {
    None
  } else {
    Some(value.render())
  }
}

/// Build an author-raised error from `(message, type?, data?, errorInfo?)`.
fn raised_error(args: &[Value]) -> RaisedError {
  RaisedError {
    message: arg(args, 0).render(),
    error_type: optional_text(arg(args, 1)),
    data: arg(args, 2).to_json(),
    error_info: arg(args, 3).to_json(),
  }
}

fn call_util(state: &mut UtilState, name: &str, args: &[Value]) -> Result<Value, Interrupt> {
  let fault = |message: String| Interrupt::Fault(format!("$util.{}: {}", name, message));

  let value = match name {
    "error" => return Err(Interrupt::Raise(raised_error(args))),
    "unauthorized" => {
      return Err(Interrupt::Raise(RaisedError::new(
        "Unauthorized",
        Some(UNAUTHORIZED_ERROR_TYPE.to_string()),
      )));
    }
    "validate" => {
      if arg(args, 0).is_truthy() {
        Value::string("")
      } else {
        return Err(Interrupt::Raise(RaisedError {
          message: arg(args, 1).render(),
          error_type: Some(
            optional_text(arg(args, 2)).unwrap_or_else(|| VALIDATION_ERROR_TYPE.to_string()),
          ),
          data: arg(args, 3).to_json(),
          error_info: serde_json::Value::Null,
        }));
      }
    }
    "appendError" => {
      state.appended.push(raised_error(args));
      Value::string("")
    }
    "qr" | "quiet" => Value::string(""),
    "toJson" => Value::string(arg(args, 0).to_json().to_string()),
    "parseJson" => {
      let text = text_arg(args, 0).map_err(fault)?;
      let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| fault(format!("invalid JSON: {}", e)))?;
      Value::from_json(&json)
    }
    "escapeJavaScript" => Value::string(escape_javascript(&text_arg(args, 0).map_err(fault)?)),
    "urlEncode" => {
      let text = text_arg(args, 0).map_err(fault)?;
      Value::string(url::form_urlencoded::byte_serialize(text.as_bytes()).collect::<String>())
    }
    "urlDecode" => {
      let text = text_arg(args, 0).map_err(fault)?.replace('+', " ");
      let decoded = urlencoding::decode(&text).map_err(|e| fault(e.to_string()))?;
      Value::string(Cow::into_owned(decoded))
    }
    "base64Encode" => {
      Value::string(general_purpose::STANDARD.encode(text_arg(args, 0).map_err(fault)?))
    }
    "base64Decode" => {
      let bytes = general_purpose::STANDARD
        .decode(text_arg(args, 0).map_err(fault)?)
        .map_err(|e| fault(e.to_string()))?;
      Value::string(String::from_utf8(bytes).map_err(|e| fault(e.to_string()))?)
    }
    "autoId" => Value::string(uuid::Uuid::new_v4().to_string()),
    "authType" => Value::string(state.auth_type.description()),
    "isNull" => Value::Bool(arg(args, 0).is_nullish()),
    "isNullOrEmpty" => {
      let v = arg(args, 0);
      Value::Bool(v.is_nullish() || v.as_str().is_some_and(str::is_empty))
    }
    "isNullOrBlank" => {
      let v = arg(args, 0);
      Value::Bool(v.is_nullish() || v.as_str().is_some_and(|s| s.trim().is_empty()))
    }
    "defaultIfNull" => {
      let v = arg(args, 0);
      if v.is_nullish() { arg(args, 1) } else { v }
    }
    "defaultIfNullOrEmpty" => {
      let v = arg(args, 0);
      if v.is_nullish() || v.as_str().is_some_and(str::is_empty) {
        arg(args, 1)
      } else {
        v
      }
    }
    "defaultIfNullOrBlank" => {
      let v = arg(args, 0);
      if v.is_nullish() || v.as_str().is_some_and(|s| s.trim().is_empty()) {
        arg(args, 1)
      } else {
        v
      }
    }
    "isString" => Value::Bool(matches!(arg(args, 0), Value::String(_))),
    "isNumber" => Value::Bool(arg(args, 0).is_number()),
    "isBoolean" => Value::Bool(matches!(arg(args, 0), Value::Bool(_))),
    "isList" => Value::Bool(matches!(arg(args, 0), Value::List(_))),
    "isMap" => Value::Bool(matches!(arg(args, 0), Value::Map(_))),
    "typeOf" => Value::string(match arg(args, 0) {
      Value::Undefined | Value::Null => "Null",
      Value::Bool(_) => "Boolean",
      Value::Int(_) | Value::Float(_) => "Number",
      Value::String(_) => "String",
      Value::List(_) => "List",
      Value::Map(_) => "Map",
      Value::Util(_) => "Object",
    }),
    "matches" => {
      let pattern = text_arg(args, 0).map_err(fault)?;
      let text = text_arg(args, 1).map_err(fault)?;
      let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| fault(e.to_string()))?;
      Value::Bool(re.is_match(&text))
    }
    _ => {
      return Err(Interrupt::Fault(format!(
        "unknown function $util.{} with {} argument(s)",
        name,
        args.len()
      )));
    }
  };
  Ok(value)
}

/// Java `StringEscapeUtils.escapeEcmaScript`.
fn escape_javascript(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\'' => out.push_str("\\'"),
      '\\' => out.push_str("\\\\"),
      '/' => out.push_str("\\/"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      '\u{8}' => out.push_str("\\b"),
      '\u{c}' => out.push_str("\\f"),
      c if (c as u32) < 0x20 || (c as u32) > 0x7f => {
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
          out.push_str(&format!("\\u{:04X}", unit));
        }
      }
      c => out.push(c),
    }
  }
  out
}

fn list_arg(args: &[Value], index: usize) -> Result<Vec<Value>, String> {
  match args.get(index) {
    Some(Value::List(list)) => {
      let items = list.borrow().clone();
      Ok(items)
    }
    _ => Err(format!("argument {} must be a list", index + 1)),
  }
}

fn map_arg(args: &[Value], index: usize) -> Result<IndexMap<String, Value>, String> {
  match args.get(index) {
    Some(Value::Map(map)) => {
      let entries = map.borrow().clone();
      Ok(entries)
    }
    _ => Err(format!("argument {} must be a map", index + 1)),
  }
}

fn call_list(name: &str, args: &[Value]) -> Result<Value, String> {
  let items = list_arg(args, 0)?;
  let other = list_arg(args, 1)?;
  let keep = match name {
    "copyAndRetainAll" => true,
    "copyAndRemoveAll" => false,
    _ => return Err("unknown function".to_string()),
  };
  Ok(Value::new_list(
    items
      .into_iter()
      .filter(|item| other.iter().any(|o| o.loose_eq(item)) == keep)
      .collect(),
  ))
}

fn call_map(name: &str, args: &[Value]) -> Result<Value, String> {
  let entries = map_arg(args, 0)?;
  let keys: Vec<String> = list_arg(args, 1)?.iter().map(Value::render).collect();
  let keep = match name {
    "copyAndRetainAllKeys" => true,
    "copyAndRemoveAllKeys" => false,
    _ => return Err("unknown function".to_string()),
  };
  Ok(Value::new_map(
    entries
      .into_iter()
      .filter(|(k, _)| keys.contains(k) == keep)
      .collect(),
  ))
}

fn number_arg(args: &[Value], index: usize) -> Result<Value, String> {
  match args.get(index) {
    Some(v) if v.is_number() => Ok(v.clone()),
    _ => Err(format!("argument {} must be a number", index + 1)),
  }
}

fn call_math(name: &str, args: &[Value]) -> Result<Value, String> {
  match name {
    "roundNum" => {
      let n = number_arg(args, 0)?;
      match n {
        Value::Int(i) => Ok(Value::Int(i)),
        other => Ok(Value::Int((other.as_f64().unwrap_or(0.0) + 0.5).floor() as i64)),
      }
    }
    "minVal" | "maxVal" => {
      let a = number_arg(args, 0)?;
      let b = number_arg(args, 1)?;
      let a_first = match a.compare(&b) {
        Some(std::cmp::Ordering::Greater) => name == "maxVal",
        _ => name == "minVal",
      };
      let picked = if a_first { a } else { b };
      Ok(match picked {
        Value::Int(i) => Value::Float(i as f64),
        other => other,
      })
    }
    _ => Err("unknown function".to_string()),
  }
}

/// `$util.rds.toJsonObject`: one list of row objects per statement.
///
/// Accepts either plain records (`[{col: value}]`) or Data API records
/// (`[[{stringValue: ...}]]` alongside `columnMetadata`).
fn call_rds(name: &str, args: &[Value]) -> Result<Value, String> {
  if name != "toJsonObject" {
    return Err("unknown function".to_string());
  }
  let input = match arg(args, 0) {
    Value::String(text) => {
      serde_json::from_str::<serde_json::Value>(&text).map_err(|e| format!("invalid JSON: {}", e))?
    }
    other => other.to_json(),
  };
  let statements = input
    .get("sqlStatementResults")
    .and_then(serde_json::Value::as_array)
    .ok_or_else(|| "expected an object with sqlStatementResults".to_string())?;

  let mut out = Vec::new();
  for statement in statements {
    let columns: Vec<String> = statement
      .get("columnMetadata")
      .and_then(serde_json::Value::as_array)
      .map(|meta| {
        meta
          .iter()
          .map(|m| {
            m.get("label")
              .or_else(|| m.get("name"))
              .and_then(serde_json::Value::as_str)
              .unwrap_or_default()
              .to_string()
          })
          .collect()
      })
      .unwrap_or_default();

    let rows: Vec<serde_json::Value> = statement
      .get("records")
      .and_then(serde_json::Value::as_array)
      .map(|records| {
        records
          .iter()
          .map(|record| match record {
            serde_json::Value::Array(cells) => {
              let mut row = serde_json::Map::new();
              for (column, cell) in columns.iter().zip(cells) {
                row.insert(column.clone(), data_api_cell(cell));
              }
              serde_json::Value::Object(row)
            }
            other => other.clone(),
          })
          .collect()
      })
      .unwrap_or_default();
    out.push(serde_json::Value::Array(rows));
  }
  Ok(Value::from_json(&serde_json::Value::Array(out)))
}

fn data_api_cell(cell: &serde_json::Value) -> serde_json::Value {
  let Some(fields) = cell.as_object() else {
    return cell.clone();
  };
  if fields.get("isNull").and_then(serde_json::Value::as_bool) == Some(true) {
    return serde_json::Value::Null;
  }
  fields
    .values()
    .next()
    .cloned()
    .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  fn state() -> UtilState {
    UtilState {
      now: Utc.with_ymd_and_hms(2018, 2, 6, 19, 1, 35).unwrap(),
      auth_type: AuthType::UserPool,
      appended: Vec::new(),
    }
  }

  fn util(name: &str, args: Vec<Value>) -> Result<Value, Interrupt> {
    call(&mut state(), Namespace::Util, name, &args)
  }

  fn json_of(result: Result<Value, Interrupt>) -> serde_json::Value {
    match result {
      Ok(v) => v.to_json(),
      Err(_) => panic!("expected a value"),
    }
  }

  #[test]
  fn test_error_raises() {
    let err = util(
      "error",
      vec![Value::string("nope"), Value::string("Custom"), Value::from_json(&json!({"a": 1}))],
    );
    match err {
      Err(Interrupt::Raise(e)) => {
        assert_eq!(e.message, "nope");
        assert_eq!(e.error_type.as_deref(), Some("Custom"));
        assert_eq!(e.data, json!({"a": 1}));
        assert_eq!(e.error_info, serde_json::Value::Null);
      }
      _ => panic!("expected a raised error"),
    }
  }

  #[test]
  fn test_unauthorized() {
    match util("unauthorized", vec![]) {
      Err(Interrupt::Raise(e)) => {
        assert_eq!(e.message, "Unauthorized");
        assert_eq!(e.error_type.as_deref(), Some("Unauthorized"));
      }
      _ => panic!("expected a raised error"),
    }
  }

  #[test]
  fn test_validate_default_type() {
    assert_eq!(
      json_of(util("validate", vec![Value::Bool(true), Value::string("bad")])),
      json!("")
    );
    match util("validate", vec![Value::Bool(false), Value::string("bad")]) {
      Err(Interrupt::Raise(e)) => {
        assert_eq!(e.message, "bad");
        assert_eq!(e.error_type.as_deref(), Some(VALIDATION_ERROR_TYPE));
      }
      _ => panic!("expected a raised error"),
    }
  }

  #[test]
  fn test_append_error_continues() {
    let mut state = state();
    let result = call(
      &mut state,
      Namespace::Util,
      "appendError",
      &[Value::string("first"), Value::string("T")],
    );
    assert!(result.is_ok());
    assert_eq!(state.appended.len(), 1);
    assert_eq!(state.appended[0].message, "first");
  }

  #[test]
  fn test_json_helpers() {
    let map = Value::from_json(&json!({ "a": [1, "b"] }));
    assert_eq!(json_of(util("toJson", vec![map])), json!(r#"{"a":[1,"b"]}"#));
    assert_eq!(
      json_of(util("parseJson", vec![Value::string(r#"{"x":true}"#)])),
      json!({ "x": true })
    );
    assert!(matches!(
      util("parseJson", vec![Value::string("{")]),
      Err(Interrupt::Fault(_))
    ));
  }

  #[test]
  fn test_encoding_helpers() {
    assert_eq!(
      json_of(util("urlEncode", vec![Value::string("a b&c=d/é")])),
      json!("a+b%26c%3Dd%2F%C3%A9")
    );
    assert_eq!(
      json_of(util("urlDecode", vec![Value::string("a+b%26c")])),
      json!("a b&c")
    );
    assert_eq!(
      json_of(util("base64Encode", vec![Value::string("hello")])),
      json!("aGVsbG8=")
    );
    assert_eq!(
      json_of(util("base64Decode", vec![Value::string("aGVsbG8=")])),
      json!("hello")
    );
    assert_eq!(
      json_of(util("escapeJavaScript", vec![Value::string("it's \"q\"\n/é")])),
      json!("it\\'s \\\"q\\\"\\n\\/\\u00E9")
    );
  }

  #[test]
  fn test_null_helpers() {
    assert_eq!(json_of(util("isNull", vec![Value::Undefined])), json!(true));
    assert_eq!(json_of(util("isNullOrEmpty", vec![Value::string("")])), json!(true));
    assert_eq!(json_of(util("isNullOrBlank", vec![Value::string("  ")])), json!(true));
    assert_eq!(
      json_of(util("defaultIfNull", vec![Value::Null, Value::Int(3)])),
      json!(3)
    );
    assert_eq!(
      json_of(util("defaultIfNullOrEmpty", vec![Value::string("x"), Value::Int(3)])),
      json!("x")
    );
  }

  #[test]
  fn test_type_helpers() {
    assert_eq!(json_of(util("typeOf", vec![Value::Int(1)])), json!("Number"));
    assert_eq!(
      json_of(util("typeOf", vec![Value::from_json(&json!({}))])),
      json!("Map")
    );
    assert_eq!(json_of(util("isList", vec![Value::new_list(vec![])])), json!(true));
    assert_eq!(
      json_of(util("matches", vec![Value::string("a+"), Value::string("aaa")])),
      json!(true)
    );
  }

  #[test]
  fn test_auth_type() {
    assert_eq!(json_of(util("authType", vec![])), json!("User Pool Authorization"));
  }

  #[test]
  fn test_auto_id_is_uuid() {
    let id = json_of(util("autoId", vec![]));
    assert!(uuid::Uuid::parse_str(id.as_str().unwrap()).is_ok());
  }

  #[test]
  fn test_list_and_map_helpers() {
    let list = Value::from_json(&json!([1, 2, 3]));
    let other = Value::from_json(&json!([2]));
    assert_eq!(
      json_of(call(&mut state(), Namespace::List, "copyAndRemoveAll", &[list.clone(), other.clone()])),
      json!([1, 3])
    );
    assert_eq!(
      json_of(call(&mut state(), Namespace::List, "copyAndRetainAll", &[list, other])),
      json!([2])
    );

    let map = Value::from_json(&json!({ "a": 1, "b": 2 }));
    let keys = Value::from_json(&json!(["a"]));
    assert_eq!(
      json_of(call(&mut state(), Namespace::Map, "copyAndRetainAllKeys", &[map.clone(), keys.clone()])),
      json!({ "a": 1 })
    );
    assert_eq!(
      json_of(call(&mut state(), Namespace::Map, "copyAndRemoveAllKeys", &[map, keys])),
      json!({ "b": 2 })
    );
  }

  #[test]
  fn test_math_helpers() {
    assert_eq!(
      json_of(call(&mut state(), Namespace::Math, "roundNum", &[Value::Float(2.5)])),
      json!(3)
    );
    assert_eq!(
      json_of(call(&mut state(), Namespace::Math, "maxVal", &[Value::Int(2), Value::Float(3.5)])),
      json!(3.5)
    );
    assert_eq!(
      json_of(call(&mut state(), Namespace::Math, "minVal", &[Value::Int(2), Value::Int(7)])),
      json!(2.0)
    );
  }

  #[test]
  fn test_rds_to_json_object() {
    let plain = Value::string(
      r#"{"sqlStatementResults":[{"records":[{"id":1,"name":"a"}],"numberOfRecordsUpdated":0}]}"#,
    );
    assert_eq!(
      json_of(call(&mut state(), Namespace::Rds, "toJsonObject", &[plain])),
      json!([[{ "id": 1, "name": "a" }]])
    );

    let data_api = Value::from_json(&json!({
      "sqlStatementResults": [{
        "columnMetadata": [{ "label": "id" }, { "label": "note" }],
        "records": [[{ "longValue": 7 }, { "isNull": true }]]
      }]
    }));
    assert_eq!(
      json_of(call(&mut state(), Namespace::Rds, "toJsonObject", &[data_api])),
      json!([[{ "id": 7, "note": null }]])
    );
  }

  #[test]
  fn test_unknown_function_is_fault() {
    assert!(matches!(util("nope", vec![]), Err(Interrupt::Fault(_))));
  }
}
