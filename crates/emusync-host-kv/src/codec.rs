use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::error::KvError;

/// Convert a typed attribute value (`{"S": "x"}`, `{"N": "1"}`, ...) into plain JSON.
///
/// String and number sets become arrays; binary values stay base64 text.
pub fn unmarshal(value: &Value) -> Result<Value, KvError> {
  let (tag, inner) = single_entry(value)
    .ok_or_else(|| KvError::validation(format!("invalid attribute value: {}", value)))?;

  match (tag, inner) {
    ("S" | "B", Value::String(_)) => Ok(inner.clone()),
    ("N", Value::String(n)) => number(n),
    ("BOOL", Value::Bool(_)) => Ok(inner.clone()),
    ("NULL", _) => Ok(Value::Null),
    ("L", Value::Array(items)) => items.iter().map(unmarshal).collect::<Result<_, _>>().map(Value::Array),
    ("M", Value::Object(entries)) => unmarshal_item(entries),
    ("SS" | "BS", Value::Array(items)) => Ok(Value::Array(items.clone())),
    ("NS", Value::Array(items)) => items
      .iter()
      .map(|item| match item {
        Value::String(n) => number(n),
        other => Err(KvError::validation(format!("invalid number set member: {}", other))),
      })
      .collect::<Result<_, _>>()
      .map(Value::Array),
    _ => Err(KvError::validation(format!("invalid attribute value: {}", value))),
  }
}

/// Convert a map of typed attribute values into a plain JSON object.
pub fn unmarshal_item(item: &Map<String, Value>) -> Result<Value, KvError> {
  let mut out = Map::new();
  for (name, value) in item {
    out.insert(name.clone(), unmarshal(value)?);
  }
  Ok(Value::Object(out))
}

pub(crate) fn number(n: &str) -> Result<Value, KvError> {
  if let Ok(i) = n.parse::<i64>() {
    return Ok(Value::Number(i.into()));
  }
  n.parse::<f64>()
    .ok()
    .and_then(Number::from_f64)
    .map(Value::Number)
    .ok_or_else(|| KvError::validation(format!("invalid number: {}", n)))
}

pub(crate) fn number_text(n: f64) -> String {
  if n.fract() == 0.0 && n.abs() < 9.0e15 {
    format!("{}", n as i64)
  } else {
    n.to_string()
  }
}

pub(crate) fn single_entry(value: &Value) -> Option<(&str, &Value)> {
  match value {
    Value::Object(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
    _ => None,
  }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
  match single_entry(value) {
    Some(("N", Value::String(n))) => n.parse().ok(),
    _ => None,
  }
}

/// Order two typed attribute values. Numbers compare numerically, strings
/// lexically; anything else is only comparable for equality.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
    return x.partial_cmp(&y);
  }
  match (single_entry(a), single_entry(b)) {
    (Some(("S", Value::String(x))), Some(("S", Value::String(y)))) => Some(x.cmp(y)),
    _ if a == b => Some(Ordering::Equal),
    _ => None,
  }
}

/// Stable storage key for an item's key attributes, independent of attribute order.
pub(crate) fn key_string(key: &Map<String, Value>) -> String {
  let sorted: BTreeMap<&String, &Value> = key.iter().collect();
  serde_json::to_string(&sorted).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_unmarshal_scalars_and_collections() {
    let item = json!({
      "id": { "S": "1" },
      "count": { "N": "3" },
      "ratio": { "N": "0.5" },
      "active": { "BOOL": true },
      "gone": { "NULL": true },
      "tags": { "SS": ["a", "b"] },
      "scores": { "NS": ["1", "2.5"] },
      "nested": { "M": { "list": { "L": [{ "S": "x" }, { "N": "7" }] } } }
    });

    let plain = unmarshal_item(item.as_object().unwrap()).unwrap();

    assert_eq!(
      plain,
      json!({
        "id": "1",
        "count": 3,
        "ratio": 0.5,
        "active": true,
        "gone": null,
        "tags": ["a", "b"],
        "scores": [1, 2.5],
        "nested": { "list": ["x", 7] }
      })
    );
  }

  #[test]
  fn test_unmarshal_rejects_untyped_values() {
    assert!(matches!(
      unmarshal(&json!("plain")),
      Err(KvError::Validation { .. })
    ));
    assert!(matches!(
      unmarshal(&json!({ "N": "abc" })),
      Err(KvError::Validation { .. })
    ));
  }

  #[test]
  fn test_key_string_ignores_attribute_order() {
    let a = json!({ "pk": { "S": "1" }, "sk": { "S": "2" } });
    let b = json!({ "sk": { "S": "2" }, "pk": { "S": "1" } });
    assert_eq!(
      key_string(a.as_object().unwrap()),
      key_string(b.as_object().unwrap())
    );
  }

  #[test]
  fn test_compare_numbers_numerically() {
    assert_eq!(
      compare(&json!({ "N": "10" }), &json!({ "N": "9" })),
      Some(Ordering::Greater)
    );
    assert_eq!(
      compare(&json!({ "S": "10" }), &json!({ "S": "9" })),
      Some(Ordering::Less)
    );
    assert_eq!(compare(&json!({ "S": "1" }), &json!({ "N": "1" })), None);
  }
}
