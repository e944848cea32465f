//! `$util.dynamodb`: conversion of plain values to attribute values.

use serde_json::{Map, Value as Json, json};

use crate::value::Value;

/// Convert plain JSON into a DynamoDB attribute value.
pub(crate) fn marshal(value: &Json) -> Json {
  match value {
    Json::Null => json!({ "NULL": true }),
    Json::Bool(b) => json!({ "BOOL": b }),
    Json::Number(n) => json!({ "N": n.to_string() }),
    Json::String(s) => json!({ "S": s }),
    Json::Array(items) => json!({ "L": items.iter().map(marshal).collect::<Vec<_>>() }),
    Json::Object(entries) => json!({ "M": marshal_values(entries) }),
  }
}

fn marshal_values(entries: &Map<String, Json>) -> Json {
  Json::Object(
    entries
      .iter()
      .map(|(k, v)| (k.clone(), marshal(v)))
      .collect(),
  )
}

pub(super) fn call(name: &str, args: &[Value]) -> Result<Value, String> {
  let (base, as_json) = match name.strip_suffix("Json") {
    Some(base) => (base, true),
    None => (name, false),
  };
  let input = args.first().map(Value::to_json).unwrap_or(Json::Null);

  let attribute = match base {
    "toDynamoDB" => marshal(&input),
    "toString" => match &input {
      Json::String(s) => json!({ "S": s }),
      other => return Err(format!("expected a string, got {}", other)),
    },
    "toNumber" => match &input {
      Json::Number(n) => json!({ "N": n.to_string() }),
      other => return Err(format!("expected a number, got {}", other)),
    },
    "toBoolean" => match &input {
      Json::Bool(b) => json!({ "BOOL": b }),
      other => return Err(format!("expected a boolean, got {}", other)),
    },
    "toNull" => json!({ "NULL": true }),
    "toList" => match &input {
      Json::Array(_) => marshal(&input),
      other => return Err(format!("expected a list, got {}", other)),
    },
    "toMap" => match &input {
      Json::Object(_) => marshal(&input),
      other => return Err(format!("expected a map, got {}", other)),
    },
    "toMapValues" => match &input {
      Json::Object(entries) => marshal_values(entries),
      other => return Err(format!("expected a map, got {}", other)),
    },
    "toStringSet" => {
      let members = set_members(&input, |v| v.as_str().map(str::to_string))?;
      json!({ "SS": members })
    }
    "toNumberSet" => {
      let members = set_members(&input, |v| v.as_number().map(|n| n.to_string()))?;
      json!({ "NS": members })
    }
    _ => return Err("unknown function".to_string()),
  };

  Ok(if as_json {
    Value::string(attribute.to_string())
  } else {
    Value::from_json(&attribute)
  })
}

fn set_members(input: &Json, member: impl Fn(&Json) -> Option<String>) -> Result<Vec<String>, String> {
  let items = input
    .as_array()
    .ok_or_else(|| format!("expected a list, got {}", input))?;
  items
    .iter()
    .map(|item| member(item).ok_or_else(|| format!("invalid set member {}", item)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dynamodb(name: &str, input: Json) -> Json {
    call(name, &[Value::from_json(&input)]).unwrap().to_json()
  }

  #[test]
  fn test_to_dynamodb_nested() {
    assert_eq!(
      dynamodb("toDynamoDB", json!({ "id": "1", "tags": ["a"], "n": 2, "ok": true, "none": null })),
      json!({
        "M": {
          "id": { "S": "1" },
          "tags": { "L": [{ "S": "a" }] },
          "n": { "N": "2" },
          "ok": { "BOOL": true },
          "none": { "NULL": true }
        }
      })
    );
  }

  #[test]
  fn test_json_variant_is_serialized() {
    assert_eq!(dynamodb("toStringJson", json!("x")), json!(r#"{"S":"x"}"#));
  }

  #[test]
  fn test_map_values_and_sets() {
    assert_eq!(
      dynamodb("toMapValues", json!({ "id": "1" })),
      json!({ "id": { "S": "1" } })
    );
    assert_eq!(dynamodb("toStringSet", json!(["a", "b"])), json!({ "SS": ["a", "b"] }));
    assert_eq!(dynamodb("toNumberSet", json!([1, 2.5])), json!({ "NS": ["1", "2.5"] }));
  }

  #[test]
  fn test_type_mismatch_is_error() {
    assert!(call("toNumber", &[Value::string("x")]).is_err());
  }
}
