//! Interpretation of rendered template text as JSON.

use serde_json::Value;

/// Parse rendered output. Empty output is `null`; trailing commas before a
/// closing bracket or brace are tolerated.
pub(crate) fn parse_output(text: &str) -> Result<Value, String> {
  let trimmed = text.trim();
  if trimmed.is_empty() {
    return Ok(Value::Null);
  }

  match serde_json::from_str(trimmed) {
    Ok(value) => Ok(value),
    Err(first) => serde_json::from_str(&strip_trailing_commas(trimmed))
      .map_err(|_| format!("Unable to parse the JSON document: {}", first)),
  }
}

fn strip_trailing_commas(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut in_string = false;
  let mut escaped = false;

  for (i, &c) in chars.iter().enumerate() {
    if in_string {
      out.push(c);
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }

    match c {
      '"' => {
        in_string = true;
        out.push(c);
      }
      ',' => {
        let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
        if !matches!(next, Some('}') | Some(']')) {
          out.push(c);
        }
      }
      _ => out.push(c),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_empty_output_is_null() {
    assert_eq!(parse_output("  \n ").unwrap(), Value::Null);
  }

  #[test]
  fn test_trailing_commas() {
    let text = "{\n  \"a\": [1, 2,],\n  \"b\": \"x,}\",\n}";
    assert_eq!(parse_output(text).unwrap(), json!({ "a": [1, 2], "b": "x,}" }));
  }

  #[test]
  fn test_scalars() {
    assert_eq!(parse_output("\"abc\"").unwrap(), json!("abc"));
    assert_eq!(parse_output(" 42 ").unwrap(), json!(42));
  }

  #[test]
  fn test_invalid_output() {
    let err = parse_output("{ \"a\": }").unwrap_err();
    assert!(err.starts_with("Unable to parse the JSON document"));
  }
}
