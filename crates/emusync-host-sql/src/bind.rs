use serde_json::{Map, Value};

use crate::error::SqlError;

/// Rewrite `:name` placeholders to positional `?` and collect their values in order.
///
/// Placeholders inside quoted text are left alone. `variableMap` keys may be
/// written with or without the leading colon.
pub(crate) fn positional(
  statement: &str,
  variables: &Map<String, Value>,
) -> Result<(String, Vec<Value>), SqlError> {
  let chars: Vec<char> = statement.chars().collect();
  let mut sql = String::with_capacity(statement.len());
  let mut values = Vec::new();
  let mut quote: Option<char> = None;
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    if let Some(q) = quote {
      sql.push(c);
      if c == q {
        quote = None;
      }
      i += 1;
      continue;
    }

    match c {
      '\'' | '"' | '`' => {
        quote = Some(c);
        sql.push(c);
        i += 1;
      }
      ':' if chars.get(i + 1).is_some_and(|n| n.is_alphabetic() || *n == '_')
        && chars.get(i.wrapping_sub(1)) != Some(&':') =>
      {
        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
          end += 1;
        }
        let name: String = chars[start..end].iter().collect();
        let value = variables
          .get(&format!(":{}", name))
          .or_else(|| variables.get(&name))
          .ok_or_else(|| SqlError::MissingVariable { name: name.clone() })?;
        values.push(value.clone());
        sql.push('?');
        i = end;
      }
      _ => {
        sql.push(c);
        i += 1;
      }
    }
  }

  Ok((sql, values))
}
