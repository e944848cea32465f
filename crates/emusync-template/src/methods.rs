//! Java-style methods on strings, lists, maps and scalars.

use indexmap::IndexMap;
use regex::Regex;

use crate::value::Value;

type MethodResult = Result<Value, String>;

pub(crate) fn call_method(target: &Value, name: &str, args: &[Value]) -> MethodResult {
  if target.is_nullish() {
    return Err(format!(
      "cannot invoke method '{}' on a null or undefined value",
      name
    ));
  }

  match (name, args) {
    ("toString", []) => return Ok(Value::String(target.java_string())),
    ("toJSON", []) => return Ok(target.clone()),
    ("equals", [other]) => return Ok(Value::Bool(target.loose_eq(other))),
    _ => {}
  }

  match target {
    Value::String(s) => string_method(s, name, args),
    Value::List(_) => list_method(target, name, args),
    Value::Map(_) => map_method(target, name, args),
    Value::Int(_) | Value::Float(_) => number_method(target, name, args),
    Value::Bool(b) if name == "booleanValue" && args.is_empty() => Ok(Value::Bool(*b)),
    other => Err(unknown_method(other, name, args)),
  }
}

fn unknown_method(target: &Value, name: &str, args: &[Value]) -> String {
  format!(
    "unknown method '{}' with {} argument(s) on {}",
    name,
    args.len(),
    target.type_name()
  )
}

fn str_arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<&'a str, String> {
  args
    .get(index)
    .and_then(Value::as_str)
    .ok_or_else(|| format!("{}: argument {} must be a string", method, index + 1))
}

fn int_arg(method: &str, args: &[Value], index: usize) -> Result<i64, String> {
  match args.get(index) {
    Some(Value::Int(i)) => Ok(*i),
    Some(Value::Float(f)) if f.fract() == 0.0 => Ok(*f as i64),
    _ => Err(format!(
      "{}: argument {} must be an integer",
      method,
      index + 1
    )),
  }
}

fn compile_regex(pattern: &str) -> Result<Regex, String> {
  Regex::new(pattern).map_err(|e| format!("invalid regular expression '{}': {}", pattern, e))
}

fn char_index(s: &str, needle_byte_index: Option<usize>) -> Value {
  match needle_byte_index {
    Some(byte_index) => Value::Int(s[..byte_index].chars().count() as i64),
    None => Value::Int(-1),
  }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> MethodResult {
  let value = match (name, args.len()) {
    ("length", 0) => Value::Int(s.chars().count() as i64),
    ("isEmpty", 0) => Value::Bool(s.is_empty()),
    ("contains", 1) => Value::Bool(s.contains(str_arg(name, args, 0)?)),
    ("startsWith", 1) => Value::Bool(s.starts_with(str_arg(name, args, 0)?)),
    ("endsWith", 1) => Value::Bool(s.ends_with(str_arg(name, args, 0)?)),
    ("toUpperCase", 0) => Value::string(s.to_uppercase()),
    ("toLowerCase", 0) => Value::string(s.to_lowercase()),
    ("trim", 0) => Value::string(s.trim()),
    ("concat", 1) => Value::string(format!("{}{}", s, str_arg(name, args, 0)?)),
    ("equalsIgnoreCase", 1) => Value::Bool(
      args[0]
        .as_str()
        .is_some_and(|other| other.to_lowercase() == s.to_lowercase()),
    ),
    ("replace", 2) => Value::string(s.replace(str_arg(name, args, 0)?, str_arg(name, args, 1)?)),
    ("replaceAll", 2) => {
      let re = compile_regex(str_arg(name, args, 0)?)?;
      Value::string(re.replace_all(s, str_arg(name, args, 1)?).into_owned())
    }
    ("replaceFirst", 2) => {
      let re = compile_regex(str_arg(name, args, 0)?)?;
      Value::string(re.replace(s, str_arg(name, args, 1)?).into_owned())
    }
    ("matches", 1) => {
      let re = compile_regex(&format!("^(?:{})$", str_arg(name, args, 0)?))?;
      Value::Bool(re.is_match(s))
    }
    ("split", 1) => {
      let re = compile_regex(str_arg(name, args, 0)?)?;
      let mut parts: Vec<&str> = re.split(s).collect();
      // Java drops trailing empty strings.
      while parts.len() > 1 && parts.last() == Some(&"") {
        parts.pop();
      }
      Value::new_list(parts.into_iter().map(Value::string).collect())
    }
    ("substring", 1 | 2) => {
      let chars: Vec<char> = s.chars().collect();
      let begin = int_arg(name, args, 0)?;
      let end = if args.len() == 2 {
        int_arg(name, args, 1)?
      } else {
        chars.len() as i64
      };
      if begin < 0 || end > chars.len() as i64 || begin > end {
        return Err(format!(
          "substring({}, {}) out of range for length {}",
          begin,
          end,
          chars.len()
        ));
      }
      Value::string(chars[begin as usize..end as usize].iter().collect::<String>())
    }
    ("charAt", 1) => {
      let index = int_arg(name, args, 0)?;
      match usize::try_from(index).ok().and_then(|i| s.chars().nth(i)) {
        Some(c) => Value::string(c.to_string()),
        None => return Err(format!("charAt({}) out of range", index)),
      }
    }
    ("indexOf", 1) => char_index(s, s.find(str_arg(name, args, 0)?)),
    ("lastIndexOf", 1) => char_index(s, s.rfind(str_arg(name, args, 0)?)),
    _ => return Err(unknown_method(&Value::string(s), name, args)),
  };
  Ok(value)
}

fn list_index(method: &str, args: &[Value], index: usize, len: usize) -> Result<usize, String> {
  let i = int_arg(method, args, index)?;
  usize::try_from(i)
    .ok()
    .filter(|i| *i < len)
    .ok_or_else(|| format!("{}: index {} out of bounds for length {}", method, i, len))
}

fn list_method(target: &Value, name: &str, args: &[Value]) -> MethodResult {
  let Value::List(list) = target else {
    return Err(unknown_method(target, name, args));
  };

  let value = match (name, args.len()) {
    ("size", 0) => Value::Int(list.borrow().len() as i64),
    ("isEmpty", 0) => Value::Bool(list.borrow().is_empty()),
    ("add", 1) => {
      list.borrow_mut().push(args[0].clone());
      Value::Bool(true)
    }
    ("add", 2) => {
      let len = list.borrow().len();
      let i = int_arg(name, args, 0)?;
      let index = usize::try_from(i)
        .ok()
        .filter(|i| *i <= len)
        .ok_or_else(|| format!("add: index {} out of bounds for length {}", i, len))?;
      list.borrow_mut().insert(index, args[1].clone());
      Value::Undefined
    }
    ("addAll", 1) => {
      let Value::List(other) = &args[0] else {
        return Err("addAll: argument must be a list".to_string());
      };
      let items: Vec<Value> = other.borrow().clone();
      list.borrow_mut().extend(items);
      Value::Bool(true)
    }
    ("get", 1) => {
      let len = list.borrow().len();
      let index = list_index(name, args, 0, len)?;
      list.borrow()[index].clone()
    }
    ("set", 2) => {
      let len = list.borrow().len();
      let index = list_index(name, args, 0, len)?;
      std::mem::replace(&mut list.borrow_mut()[index], args[1].clone())
    }
    ("contains", 1) => Value::Bool(list.borrow().iter().any(|v| v.loose_eq(&args[0]))),
    ("indexOf", 1) => Value::Int(
      list
        .borrow()
        .iter()
        .position(|v| v.loose_eq(&args[0]))
        .map(|i| i as i64)
        .unwrap_or(-1),
    ),
    ("remove", 1) => match &args[0] {
      Value::Int(_) => {
        let len = list.borrow().len();
        let index = list_index(name, args, 0, len)?;
        list.borrow_mut().remove(index)
      }
      needle => {
        let position = list.borrow().iter().position(|v| v.loose_eq(needle));
        match position {
          Some(i) => {
            list.borrow_mut().remove(i);
            Value::Bool(true)
          }
          None => Value::Bool(false),
        }
      }
    },
    ("clear", 0) => {
      list.borrow_mut().clear();
      Value::Undefined
    }
    ("subList", 2) => {
      let items = list.borrow();
      let from = int_arg(name, args, 0)?;
      let to = int_arg(name, args, 1)?;
      if from < 0 || to > items.len() as i64 || from > to {
        return Err(format!("subList({}, {}) out of range", from, to));
      }
      Value::new_list(items[from as usize..to as usize].to_vec())
    }
    _ => return Err(unknown_method(target, name, args)),
  };
  Ok(value)
}

fn map_key(method: &str, args: &[Value]) -> Result<String, String> {
  match args.first() {
    Some(Value::String(s)) => Ok(s.clone()),
    Some(v) if !v.is_nullish() => Ok(v.java_string()),
    _ => Err(format!("{}: key must not be null", method)),
  }
}

fn map_method(target: &Value, name: &str, args: &[Value]) -> MethodResult {
  let Value::Map(map) = target else {
    return Err(unknown_method(target, name, args));
  };

  let value = match (name, args.len()) {
    ("size", 0) => Value::Int(map.borrow().len() as i64),
    ("isEmpty", 0) => Value::Bool(map.borrow().is_empty()),
    ("get", 1) => map
      .borrow()
      .get(&map_key(name, args)?)
      .cloned()
      .unwrap_or(Value::Null),
    ("put", 2) => {
      let key = map_key(name, args)?;
      map
        .borrow_mut()
        .insert(key, args[1].clone())
        .unwrap_or(Value::Null)
    }
    ("putAll", 1) => {
      let Value::Map(other) = &args[0] else {
        return Err("putAll: argument must be a map".to_string());
      };
      let entries: Vec<(String, Value)> = other
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
      map.borrow_mut().extend(entries);
      Value::Undefined
    }
    ("containsKey", 1) => Value::Bool(map.borrow().contains_key(&map_key(name, args)?)),
    ("containsValue", 1) => Value::Bool(map.borrow().values().any(|v| v.loose_eq(&args[0]))),
    ("keySet", 0) => Value::new_list(map.borrow().keys().map(Value::string).collect()),
    ("values", 0) => Value::new_list(map.borrow().values().cloned().collect()),
    ("entrySet", 0) => Value::new_list(
      map
        .borrow()
        .iter()
        .map(|(k, v)| {
          let mut entry = IndexMap::new();
          entry.insert("key".to_string(), Value::string(k));
          entry.insert("value".to_string(), v.clone());
          Value::new_map(entry)
        })
        .collect(),
    ),
    ("remove", 1) => map
      .borrow_mut()
      .shift_remove(&map_key(name, args)?)
      .unwrap_or(Value::Null),
    ("clear", 0) => {
      map.borrow_mut().clear();
      Value::Undefined
    }
    // Bean-style getters, e.g. `$entry.getKey()`.
    (getter, 0) if getter.len() > 3 && getter.starts_with("get") => {
      let mut chars = getter[3..].chars();
      let property: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
      };
      map.borrow().get(&property).cloned().unwrap_or(Value::Null)
    }
    _ => return Err(unknown_method(target, name, args)),
  };
  Ok(value)
}

fn number_method(target: &Value, name: &str, args: &[Value]) -> MethodResult {
  let value = match (name, target) {
    ("intValue" | "longValue", Value::Int(i)) => Value::Int(*i),
    ("intValue" | "longValue", Value::Float(f)) => Value::Int(f.trunc() as i64),
    ("doubleValue" | "floatValue", v) => match v.as_f64() {
      Some(f) => Value::Float(f),
      None => return Err(unknown_method(target, name, args)),
    },
    _ => return Err(unknown_method(target, name, args)),
  };
  if !args.is_empty() {
    return Err(unknown_method(target, name, args));
  }
  Ok(value)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn call(target: &Value, name: &str, args: Vec<Value>) -> Value {
    call_method(target, name, &args).unwrap()
  }

  #[test]
  fn test_string_methods() {
    let s = Value::string("Hello, World");
    assert_eq!(call(&s, "length", vec![]).to_json(), json!(12));
    assert_eq!(call(&s, "toUpperCase", vec![]).to_json(), json!("HELLO, WORLD"));
    assert_eq!(
      call(&s, "substring", vec![Value::Int(7)]).to_json(),
      json!("World")
    );
    assert_eq!(
      call(&s, "indexOf", vec![Value::string("World")]).to_json(),
      json!(7)
    );
    assert_eq!(
      call(&s, "replaceAll", vec![Value::string("[lo]"), Value::string("_")]).to_json(),
      json!("He___, W_r_d")
    );
    assert_eq!(
      call(&s, "matches", vec![Value::string("Hello.*")]).to_json(),
      json!(true)
    );
    assert_eq!(
      call(&s, "matches", vec![Value::string("World")]).to_json(),
      json!(false)
    );
  }

  #[test]
  fn test_split_drops_trailing_empties() {
    let s = Value::string("a|b|c||");
    assert_eq!(
      call(&s, "split", vec![Value::string(r"\|")]).to_json(),
      json!(["a", "b", "c"])
    );
  }

  #[test]
  fn test_list_mutation_is_shared() {
    let list = Value::from_json(&json!([1]));
    let alias = list.clone();
    assert_eq!(call(&list, "add", vec![Value::Int(2)]).to_json(), json!(true));
    assert_eq!(alias.to_json(), json!([1, 2]));
    assert_eq!(call(&alias, "size", vec![]).to_json(), json!(2));
  }

  #[test]
  fn test_list_remove_by_index_and_value() {
    let list = Value::from_json(&json!(["a", "b", "c"]));
    assert_eq!(call(&list, "remove", vec![Value::Int(0)]).to_json(), json!("a"));
    assert_eq!(
      call(&list, "remove", vec![Value::string("c")]).to_json(),
      json!(true)
    );
    assert_eq!(list.to_json(), json!(["b"]));
  }

  #[test]
  fn test_list_get_out_of_bounds_errors() {
    let list = Value::from_json(&json!([]));
    assert!(call_method(&list, "get", &[Value::Int(0)]).is_err());
  }

  #[test]
  fn test_map_methods() {
    let map = Value::from_json(&json!({ "a": 1 }));
    assert_eq!(
      call(&map, "put", vec![Value::string("b"), Value::Int(2)]).to_json(),
      json!(null)
    );
    assert_eq!(call(&map, "keySet", vec![]).to_json(), json!(["a", "b"]));
    assert_eq!(
      call(&map, "containsKey", vec![Value::string("b")]).to_json(),
      json!(true)
    );
    assert_eq!(
      call(&map, "entrySet", vec![]).to_json(),
      json!([{ "key": "a", "value": 1 }, { "key": "b", "value": 2 }])
    );
    assert_eq!(call(&map, "remove", vec![Value::string("a")]).to_json(), json!(1));
    assert_eq!(map.to_json(), json!({ "b": 2 }));
  }

  #[test]
  fn test_bean_getter_on_entry() {
    let entry = Value::from_json(&json!({ "key": "k", "value": 1 }));
    assert_eq!(call(&entry, "getKey", vec![]).to_json(), json!("k"));
    assert_eq!(call(&entry, "getValue", vec![]).to_json(), json!(1));
  }

  #[test]
  fn test_method_on_null_is_error() {
    let err = call_method(&Value::Undefined, "size", &[]).unwrap_err();
    assert!(err.contains("size"));
  }

  #[test]
  fn test_to_string_and_to_json() {
    let map = Value::from_json(&json!({ "pk": "pk-123", "sk": "sk" }));
    assert_eq!(
      call(&map, "toString", vec![]).to_json(),
      json!("{pk=pk-123, sk=sk}")
    );
    assert_eq!(call(&map, "toJSON", vec![]).render(), "{pk=pk-123, sk=sk}");
  }
}
