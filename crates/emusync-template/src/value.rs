//! Runtime values of the template language.
//!
//! Lists and maps are shared and mutable, like Java collections: `#set($a = $b)`
//! aliases, and `$a.put(...)` is visible through `$b`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Number};

pub(crate) type ListRef = Rc<RefCell<Vec<Value>>>;
pub(crate) type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

const THIS_MAP: &str = "(this Map)";
const THIS_COLLECTION: &str = "(this Collection)";

/// `$util` and its sub-namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Namespace {
  Util,
  Time,
  List,
  Map,
  Math,
  Dynamodb,
  Rds,
}

impl Namespace {
  pub fn child(&self, name: &str) -> Option<Namespace> {
    if *self != Namespace::Util {
      return None;
    }
    match name {
      "time" => Some(Namespace::Time),
      "list" => Some(Namespace::List),
      "map" => Some(Namespace::Map),
      "math" => Some(Namespace::Math),
      "dynamodb" => Some(Namespace::Dynamodb),
      "rds" => Some(Namespace::Rds),
      _ => None,
    }
  }

  pub fn path(&self) -> &'static str {
    match self {
      Namespace::Util => "$util",
      Namespace::Time => "$util.time",
      Namespace::List => "$util.list",
      Namespace::Map => "$util.map",
      Namespace::Math => "$util.math",
      Namespace::Dynamodb => "$util.dynamodb",
      Namespace::Rds => "$util.rds",
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
  /// A reference that resolved to nothing. Distinct from `null` only in
  /// how it is produced; both render as the empty string.
  Undefined,
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(ListRef),
  Map(MapRef),
  Util(Namespace),
}

impl Value {
  pub fn string(s: impl Into<String>) -> Self {
    Value::String(s.into())
  }

  pub fn new_list(items: Vec<Value>) -> Self {
    Value::List(Rc::new(RefCell::new(items)))
  }

  pub fn new_map(entries: IndexMap<String, Value>) -> Self {
    Value::Map(Rc::new(RefCell::new(entries)))
  }

  pub fn from_json(json: &serde_json::Value) -> Self {
    match json {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(*b),
      serde_json::Value::Number(n) => match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
      },
      serde_json::Value::String(s) => Value::String(s.clone()),
      serde_json::Value::Array(items) => Value::new_list(items.iter().map(Value::from_json).collect()),
      serde_json::Value::Object(entries) => Value::new_map(
        entries
          .iter()
          .map(|(k, v)| (k.clone(), Value::from_json(v)))
          .collect(),
      ),
    }
  }

  /// JSON form. A container nested inside itself is written as Java's
  /// `(this Map)` / `(this Collection)` placeholder.
  pub fn to_json(&self) -> serde_json::Value {
    self.json_within(&mut Vec::new())
  }

  fn json_within(&self, ancestors: &mut Vec<*const ()>) -> serde_json::Value {
    match self {
      Value::Undefined | Value::Null | Value::Util(_) => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Int(i) => serde_json::Value::Number((*i).into()),
      Value::Float(f) => Number::from_f64(*f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null),
      Value::String(s) => serde_json::Value::String(s.clone()),
      Value::List(items) => {
        let ptr = Rc::as_ptr(items) as *const ();
        if ancestors.contains(&ptr) {
          return serde_json::Value::String(THIS_COLLECTION.to_string());
        }
        ancestors.push(ptr);
        let array = items.borrow().iter().map(|v| v.json_within(ancestors)).collect();
        ancestors.pop();
        serde_json::Value::Array(array)
      }
      Value::Map(entries) => {
        let ptr = Rc::as_ptr(entries) as *const ();
        if ancestors.contains(&ptr) {
          return serde_json::Value::String(THIS_MAP.to_string());
        }
        ancestors.push(ptr);
        let mut map = Map::new();
        for (k, v) in entries.borrow().iter() {
          map.insert(k.clone(), v.json_within(ancestors));
        }
        ancestors.pop();
        serde_json::Value::Object(map)
      }
    }
  }

  /// Empty every list and map reachable from this value.
  ///
  /// Containers can be put inside themselves, and an `Rc` cycle is never
  /// freed on its own.
  pub fn release(self) {
    let mut pending = vec![self];
    while let Some(value) = pending.pop() {
      match value {
        Value::List(items) => pending.extend(std::mem::take(&mut *items.borrow_mut())),
        Value::Map(entries) => {
          pending.extend(std::mem::take(&mut *entries.borrow_mut()).into_values())
        }
        _ => {}
      }
    }
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  pub fn is_truthy(&self) -> bool {
    !matches!(self, Value::Undefined | Value::Null | Value::Bool(false))
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::Float(f) => Some(*f),
      _ => None,
    }
  }

  pub fn is_number(&self) -> bool {
    matches!(self, Value::Int(_) | Value::Float(_))
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "null",
      Value::Bool(_) => "boolean",
      Value::Int(_) | Value::Float(_) => "number",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Util(_) => "namespace",
    }
  }

  /// Text written to the output when the value is interpolated.
  pub fn render(&self) -> String {
    match self {
      Value::Undefined | Value::Null => String::new(),
      Value::String(s) => s.clone(),
      other => other.java_string(),
    }
  }

  /// Java `toString()` form: `[a, b]`, `{k=v}`, `1.0`, `null`.
  pub fn java_string(&self) -> String {
    let mut out = String::new();
    self.write_java(&mut out, &mut Vec::new());
    out
  }

  fn write_java(&self, out: &mut String, ancestors: &mut Vec<*const ()>) {
    match self {
      Value::Undefined | Value::Null => out.push_str("null"),
      Value::Bool(b) => out.push_str(&b.to_string()),
      Value::Int(i) => out.push_str(&i.to_string()),
      Value::Float(f) => out.push_str(&format_float(*f)),
      Value::String(s) => out.push_str(s),
      Value::List(items) => {
        let ptr = Rc::as_ptr(items) as *const ();
        if ancestors.contains(&ptr) {
          out.push_str(THIS_COLLECTION);
          return;
        }
        ancestors.push(ptr);
        out.push('[');
        for (i, item) in items.borrow().iter().enumerate() {
          if i > 0 {
            out.push_str(", ");
          }
          item.write_java(out, ancestors);
        }
        out.push(']');
        ancestors.pop();
      }
      Value::Map(entries) => {
        let ptr = Rc::as_ptr(entries) as *const ();
        if ancestors.contains(&ptr) {
          out.push_str(THIS_MAP);
          return;
        }
        ancestors.push(ptr);
        out.push('{');
        for (i, (k, v)) in entries.borrow().iter().enumerate() {
          if i > 0 {
            out.push_str(", ");
          }
          out.push_str(k);
          out.push('=');
          v.write_java(out, ancestors);
        }
        out.push('}');
        ancestors.pop();
      }
      Value::Util(ns) => out.push_str(ns.path()),
    }
  }

  /// `==` semantics. `Undefined` and `null` only equal each other.
  pub fn loose_eq(&self, other: &Value) -> bool {
    self.eq_within(other, &mut Vec::new())
  }

  /// `pairs` holds the container pairs already being compared further up;
  /// meeting one again means the two structures recurse the same way.
  fn eq_within(&self, other: &Value, pairs: &mut Vec<(*const (), *const ())>) -> bool {
    match (self, other) {
      (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
      (Value::Int(a), Value::Int(b)) => a == b,
      (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::List(a), Value::List(b)) => {
        if Rc::ptr_eq(a, b) {
          return true;
        }
        let pair = (Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ());
        if pairs.contains(&pair) {
          return true;
        }
        pairs.push(pair);
        let a = a.borrow();
        let b = b.borrow();
        let equal =
          a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_within(y, pairs));
        pairs.pop();
        equal
      }
      (Value::Map(a), Value::Map(b)) => {
        if Rc::ptr_eq(a, b) {
          return true;
        }
        let pair = (Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ());
        if pairs.contains(&pair) {
          return true;
        }
        pairs.push(pair);
        let a = a.borrow();
        let b = b.borrow();
        let equal = a.len() == b.len()
          && a
            .iter()
            .all(|(k, v)| b.get(k).is_some_and(|other| v.eq_within(other, pairs)));
        pairs.pop();
        equal
      }
      (Value::Util(a), Value::Util(b)) => a == b,
      // Mixed scalar types compare by their string form.
      (Value::String(s), other) | (other, Value::String(s))
        if matches!(other, Value::Int(_) | Value::Float(_) | Value::Bool(_)) =>
      {
        *s == other.java_string()
      }
      _ => false,
    }
  }

  pub fn compare(&self, other: &Value) -> Option<Ordering> {
    match (self, other) {
      (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
      (a, b) if a.is_number() && b.is_number() => a.as_f64()?.partial_cmp(&b.as_f64()?),
      (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
      _ => None,
    }
  }
}

fn format_float(f: f64) -> String {
  if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
    format!("{:.1}", f)
  } else {
    f.to_string()
  }
}
