//! Condition, key-condition, filter and update expressions.
//!
//! Supports the subset resolvers use in practice: comparisons, `AND`/`OR`/`NOT`,
//! `attribute_exists`, `attribute_not_exists`, `begins_with`, `contains`,
//! `BETWEEN`, and `SET`/`REMOVE`/`ADD`/`DELETE` update clauses with
//! `if_not_exists`, `list_append` and `+`/`-`. Paths are top-level attribute names.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::codec::{as_number, compare, number_text, single_entry};
use crate::error::KvError;

/// Expression with its `#name` and `:value` placeholders, as sent by a template.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExpressionDef {
  pub expression: String,
  #[serde(default)]
  pub expression_names: HashMap<String, String>,
  #[serde(default)]
  pub expression_values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Name(String),
  Value(String),
  Ident(String),
  Op(&'static str),
  LParen,
  RParen,
  Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, KvError> {
  let chars: Vec<char> = source.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;

  let word = |start: usize| {
    let mut end = start;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
      end += 1;
    }
    (chars[start..end].iter().collect::<String>(), end)
  };

  while i < chars.len() {
    let c = chars[i];
    match c {
      c if c.is_whitespace() => i += 1,
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        i += 1;
      }
      '#' | ':' => {
        let (name, end) = word(i + 1);
        if name.is_empty() {
          return Err(KvError::validation(format!(
            "invalid expression placeholder at offset {}",
            i
          )));
        }
        let placeholder = format!("{}{}", c, name);
        tokens.push(if c == '#' {
          Token::Name(placeholder)
        } else {
          Token::Value(placeholder)
        });
        i = end;
      }
      '<' if chars.get(i + 1) == Some(&'>') => {
        tokens.push(Token::Op("<>"));
        i += 2;
      }
      '<' | '>' if chars.get(i + 1) == Some(&'=') => {
        tokens.push(Token::Op(if c == '<' { "<=" } else { ">=" }));
        i += 2;
      }
      '<' => {
        tokens.push(Token::Op("<"));
        i += 1;
      }
      '>' => {
        tokens.push(Token::Op(">"));
        i += 1;
      }
      '=' => {
        tokens.push(Token::Op("="));
        i += 1;
      }
      '+' => {
        tokens.push(Token::Op("+"));
        i += 1;
      }
      '-' => {
        tokens.push(Token::Op("-"));
        i += 1;
      }
      c if c.is_alphanumeric() || c == '_' => {
        let (ident, end) = word(i);
        tokens.push(Token::Ident(ident));
        i = end;
      }
      other => {
        return Err(KvError::validation(format!(
          "unexpected character '{}' in expression",
          other
        )));
      }
    }
  }
  Ok(tokens)
}

#[derive(Debug, Clone)]
pub(crate) enum Operand {
  Path(String),
  Value(Value),
}

impl Operand {
  fn resolve<'a>(&'a self, item: &'a Map<String, Value>) -> Option<&'a Value> {
    match self {
      Operand::Path(name) => item.get(name),
      Operand::Value(value) => Some(value),
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) enum Condition {
  And(Box<Condition>, Box<Condition>),
  Or(Box<Condition>, Box<Condition>),
  Not(Box<Condition>),
  Compare {
    left: Operand,
    op: &'static str,
    right: Operand,
  },
  Between {
    value: Operand,
    low: Operand,
    high: Operand,
  },
  Exists(String),
  NotExists(String),
  BeginsWith(Operand, Operand),
  Contains(Operand, Operand),
}

impl Condition {
  pub fn parse(def: &ExpressionDef) -> Result<Self, KvError> {
    let mut parser = Parser::new(def)?;
    let condition = parser.or()?;
    parser.finish()?;
    Ok(condition)
  }

  pub fn matches(&self, item: &Map<String, Value>) -> bool {
    match self {
      Condition::And(a, b) => a.matches(item) && b.matches(item),
      Condition::Or(a, b) => a.matches(item) || b.matches(item),
      Condition::Not(inner) => !inner.matches(item),
      Condition::Compare { left, op, right } => {
        let (Some(l), Some(r)) = (left.resolve(item), right.resolve(item)) else {
          return false;
        };
        let ordering = compare(l, r);
        match *op {
          "=" => ordering == Some(Ordering::Equal),
          "<>" => ordering != Some(Ordering::Equal),
          "<" => ordering == Some(Ordering::Less),
          "<=" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
          ">" => ordering == Some(Ordering::Greater),
          ">=" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
          _ => false,
        }
      }
      Condition::Between { value, low, high } => {
        let (Some(v), Some(lo), Some(hi)) = (value.resolve(item), low.resolve(item), high.resolve(item))
        else {
          return false;
        };
        matches!(compare(v, lo), Some(Ordering::Greater | Ordering::Equal))
          && matches!(compare(v, hi), Some(Ordering::Less | Ordering::Equal))
      }
      Condition::Exists(name) => item.contains_key(name),
      Condition::NotExists(name) => !item.contains_key(name),
      Condition::BeginsWith(target, prefix) => {
        match (target.resolve(item).and_then(single_entry), prefix.resolve(item).and_then(single_entry)) {
          (Some(("S", Value::String(s))), Some(("S", Value::String(p)))) => s.starts_with(p.as_str()),
          _ => false,
        }
      }
      Condition::Contains(target, needle) => {
        let (Some(target), Some(needle)) = (target.resolve(item), needle.resolve(item)) else {
          return false;
        };
        match (single_entry(target), single_entry(needle)) {
          (Some(("S", Value::String(s))), Some(("S", Value::String(n)))) => s.contains(n.as_str()),
          (Some(("SS" | "NS" | "BS", Value::Array(members))), Some((_, member))) => {
            members.contains(member)
          }
          (Some(("L", Value::Array(items))), _) => items.contains(needle),
          _ => false,
        }
      }
    }
  }
}

#[derive(Debug, Clone)]
enum SetValue {
  Operand(Operand),
  IfNotExists(String, Operand),
  ListAppend(Operand, Operand),
  Plus(Box<SetValue>, Box<SetValue>),
  Minus(Box<SetValue>, Box<SetValue>),
}

impl SetValue {
  fn evaluate(&self, item: &Map<String, Value>) -> Result<Value, KvError> {
    let missing = |name: &str| {
      KvError::validation(format!(
        "The provided expression refers to an attribute that does not exist in the item: {}",
        name
      ))
    };
    let resolve = |operand: &Operand| -> Result<Value, KvError> {
      match operand {
        Operand::Path(name) => item.get(name).cloned().ok_or_else(|| missing(name)),
        Operand::Value(value) => Ok(value.clone()),
      }
    };

    match self {
      SetValue::Operand(operand) => resolve(operand),
      SetValue::IfNotExists(name, fallback) => match item.get(name) {
        Some(existing) => Ok(existing.clone()),
        None => resolve(fallback),
      },
      SetValue::ListAppend(a, b) => {
        let (a, b) = (resolve(a)?, resolve(b)?);
        match (single_entry(&a), single_entry(&b)) {
          (Some(("L", Value::Array(x))), Some(("L", Value::Array(y)))) => {
            let mut joined = x.clone();
            joined.extend(y.iter().cloned());
            Ok(json!({ "L": joined }))
          }
          _ => Err(KvError::validation("list_append requires two list operands")),
        }
      }
      SetValue::Plus(a, b) | SetValue::Minus(a, b) => {
        let (a, b) = (a.evaluate(item)?, b.evaluate(item)?);
        let (Some(x), Some(y)) = (as_number(&a), as_number(&b)) else {
          return Err(KvError::validation("arithmetic requires number operands"));
        };
        let n = if matches!(self, SetValue::Plus(..)) { x + y } else { x - y };
        Ok(json!({ "N": number_text(n) }))
      }
    }
  }
}

/// Parsed `UpdateExpression`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Update {
  set: Vec<(String, SetValue)>,
  remove: Vec<String>,
  add: Vec<(String, Value)>,
  delete: Vec<(String, Value)>,
}

impl Update {
  pub fn parse(def: &ExpressionDef) -> Result<Self, KvError> {
    let mut parser = Parser::new(def)?;
    let mut update = Update::default();

    while !parser.at_end() {
      let clause = parser.ident()?.to_ascii_uppercase();
      loop {
        match clause.as_str() {
          "SET" => {
            let path = parser.path()?;
            parser.expect_op("=")?;
            let value = parser.set_value()?;
            update.set.push((path, value));
          }
          "REMOVE" => update.remove.push(parser.path()?),
          "ADD" | "DELETE" => {
            let path = parser.path()?;
            let value = parser.value()?;
            if clause == "ADD" {
              update.add.push((path, value));
            } else {
              update.delete.push((path, value));
            }
          }
          other => {
            return Err(KvError::validation(format!("unknown update clause: {}", other)));
          }
        }
        if !parser.eat(&Token::Comma) {
          break;
        }
      }
    }

    Ok(update)
  }

  /// Apply the update to `item` in place. Every right-hand side is evaluated
  /// against the item as it was before the update.
  pub fn apply(&self, item: &mut Map<String, Value>) -> Result<(), KvError> {
    let before = item.clone();

    for (path, value) in &self.set {
      item.insert(path.clone(), value.evaluate(&before)?);
    }
    for path in &self.remove {
      item.remove(path);
    }
    for (path, value) in &self.add {
      let merged = match (before.get(path), single_entry(value)) {
        (None, _) => value.clone(),
        (Some(existing), Some(("N", _))) => {
          let (Some(x), Some(y)) = (as_number(existing), as_number(value)) else {
            return Err(KvError::validation("ADD requires matching operand types"));
          };
          json!({ "N": number_text(x + y) })
        }
        (Some(existing), Some((tag @ ("SS" | "NS" | "BS"), Value::Array(extra)))) => {
          let Some((existing_tag, Value::Array(members))) = single_entry(existing) else {
            return Err(KvError::validation("ADD requires matching operand types"));
          };
          if existing_tag != tag {
            return Err(KvError::validation("ADD requires matching operand types"));
          }
          let mut members = members.clone();
          for member in extra {
            if !members.contains(member) {
              members.push(member.clone());
            }
          }
          json!({ tag: members })
        }
        _ => return Err(KvError::validation("ADD supports only numbers and sets")),
      };
      item.insert(path.clone(), merged);
    }
    for (path, value) in &self.delete {
      let Some(existing) = item.get(path).cloned() else {
        continue;
      };
      match (single_entry(&existing), single_entry(value)) {
        (Some((tag, Value::Array(members))), Some((other, Value::Array(removed)))) if tag == other => {
          let kept: Vec<Value> = members.iter().filter(|m| !removed.contains(m)).cloned().collect();
          if kept.is_empty() {
            item.remove(path);
          } else {
            item.insert(path.clone(), json!({ tag: kept }));
          }
        }
        _ => return Err(KvError::validation("DELETE supports only sets")),
      }
    }
    Ok(())
  }
}

struct Parser<'a> {
  tokens: Vec<Token>,
  pos: usize,
  def: &'a ExpressionDef,
}

impl<'a> Parser<'a> {
  fn new(def: &'a ExpressionDef) -> Result<Self, KvError> {
    Ok(Self {
      tokens: tokenize(&def.expression)?,
      pos: 0,
      def,
    })
  }

  fn at_end(&self) -> bool {
    self.pos >= self.tokens.len()
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn next(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    token
  }

  fn eat(&mut self, token: &Token) -> bool {
    if self.peek() == Some(token) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn eat_keyword(&mut self, keyword: &str) -> bool {
    match self.peek() {
      Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword) => {
        self.pos += 1;
        true
      }
      _ => false,
    }
  }

  fn expect(&mut self, token: Token) -> Result<(), KvError> {
    if self.eat(&token) {
      Ok(())
    } else {
      Err(self.unexpected())
    }
  }

  fn expect_op(&mut self, op: &'static str) -> Result<(), KvError> {
    self.expect(Token::Op(op))
  }

  fn unexpected(&self) -> KvError {
    match self.peek() {
      Some(token) => KvError::validation(format!(
        "Invalid expression \"{}\": unexpected token {:?}",
        self.def.expression, token
      )),
      None => KvError::validation(format!(
        "Invalid expression \"{}\": unexpected end of expression",
        self.def.expression
      )),
    }
  }

  fn finish(&self) -> Result<(), KvError> {
    if self.at_end() {
      Ok(())
    } else {
      Err(self.unexpected())
    }
  }

  fn ident(&mut self) -> Result<String, KvError> {
    match self.next() {
      Some(Token::Ident(word)) => Ok(word),
      _ => {
        self.pos -= 1;
        Err(self.unexpected())
      }
    }
  }

  fn path(&mut self) -> Result<String, KvError> {
    match self.next() {
      Some(Token::Ident(word)) => Ok(word),
      Some(Token::Name(placeholder)) => self
        .def
        .expression_names
        .get(&placeholder)
        .cloned()
        .ok_or_else(|| {
          KvError::validation(format!(
            "An expression attribute name used in the document path is not defined; attribute name: {}",
            placeholder
          ))
        }),
      _ => {
        self.pos -= 1;
        Err(self.unexpected())
      }
    }
  }

  fn value(&mut self) -> Result<Value, KvError> {
    match self.next() {
      Some(Token::Value(placeholder)) => self
        .def
        .expression_values
        .get(&placeholder)
        .cloned()
        .ok_or_else(|| {
          KvError::validation(format!(
            "An expression attribute value used in expression is not defined; attribute value: {}",
            placeholder
          ))
        }),
      _ => {
        self.pos -= 1;
        Err(self.unexpected())
      }
    }
  }

  fn operand(&mut self) -> Result<Operand, KvError> {
    match self.peek() {
      Some(Token::Value(_)) => self.value().map(Operand::Value),
      _ => self.path().map(Operand::Path),
    }
  }

  fn or(&mut self) -> Result<Condition, KvError> {
    let mut left = self.and()?;
    while self.eat_keyword("OR") {
      let right = self.and()?;
      left = Condition::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn and(&mut self) -> Result<Condition, KvError> {
    let mut left = self.not()?;
    while self.eat_keyword("AND") {
      let right = self.not()?;
      left = Condition::And(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn not(&mut self) -> Result<Condition, KvError> {
    if self.eat_keyword("NOT") {
      return Ok(Condition::Not(Box::new(self.not()?)));
    }
    self.primary()
  }

  fn primary(&mut self) -> Result<Condition, KvError> {
    if self.eat(&Token::LParen) {
      let inner = self.or()?;
      self.expect(Token::RParen)?;
      return Ok(inner);
    }

    if let Some(Token::Ident(word)) = self.peek().cloned() {
      if self.tokens.get(self.pos + 1) == Some(&Token::LParen) {
        self.pos += 2;
        let condition = match word.as_str() {
          "attribute_exists" => Condition::Exists(self.path()?),
          "attribute_not_exists" => Condition::NotExists(self.path()?),
          "begins_with" => {
            let target = self.operand()?;
            self.expect(Token::Comma)?;
            Condition::BeginsWith(target, self.operand()?)
          }
          "contains" => {
            let target = self.operand()?;
            self.expect(Token::Comma)?;
            Condition::Contains(target, self.operand()?)
          }
          other => {
            return Err(KvError::validation(format!(
              "Invalid function name; function: {}",
              other
            )));
          }
        };
        self.expect(Token::RParen)?;
        return Ok(condition);
      }
    }

    let left = self.operand()?;
    if self.eat_keyword("BETWEEN") {
      let low = self.operand()?;
      if !self.eat_keyword("AND") {
        return Err(self.unexpected());
      }
      let high = self.operand()?;
      return Ok(Condition::Between {
        value: left,
        low,
        high,
      });
    }

    let op = match self.next() {
      Some(Token::Op(op)) if matches!(op, "=" | "<>" | "<" | "<=" | ">" | ">=") => op,
      _ => {
        self.pos -= 1;
        return Err(self.unexpected());
      }
    };
    let right = self.operand()?;
    Ok(Condition::Compare { left, op, right })
  }

  fn set_value(&mut self) -> Result<SetValue, KvError> {
    let mut left = self.set_term()?;
    loop {
      if self.eat(&Token::Op("+")) {
        left = SetValue::Plus(Box::new(left), Box::new(self.set_term()?));
      } else if self.eat(&Token::Op("-")) {
        left = SetValue::Minus(Box::new(left), Box::new(self.set_term()?));
      } else {
        return Ok(left);
      }
    }
  }

  fn set_term(&mut self) -> Result<SetValue, KvError> {
    if let Some(Token::Ident(word)) = self.peek().cloned() {
      if self.tokens.get(self.pos + 1) == Some(&Token::LParen) {
        self.pos += 2;
        let value = match word.as_str() {
          "if_not_exists" => {
            let path = self.path()?;
            self.expect(Token::Comma)?;
            SetValue::IfNotExists(path, self.operand()?)
          }
          "list_append" => {
            let a = self.operand()?;
            self.expect(Token::Comma)?;
            SetValue::ListAppend(a, self.operand()?)
          }
          other => {
            return Err(KvError::validation(format!(
              "Invalid function name; function: {}",
              other
            )));
          }
        };
        self.expect(Token::RParen)?;
        return Ok(value);
      }
    }
    self.operand().map(SetValue::Operand)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn def(expression: &str, names: &[(&str, &str)], values: Value) -> ExpressionDef {
    ExpressionDef {
      expression: expression.to_string(),
      expression_names: names
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
      expression_values: values.as_object().cloned().unwrap_or_default(),
    }
  }

  fn item(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_comparison_and_boolean_operators() {
    let condition = Condition::parse(&def(
      "#id = :id AND (age >= :min OR NOT attribute_exists(age))",
      &[("#id", "id")],
      json!({ ":id": { "S": "1" }, ":min": { "N": "18" } }),
    ))
    .unwrap();

    assert!(condition.matches(&item(json!({ "id": { "S": "1" }, "age": { "N": "20" } }))));
    assert!(condition.matches(&item(json!({ "id": { "S": "1" } }))));
    assert!(!condition.matches(&item(json!({ "id": { "S": "1" }, "age": { "N": "9" } }))));
    assert!(!condition.matches(&item(json!({ "id": { "S": "2" } }))));
  }

  #[test]
  fn test_functions_and_between() {
    let values = json!({ ":p": { "S": "ab" }, ":lo": { "N": "1" }, ":hi": { "N": "5" }, ":t": { "S": "x" } });
    let row = item(json!({ "sk": { "S": "abc" }, "n": { "N": "5" }, "tags": { "SS": ["x", "y"] } }));

    for expression in [
      "begins_with(sk, :p)",
      "n BETWEEN :lo AND :hi",
      "contains(tags, :t)",
      "attribute_not_exists(missing)",
    ] {
      let condition = Condition::parse(&def(expression, &[], values.clone())).unwrap();
      assert!(condition.matches(&row), "{}", expression);
    }
  }

  #[test]
  fn test_undefined_placeholders_are_validation_errors() {
    assert!(matches!(
      Condition::parse(&def("id = :missing", &[], json!({}))),
      Err(KvError::Validation { .. })
    ));
    assert!(matches!(
      Condition::parse(&def("#missing = :v", &[], json!({ ":v": { "S": "1" } }))),
      Err(KvError::Validation { .. })
    ));
    assert!(matches!(
      Condition::parse(&def("id = ", &[], json!({}))),
      Err(KvError::Validation { .. })
    ));
  }

  #[test]
  fn test_update_set_remove_add() {
    let update = Update::parse(&def(
      "SET #title = :title, views = views + :one, tags = list_append(tags, :more), created = if_not_exists(created, :now) REMOVE draft ADD likes :one",
      &[("#title", "title")],
      json!({
        ":title": { "S": "Hello" },
        ":one": { "N": "1" },
        ":more": { "L": [{ "S": "b" }] },
        ":now": { "S": "2020" }
      }),
    ))
    .unwrap();

    let mut row = item(json!({
      "views": { "N": "41" },
      "tags": { "L": [{ "S": "a" }] },
      "created": { "S": "2019" },
      "draft": { "BOOL": true }
    }));
    update.apply(&mut row).unwrap();

    assert_eq!(
      Value::Object(row),
      json!({
        "views": { "N": "42" },
        "tags": { "L": [{ "S": "a" }, { "S": "b" }] },
        "created": { "S": "2019" },
        "title": { "S": "Hello" },
        "likes": { "N": "1" }
      })
    );
  }

  #[test]
  fn test_update_arithmetic_on_missing_attribute_fails() {
    let update = Update::parse(&def("SET n = n + :one", &[], json!({ ":one": { "N": "1" } }))).unwrap();
    let mut row = Map::new();
    assert!(matches!(update.apply(&mut row), Err(KvError::Validation { .. })));
  }

  #[test]
  fn test_update_delete_from_set() {
    let update = Update::parse(&def("DELETE tags :gone", &[], json!({ ":gone": { "SS": ["a"] } }))).unwrap();
    let mut row = item(json!({ "tags": { "SS": ["a", "b"] } }));
    update.apply(&mut row).unwrap();
    assert_eq!(Value::Object(row), json!({ "tags": { "SS": ["b"] } }));
  }
}
