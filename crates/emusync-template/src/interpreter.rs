//! Tree-walking interpreter over parsed templates.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{BinaryOp, Expr, Literal, Node, Reference, Segment, UnaryOp};
use crate::error::RaisedError;
use crate::methods::call_method;
use crate::util::{self, UtilState};
use crate::value::{Namespace, Value};

/// Largest list a `[a..b]` range may produce.
const MAX_RANGE_LEN: i64 = 10_000;

/// Non-local exits out of template execution.
pub(crate) enum Interrupt {
  Break,
  Stop,
  Return(Value),
  Raise(RaisedError),
  Fault(String),
}

pub(crate) struct Interpreter {
  vars: HashMap<String, Value>,
  util: UtilState,
}

impl Interpreter {
  pub fn new(util: UtilState) -> Self {
    Self {
      vars: HashMap::new(),
      util,
    }
  }

  pub fn define(&mut self, name: &str, value: Value) {
    self.vars.insert(name.to_string(), value);
  }

  pub fn take_appended_errors(&mut self) -> Vec<RaisedError> {
    std::mem::take(&mut self.util.appended)
  }

  /// Drop every variable, emptying the containers they reach.
  pub fn release(&mut self) {
    for (_, value) in self.vars.drain() {
      value.release();
    }
  }

  pub fn execute(&mut self, nodes: &[Node], out: &mut String) -> Result<(), Interrupt> {
    for node in nodes {
      self.execute_node(node, out)?;
    }
    Ok(())
  }

  fn execute_node(&mut self, node: &Node, out: &mut String) -> Result<(), Interrupt> {
    match node {
      Node::Text(text) => out.push_str(text),
      Node::Reference(reference) => {
        let value = self.resolve(reference)?;
        out.push_str(&value.render());
      }
      Node::Set { target, value } => {
        let value = self.eval(value)?;
        self.assign(target, value)?;
      }
      Node::If {
        branches,
        otherwise,
      } => {
        for (condition, body) in branches {
          if self.eval(condition)?.is_truthy() {
            return self.execute(body, out);
          }
        }
        if let Some(body) = otherwise {
          self.execute(body, out)?;
        }
      }
      Node::Foreach {
        var,
        iterable,
        body,
      } => self.execute_foreach(var, iterable, body, out)?,
      Node::Break => return Err(Interrupt::Break),
      Node::Stop => return Err(Interrupt::Stop),
      Node::Return(expr) => {
        let value = match expr {
          Some(expr) => self.eval(expr)?,
          None => Value::Null,
        };
        return Err(Interrupt::Return(value));
      }
      Node::Console(args) => {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
          parts.push(self.eval(arg)?.java_string());
        }
        debug!(message = %parts.join(" "), "template_console");
      }
    }
    Ok(())
  }

  fn execute_foreach(
    &mut self,
    var: &str,
    iterable: &Expr,
    body: &[Node],
    out: &mut String,
  ) -> Result<(), Interrupt> {
    let items: Vec<Value> = match self.eval(iterable)? {
      Value::List(list) => {
        let items = list.borrow().clone();
        items
      }
      Value::Map(map) => {
        let values = map.borrow().values().cloned().collect();
        values
      }
      Value::Undefined | Value::Null => Vec::new(),
      other => {
        return Err(Interrupt::Fault(format!(
          "#foreach cannot iterate over a {}",
          other.type_name()
        )));
      }
    };

    let saved_var = self.vars.remove(var);
    let saved_foreach = self.vars.remove("foreach");
    let count = items.len();
    let mut result = Ok(());

    for (index, item) in items.into_iter().enumerate() {
      self.vars.insert(var.to_string(), item);
      self.vars.insert("foreach".to_string(), loop_state(index, count));
      match self.execute(body, out) {
        Ok(()) => {}
        Err(Interrupt::Break) => break,
        Err(other) => {
          result = Err(other);
          break;
        }
      }
    }

    self.restore(var, saved_var);
    self.restore("foreach", saved_foreach);
    result
  }

  fn restore(&mut self, name: &str, saved: Option<Value>) {
    match saved {
      Some(value) => {
        self.vars.insert(name.to_string(), value);
      }
      None => {
        self.vars.remove(name);
      }
    }
  }

  fn lookup_root(&self, name: &str) -> Value {
    match self.vars.get(name) {
      Some(value) => value.clone(),
      None if name == "util" || name == "utils" => Value::Util(Namespace::Util),
      None => Value::Undefined,
    }
  }

  fn resolve(&mut self, reference: &Reference) -> Result<Value, Interrupt> {
    let mut current = self.lookup_root(&reference.root);
    for segment in &reference.segments {
      current = self.apply_segment(current, segment)?;
    }
    Ok(current)
  }

  fn apply_segment(&mut self, current: Value, segment: &Segment) -> Result<Value, Interrupt> {
    match segment {
      Segment::Property(name) => Ok(property(&current, name)),
      Segment::Index(expr) => {
        let key = self.eval(expr)?;
        index(&current, &key).map_err(Interrupt::Fault)
      }
      Segment::Method { name, args } => {
        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
          argv.push(self.eval(arg)?);
        }
        match &current {
          Value::Util(namespace) => util::call(&mut self.util, *namespace, name, &argv),
          target => call_method(target, name, &argv).map_err(Interrupt::Fault),
        }
      }
    }
  }

  fn assign(&mut self, target: &Reference, value: Value) -> Result<(), Interrupt> {
    let Some((last, path)) = target.segments.split_last() else {
      self.vars.insert(target.root.clone(), value);
      return Ok(());
    };

    let mut container = self.lookup_root(&target.root);
    for segment in path {
      container = self.apply_segment(container, segment)?;
    }

    match last {
      Segment::Property(name) => match &container {
        Value::Map(map) => {
          map.borrow_mut().insert(name.clone(), value);
          Ok(())
        }
        other => Err(Interrupt::Fault(format!(
          "cannot set property '{}' on a {} value",
          name,
          other.type_name()
        ))),
      },
      Segment::Index(expr) => {
        let key = self.eval(expr)?;
        match (&container, &key) {
          (Value::Map(map), key) if !key.is_nullish() => {
            map.borrow_mut().insert(key.render(), value);
            Ok(())
          }
          (Value::List(list), Value::Int(i)) => {
            let mut items = list.borrow_mut();
            let len = items.len();
            match usize::try_from(*i).ok().filter(|i| *i < len) {
              Some(i) => {
                items[i] = value;
                Ok(())
              }
              None => Err(Interrupt::Fault(format!(
                "index {} out of bounds for length {}",
                i, len
              ))),
            }
          }
          (other, _) => Err(Interrupt::Fault(format!(
            "cannot assign by index into a {} value",
            other.type_name()
          ))),
        }
      }
      Segment::Method { name, .. } => Err(Interrupt::Fault(format!(
        "cannot assign to method call '{}'",
        name
      ))),
    }
  }

  fn eval(&mut self, expr: &Expr) -> Result<Value, Interrupt> {
    match expr {
      Expr::Literal(literal) => Ok(match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
      }),
      Expr::Interpolated(nodes) => {
        let mut text = String::new();
        self.execute(nodes, &mut text)?;
        Ok(Value::String(text))
      }
      Expr::Reference(reference) => self.resolve(reference),
      Expr::List(items) => {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
          values.push(self.eval(item)?);
        }
        Ok(Value::new_list(values))
      }
      Expr::Range(start, end) => {
        let start = self.eval(start)?;
        let end = self.eval(end)?;
        range(&start, &end).map_err(Interrupt::Fault)
      }
      Expr::Map(entries) => {
        let mut map = IndexMap::with_capacity(entries.len());
        for (key, value) in entries {
          let key = self.eval(key)?;
          if key.is_nullish() {
            return Err(Interrupt::Fault("map key must not be null".to_string()));
          }
          let value = self.eval(value)?;
          map.insert(key.render(), value);
        }
        Ok(Value::new_map(map))
      }
      Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
      Expr::Unary(UnaryOp::Neg, operand) => match self.eval(operand)? {
        Value::Int(i) => i
          .checked_neg()
          .map(Value::Int)
          .ok_or_else(|| Interrupt::Fault("integer overflow".to_string())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(Interrupt::Fault(format!(
          "cannot negate a {} value",
          other.type_name()
        ))),
      },
      Expr::Binary(BinaryOp::And, lhs, rhs) => {
        if !self.eval(lhs)?.is_truthy() {
          return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
      }
      Expr::Binary(BinaryOp::Or, lhs, rhs) => {
        if self.eval(lhs)?.is_truthy() {
          return Ok(Value::Bool(true));
        }
        Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
      }
      Expr::Binary(op, lhs, rhs) => {
        let lhs = self.eval(lhs)?;
        let rhs = self.eval(rhs)?;
        binary(*op, &lhs, &rhs).map_err(Interrupt::Fault)
      }
    }
  }
}

fn loop_state(index: usize, count: usize) -> Value {
  let mut state = IndexMap::new();
  state.insert("index".to_string(), Value::Int(index as i64));
  state.insert("count".to_string(), Value::Int(index as i64 + 1));
  state.insert("hasNext".to_string(), Value::Bool(index + 1 < count));
  state.insert("first".to_string(), Value::Bool(index == 0));
  state.insert("last".to_string(), Value::Bool(index + 1 == count));
  Value::new_map(state)
}

fn property(current: &Value, name: &str) -> Value {
  match current {
    Value::Map(map) => map.borrow().get(name).cloned().unwrap_or(Value::Undefined),
    Value::Util(namespace) => namespace
      .child(name)
      .map(Value::Util)
      .unwrap_or(Value::Undefined),
    _ => Value::Undefined,
  }
}

fn index(current: &Value, key: &Value) -> Result<Value, String> {
  match (current, key) {
    (Value::Undefined | Value::Null, _) => Ok(Value::Undefined),
    (Value::List(list), Value::Int(i)) => {
      let items = list.borrow();
      Ok(
        usize::try_from(*i)
          .ok()
          .and_then(|i| items.get(i).cloned())
          .unwrap_or(Value::Undefined),
      )
    }
    (Value::List(_), other) => Err(format!(
      "list index must be an integer, got {}",
      other.type_name()
    )),
    (Value::Map(_), key) if key.is_nullish() => Ok(Value::Undefined),
    (Value::Map(map), key) => Ok(
      map
        .borrow()
        .get(&key.render())
        .cloned()
        .unwrap_or(Value::Undefined),
    ),
    (other, _) => Err(format!("cannot index into a {} value", other.type_name())),
  }
}

fn range(start: &Value, end: &Value) -> Result<Value, String> {
  let (Value::Int(start), Value::Int(end)) = (start, end) else {
    return Err("range bounds must be integers".to_string());
  };
  if start.abs_diff(*end) >= MAX_RANGE_LEN as u64 {
    return Err(format!("range [{}..{}] is too large", start, end));
  }
  let items: Vec<Value> = if start <= end {
    (*start..=*end).map(Value::Int).collect()
  } else {
    (*end..=*start).rev().map(Value::Int).collect()
  };
  Ok(Value::new_list(items))
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
  match op {
    BinaryOp::Eq => return Ok(Value::Bool(lhs.loose_eq(rhs))),
    BinaryOp::Ne => return Ok(Value::Bool(!lhs.loose_eq(rhs))),
    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
      let ordering = lhs.compare(rhs).ok_or_else(|| {
        format!(
          "cannot compare a {} value with a {} value",
          lhs.type_name(),
          rhs.type_name()
        )
      })?;
      let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
      };
      return Ok(Value::Bool(result));
    }
    BinaryOp::Add if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) => {
      return Ok(Value::string(format!("{}{}", lhs.render(), rhs.render())));
    }
    _ => {}
  }

  let symbol = match op {
    BinaryOp::Add => "+",
    BinaryOp::Sub => "-",
    BinaryOp::Mul => "*",
    BinaryOp::Div => "/",
    _ => "%",
  };

  match (lhs, rhs) {
    (Value::Int(a), Value::Int(b)) => {
      let result = match op {
        BinaryOp::Add => a.checked_add(*b),
        BinaryOp::Sub => a.checked_sub(*b),
        BinaryOp::Mul => a.checked_mul(*b),
        BinaryOp::Div if *b == 0 => return Err("division by zero".to_string()),
        BinaryOp::Div => a.checked_div(*b),
        _ if *b == 0 => return Err("division by zero".to_string()),
        _ => a.checked_rem(*b),
      };
      result
        .map(Value::Int)
        .ok_or_else(|| format!("integer overflow in '{}'", symbol))
    }
    (a, b) if a.is_number() && b.is_number() => {
      let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
      if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
        return Err("division by zero".to_string());
      }
      Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
      }))
    }
    _ => Err(format!(
      "cannot apply '{}' to a {} value and a {} value",
      symbol,
      lhs.type_name(),
      rhs.type_name()
    )),
  }
}
