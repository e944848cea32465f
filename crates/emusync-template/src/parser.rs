//! Template parser.
//!
//! Text is scanned once; `$` starts a reference and `#` starts a directive
//! or comment. Anything that does not form a valid reference or a known
//! directive is kept as literal text, so JSON documents pass through
//! untouched.

use crate::ast::{BinaryOp, Expr, Literal, Node, Reference, Segment, UnaryOp};
use crate::error::TemplateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
  Set,
  If,
  ElseIf,
  Else,
  End,
  Foreach,
  Break,
  Stop,
  Return,
  Console,
}

impl Directive {
  fn from_name(name: &str) -> Option<Self> {
    let directive = match name {
      "set" => Directive::Set,
      "if" => Directive::If,
      "elseif" => Directive::ElseIf,
      "else" => Directive::Else,
      "end" => Directive::End,
      "foreach" => Directive::Foreach,
      "break" => Directive::Break,
      "stop" => Directive::Stop,
      "return" => Directive::Return,
      "console" => Directive::Console,
      _ => return None,
    };
    Some(directive)
  }

  fn name(&self) -> &'static str {
    match self {
      Directive::Set => "set",
      Directive::If => "if",
      Directive::ElseIf => "elseif",
      Directive::Else => "else",
      Directive::End => "end",
      Directive::Foreach => "foreach",
      Directive::Break => "break",
      Directive::Stop => "stop",
      Directive::Return => "return",
      Directive::Console => "console",
    }
  }
}

/// Parse template source into a node tree.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
  let mut parser = Parser::new(source);
  let (nodes, _) = parser.parse_block(&[])?;
  Ok(nodes)
}

struct Parser {
  chars: Vec<char>,
  pos: usize,
}

fn is_ident_start(c: Option<char>) -> bool {
  matches!(c, Some(c) if c.is_ascii_alphabetic() || c == '_')
}

fn is_ident_char(c: Option<char>) -> bool {
  matches!(c, Some(c) if c.is_ascii_alphanumeric() || c == '_')
}

impl Parser {
  fn new(source: &str) -> Self {
    Self {
      chars: source.chars().collect(),
      pos: 0,
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<char> {
    self.chars.get(self.pos + offset).copied()
  }

  fn starts_with(&self, s: &str) -> bool {
    s.chars()
      .enumerate()
      .all(|(i, c)| self.peek_at(i) == Some(c))
  }

  fn find(&self, needle: &str, from: usize) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    (from..self.chars.len()).find(|&i| self.chars[i..].starts_with(&needle))
  }

  fn error_at(&self, pos: usize, message: impl Into<String>) -> TemplateError {
    let mut line = 1;
    let mut column = 1;
    for c in &self.chars[..pos.min(self.chars.len())] {
      if *c == '\n' {
        line += 1;
        column = 1;
      } else {
        column += 1;
      }
    }
    TemplateError::Compile {
      line,
      column,
      message: message.into(),
    }
  }

  fn error(&self, message: impl Into<String>) -> TemplateError {
    self.error_at(self.pos, message)
  }

  fn skip_ws(&mut self) {
    while matches!(self.peek(), Some(c) if c.is_whitespace()) {
      self.pos += 1;
    }
  }

  fn expect(&mut self, expected: char) -> Result<(), TemplateError> {
    match self.peek() {
      Some(c) if c == expected => {
        self.pos += 1;
        Ok(())
      }
      Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
      None => Err(self.error(format!("expected '{}', found end of template", expected))),
    }
  }

  fn eat_symbol(&mut self, symbol: &str) -> bool {
    if self.starts_with(symbol) {
      self.pos += symbol.chars().count();
      true
    } else {
      false
    }
  }

  fn eat_word(&mut self, word: &str) -> bool {
    let len = word.chars().count();
    if self.starts_with(word) && !is_ident_char(self.peek_at(len)) {
      self.pos += len;
      true
    } else {
      false
    }
  }

  fn parse_identifier(&mut self) -> String {
    let start = self.pos;
    while is_ident_char(self.peek()) {
      self.pos += 1;
    }
    self.chars[start..self.pos].iter().collect()
  }

  fn skip_line(&mut self) {
    while let Some(c) = self.peek() {
      self.pos += 1;
      if c == '\n' {
        break;
      }
    }
  }

  /// Parse nodes until one of `terminators` (or end of input when empty).
  fn parse_block(
    &mut self,
    terminators: &[Directive],
  ) -> Result<(Vec<Node>, Option<Directive>), TemplateError> {
    let block_start = self.pos;
    let mut nodes = Vec::new();
    let mut text = String::new();

    fn flush(text: &mut String, nodes: &mut Vec<Node>) {
      if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
      }
    }

    while let Some(c) = self.peek() {
      match c {
        '\\' if matches!(self.peek_at(1), Some('$') | Some('#')) => {
          text.push(self.chars[self.pos + 1]);
          self.pos += 2;
        }
        '#' if self.starts_with("##") => self.skip_line(),
        '#' if self.starts_with("#*") => {
          let start = self.pos;
          match self.find("*#", self.pos + 2) {
            Some(end) => self.pos = end + 2,
            None => return Err(self.error_at(start, "unterminated block comment")),
          }
        }
        '#' if self.starts_with("#[[") => {
          let start = self.pos;
          match self.find("]]#", self.pos + 3) {
            Some(end) => {
              text.extend(&self.chars[self.pos + 3..end]);
              self.pos = end + 3;
            }
            None => return Err(self.error_at(start, "unterminated unparsed block")),
          }
        }
        '#' => match self.peek_directive() {
          Some((directive, len)) => {
            let directive_start = self.pos;
            self.pos += len;
            flush(&mut text, &mut nodes);
            match directive {
              Directive::End | Directive::Else | Directive::ElseIf => {
                if terminators.contains(&directive) {
                  return Ok((nodes, Some(directive)));
                }
                return Err(
                  self.error_at(directive_start, format!("unexpected #{}", directive.name())),
                );
              }
              Directive::Set => nodes.push(self.parse_set()?),
              Directive::If => nodes.push(self.parse_if()?),
              Directive::Foreach => nodes.push(self.parse_foreach()?),
              Directive::Break => nodes.push(Node::Break),
              Directive::Stop => nodes.push(Node::Stop),
              Directive::Return => nodes.push(Node::Return(self.parse_optional_argument()?)),
              Directive::Console => {
                self.skip_ws();
                self.expect('(')?;
                nodes.push(Node::Console(self.parse_call_args()?));
              }
            }
          }
          None => {
            text.push('#');
            self.pos += 1;
          }
        },
        '$' => match self.parse_reference()? {
          Some(reference) => {
            flush(&mut text, &mut nodes);
            nodes.push(Node::Reference(reference));
          }
          None => {
            text.push('$');
            self.pos += 1;
          }
        },
        _ => {
          text.push(c);
          self.pos += 1;
        }
      }
    }

    flush(&mut text, &mut nodes);
    if !terminators.is_empty() {
      return Err(self.error_at(block_start, "missing #end"));
    }
    Ok((nodes, None))
  }

  /// Recognize `#name` or `#{name}` for a known directive.
  fn peek_directive(&self) -> Option<(Directive, usize)> {
    let formal = self.peek_at(1) == Some('{');
    let start = if formal { 2 } else { 1 };
    let mut end = start;
    while matches!(self.peek_at(end), Some(c) if c.is_ascii_alphabetic()) {
      end += 1;
    }
    if end == start {
      return None;
    }
    let name: String = self.chars[self.pos + start..self.pos + end].iter().collect();
    let directive = Directive::from_name(&name)?;
    if formal {
      if self.peek_at(end) != Some('}') {
        return None;
      }
      end += 1;
    }
    Some((directive, end))
  }

  fn parse_paren_expr(&mut self) -> Result<Expr, TemplateError> {
    self.skip_ws();
    self.expect('(')?;
    self.skip_ws();
    let expr = self.parse_expr()?;
    self.skip_ws();
    self.expect(')')?;
    Ok(expr)
  }

  fn parse_optional_argument(&mut self) -> Result<Option<Expr>, TemplateError> {
    let save = self.pos;
    while matches!(self.peek(), Some(' ') | Some('\t')) {
      self.pos += 1;
    }
    if self.peek() != Some('(') {
      self.pos = save;
      return Ok(None);
    }
    self.pos += 1;
    self.skip_ws();
    if self.peek() == Some(')') {
      self.pos += 1;
      return Ok(None);
    }
    let expr = self.parse_expr()?;
    self.skip_ws();
    self.expect(')')?;
    Ok(Some(expr))
  }

  fn parse_set(&mut self) -> Result<Node, TemplateError> {
    self.skip_ws();
    self.expect('(')?;
    self.skip_ws();
    let target_pos = self.pos;
    let target = match self.parse_reference()? {
      Some(reference) => reference,
      None => return Err(self.error("#set expects a reference to assign to")),
    };
    if matches!(target.segments.last(), Some(Segment::Method { .. })) {
      return Err(self.error_at(target_pos, "cannot assign to a method call"));
    }
    self.skip_ws();
    self.expect('=')?;
    self.skip_ws();
    let value = self.parse_expr()?;
    self.skip_ws();
    self.expect(')')?;
    Ok(Node::Set { target, value })
  }

  fn parse_if(&mut self) -> Result<Node, TemplateError> {
    const BRANCH_END: &[Directive] = &[Directive::ElseIf, Directive::Else, Directive::End];

    let condition = self.parse_paren_expr()?;
    let (body, mut terminator) = self.parse_block(BRANCH_END)?;
    let mut branches = vec![(condition, body)];
    let mut otherwise = None;

    loop {
      match terminator {
        Some(Directive::ElseIf) => {
          let condition = self.parse_paren_expr()?;
          let (body, next) = self.parse_block(BRANCH_END)?;
          branches.push((condition, body));
          terminator = next;
        }
        Some(Directive::Else) => {
          let (body, next) = self.parse_block(&[Directive::End])?;
          otherwise = Some(body);
          terminator = next;
        }
        _ => break,
      }
    }

    Ok(Node::If {
      branches,
      otherwise,
    })
  }

  fn parse_foreach(&mut self) -> Result<Node, TemplateError> {
    self.skip_ws();
    self.expect('(')?;
    self.skip_ws();
    let var = match self.parse_reference()? {
      Some(Reference { root, segments }) if segments.is_empty() => root,
      _ => return Err(self.error("#foreach expects a plain loop variable")),
    };
    self.skip_ws();
    if !self.eat_word("in") {
      return Err(self.error("expected 'in' in #foreach"));
    }
    self.skip_ws();
    let iterable = self.parse_expr()?;
    self.skip_ws();
    self.expect(')')?;
    let (body, _) = self.parse_block(&[Directive::End])?;
    Ok(Node::Foreach {
      var,
      iterable,
      body,
    })
  }

  /// Parse `$name`, `$!name`, `${name}` and their property/index/method chains.
  ///
  /// Returns `None` without consuming input when `$` does not start a reference.
  fn parse_reference(&mut self) -> Result<Option<Reference>, TemplateError> {
    let start = self.pos;
    let mut offset = 1;
    if self.peek_at(offset) == Some('!') {
      offset += 1;
    }
    let formal = self.peek_at(offset) == Some('{');
    if formal {
      offset += 1;
    }
    if !is_ident_start(self.peek_at(offset)) {
      return Ok(None);
    }
    self.pos += offset;

    let root = self.parse_identifier();
    let mut segments = Vec::new();
    loop {
      match self.peek() {
        Some('.') if is_ident_start(self.peek_at(1)) => {
          self.pos += 1;
          let name = self.parse_identifier();
          if self.peek() == Some('(') {
            self.pos += 1;
            let args = self.parse_call_args()?;
            segments.push(Segment::Method { name, args });
          } else {
            segments.push(Segment::Property(name));
          }
        }
        Some('[') => {
          self.pos += 1;
          self.skip_ws();
          let index = self.parse_expr()?;
          self.skip_ws();
          self.expect(']')?;
          segments.push(Segment::Index(index));
        }
        _ => break,
      }
    }

    if formal {
      if self.peek() != Some('}') {
        return Err(self.error_at(start, "unterminated ${...} reference"));
      }
      self.pos += 1;
    }

    Ok(Some(Reference { root, segments }))
  }

  /// Arguments after an opening parenthesis, through the closing one.
  fn parse_call_args(&mut self) -> Result<Vec<Expr>, TemplateError> {
    let mut args = Vec::new();
    self.skip_ws();
    if self.peek() == Some(')') {
      self.pos += 1;
      return Ok(args);
    }
    loop {
      self.skip_ws();
      args.push(self.parse_expr()?);
      self.skip_ws();
      match self.peek() {
        Some(',') => self.pos += 1,
        Some(')') => {
          self.pos += 1;
          return Ok(args);
        }
        _ => return Err(self.error("expected ',' or ')' in argument list")),
      }
    }
  }

  fn parse_expr(&mut self) -> Result<Expr, TemplateError> {
    self.parse_or()
  }

  fn parse_or(&mut self) -> Result<Expr, TemplateError> {
    let mut lhs = self.parse_and()?;
    loop {
      self.skip_ws();
      if self.eat_symbol("||") || self.eat_word("or") {
        self.skip_ws();
        let rhs = self.parse_and()?;
        lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
      } else {
        return Ok(lhs);
      }
    }
  }

  fn parse_and(&mut self) -> Result<Expr, TemplateError> {
    let mut lhs = self.parse_equality()?;
    loop {
      self.skip_ws();
      if self.eat_symbol("&&") || self.eat_word("and") {
        self.skip_ws();
        let rhs = self.parse_equality()?;
        lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
      } else {
        return Ok(lhs);
      }
    }
  }

  fn parse_equality(&mut self) -> Result<Expr, TemplateError> {
    let mut lhs = self.parse_relational()?;
    loop {
      self.skip_ws();
      let op = if self.eat_symbol("==") || self.eat_word("eq") {
        BinaryOp::Eq
      } else if self.eat_symbol("!=") || self.eat_word("ne") {
        BinaryOp::Ne
      } else {
        return Ok(lhs);
      };
      self.skip_ws();
      let rhs = self.parse_relational()?;
      lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
  }

  fn parse_relational(&mut self) -> Result<Expr, TemplateError> {
    let mut lhs = self.parse_additive()?;
    loop {
      self.skip_ws();
      let op = if self.eat_symbol("<=") || self.eat_word("le") {
        BinaryOp::Le
      } else if self.eat_symbol(">=") || self.eat_word("ge") {
        BinaryOp::Ge
      } else if self.eat_symbol("<") || self.eat_word("lt") {
        BinaryOp::Lt
      } else if self.eat_symbol(">") || self.eat_word("gt") {
        BinaryOp::Gt
      } else {
        return Ok(lhs);
      };
      self.skip_ws();
      let rhs = self.parse_additive()?;
      lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
  }

  fn parse_additive(&mut self) -> Result<Expr, TemplateError> {
    let mut lhs = self.parse_multiplicative()?;
    loop {
      self.skip_ws();
      let op = if self.eat_symbol("+") {
        BinaryOp::Add
      } else if self.eat_symbol("-") {
        BinaryOp::Sub
      } else {
        return Ok(lhs);
      };
      self.skip_ws();
      let rhs = self.parse_multiplicative()?;
      lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
  }

  fn parse_multiplicative(&mut self) -> Result<Expr, TemplateError> {
    let mut lhs = self.parse_unary()?;
    loop {
      self.skip_ws();
      let op = if self.eat_symbol("*") {
        BinaryOp::Mul
      } else if self.eat_symbol("/") {
        BinaryOp::Div
      } else if self.eat_symbol("%") {
        BinaryOp::Rem
      } else {
        return Ok(lhs);
      };
      self.skip_ws();
      let rhs = self.parse_unary()?;
      lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
  }

  fn parse_unary(&mut self) -> Result<Expr, TemplateError> {
    self.skip_ws();
    if self.peek() == Some('!') && self.peek_at(1) != Some('=') {
      self.pos += 1;
      let operand = self.parse_unary()?;
      return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
    }
    if self.eat_word("not") {
      let operand = self.parse_unary()?;
      return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
    }
    if self.eat_symbol("-") {
      let operand = self.parse_unary()?;
      return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
    }
    self.parse_primary()
  }

  fn parse_primary(&mut self) -> Result<Expr, TemplateError> {
    self.skip_ws();
    let Some(c) = self.peek() else {
      return Err(self.error("unexpected end of template in expression"));
    };

    match c {
      '$' => match self.parse_reference()? {
        Some(reference) => Ok(Expr::Reference(reference)),
        None => Err(self.error("expected a reference after '$'")),
      },
      '\'' => {
        let text = self.parse_quoted('\'')?;
        Ok(Expr::Literal(Literal::String(text)))
      }
      '"' => {
        let start = self.pos;
        let text = self.parse_quoted('"')?;
        self.interpolate(&text, start)
      }
      '[' => self.parse_list(),
      '{' => self.parse_map(),
      '(' => {
        self.pos += 1;
        self.skip_ws();
        let expr = self.parse_expr()?;
        self.skip_ws();
        self.expect(')')?;
        Ok(expr)
      }
      c if c.is_ascii_digit() => self.parse_number(),
      _ => {
        if self.eat_word("true") {
          Ok(Expr::Literal(Literal::Bool(true)))
        } else if self.eat_word("false") {
          Ok(Expr::Literal(Literal::Bool(false)))
        } else if self.eat_word("null") {
          Ok(Expr::Literal(Literal::Null))
        } else {
          Err(self.error(format!("unexpected '{}' in expression", c)))
        }
      }
    }
  }

  /// Quoted string body; a doubled quote stands for one quote character.
  fn parse_quoted(&mut self, quote: char) -> Result<String, TemplateError> {
    let start = self.pos;
    self.pos += 1;
    let mut text = String::new();
    loop {
      match self.peek() {
        Some(c) if c == quote => {
          if self.peek_at(1) == Some(quote) {
            text.push(quote);
            self.pos += 2;
          } else {
            self.pos += 1;
            return Ok(text);
          }
        }
        Some(c) => {
          text.push(c);
          self.pos += 1;
        }
        None => return Err(self.error_at(start, "unterminated string literal")),
      }
    }
  }

  fn interpolate(&self, text: &str, start: usize) -> Result<Expr, TemplateError> {
    if !text.contains('$') && !text.contains('#') {
      return Ok(Expr::Literal(Literal::String(text.to_string())));
    }
    let nodes = parse(text).map_err(|e| match e {
      TemplateError::Compile { message, .. } => {
        self.error_at(start, format!("in string literal: {}", message))
      }
      other => other,
    })?;
    match nodes.as_slice() {
      [] => Ok(Expr::Literal(Literal::String(String::new()))),
      [Node::Text(text)] => Ok(Expr::Literal(Literal::String(text.clone()))),
      _ => Ok(Expr::Interpolated(nodes)),
    }
  }

  fn parse_number(&mut self) -> Result<Expr, TemplateError> {
    let start = self.pos;
    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
      self.pos += 1;
    }
    let is_float =
      self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit());
    if is_float {
      self.pos += 1;
      while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
        self.pos += 1;
      }
    }
    let text: String = self.chars[start..self.pos].iter().collect();
    if is_float {
      text
        .parse::<f64>()
        .map(|f| Expr::Literal(Literal::Float(f)))
        .map_err(|_| self.error_at(start, format!("invalid number '{}'", text)))
    } else {
      text
        .parse::<i64>()
        .map(|i| Expr::Literal(Literal::Int(i)))
        .map_err(|_| self.error_at(start, format!("integer literal '{}' out of range", text)))
    }
  }

  fn parse_list(&mut self) -> Result<Expr, TemplateError> {
    self.pos += 1;
    self.skip_ws();
    if self.peek() == Some(']') {
      self.pos += 1;
      return Ok(Expr::List(Vec::new()));
    }

    let first = self.parse_expr()?;
    self.skip_ws();
    if self.eat_symbol("..") {
      self.skip_ws();
      let last = self.parse_expr()?;
      self.skip_ws();
      self.expect(']')?;
      return Ok(Expr::Range(Box::new(first), Box::new(last)));
    }

    let mut items = vec![first];
    loop {
      self.skip_ws();
      match self.peek() {
        Some(',') => {
          self.pos += 1;
          self.skip_ws();
          items.push(self.parse_expr()?);
        }
        Some(']') => {
          self.pos += 1;
          return Ok(Expr::List(items));
        }
        _ => return Err(self.error("expected ',' or ']' in list")),
      }
    }
  }

  fn parse_map(&mut self) -> Result<Expr, TemplateError> {
    self.pos += 1;
    self.skip_ws();
    let mut entries = Vec::new();
    if self.peek() == Some('}') {
      self.pos += 1;
      return Ok(Expr::Map(entries));
    }
    loop {
      self.skip_ws();
      let key = self.parse_expr()?;
      self.skip_ws();
      self.expect(':')?;
      self.skip_ws();
      let value = self.parse_expr()?;
      entries.push((key, value));
      self.skip_ws();
      match self.peek() {
        Some(',') => self.pos += 1,
        Some('}') => {
          self.pos += 1;
          return Ok(Expr::Map(entries));
        }
        _ => return Err(self.error("expected ',' or '}' in map")),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn reference(root: &str, segments: Vec<Segment>) -> Reference {
    Reference {
      root: root.to_string(),
      segments,
    }
  }

  #[test]
  fn test_plain_json_is_text() {
    let nodes = parse(r##"{ "color": "#fff", "price": "$5" }"##).unwrap();
    assert_eq!(
      nodes,
      vec![Node::Text(r##"{ "color": "#fff", "price": "$5" }"##.to_string())]
    );
  }

  #[test]
  fn test_reference_chain() {
    let nodes = parse("id: $ctx.args.id.").unwrap();
    assert_eq!(
      nodes,
      vec![
        Node::Text("id: ".to_string()),
        Node::Reference(reference(
          "ctx",
          vec![
            Segment::Property("args".to_string()),
            Segment::Property("id".to_string())
          ]
        )),
        Node::Text(".".to_string()),
      ]
    );
  }

  #[test]
  fn test_method_call_and_formal_reference() {
    let nodes = parse("${util.toJson($x)}").unwrap();
    assert_eq!(
      nodes,
      vec![Node::Reference(reference(
        "util",
        vec![Segment::Method {
          name: "toJson".to_string(),
          args: vec![Expr::Reference(reference("x", vec![]))],
        }]
      ))]
    );
  }

  #[test]
  fn test_if_elseif_else() {
    let nodes = parse("#if($a)A#elseif($b)B#{else}C#end").unwrap();
    match &nodes[0] {
      Node::If {
        branches,
        otherwise,
      } => {
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise, &Some(vec![Node::Text("C".to_string())]));
      }
      other => panic!("expected if, got {:?}", other),
    }
  }

  #[test]
  fn test_operator_precedence() {
    let nodes = parse("#set($x = 1 + 2 * 3 == 7 && !false)").unwrap();
    let Node::Set { value, .. } = &nodes[0] else {
      panic!("expected set");
    };
    let Expr::Binary(BinaryOp::And, lhs, _) = value else {
      panic!("expected and at the top, got {:?}", value);
    };
    assert!(matches!(**lhs, Expr::Binary(BinaryOp::Eq, _, _)));
  }

  #[test]
  fn test_word_operators() {
    let nodes = parse("#if($a eq 1 and not $b)x#end").unwrap();
    let Node::If { branches, .. } = &nodes[0] else {
      panic!("expected if");
    };
    assert!(matches!(branches[0].0, Expr::Binary(BinaryOp::And, _, _)));
  }

  #[test]
  fn test_comments_and_unparsed_blocks() {
    let nodes = parse("a## gone\nb#* also gone *#c#[[$raw]]#").unwrap();
    assert_eq!(nodes, vec![Node::Text("abc$raw".to_string())]);
  }

  #[test]
  fn test_escaped_dollar() {
    let nodes = parse(r"\$ctx").unwrap();
    assert_eq!(nodes, vec![Node::Text("$ctx".to_string())]);
  }

  #[test]
  fn test_range_and_map_literals() {
    let nodes = parse(r#"#set($r = [1..3])#set($m = {"a": 1, 'b': [2]})"#).unwrap();
    assert!(matches!(&nodes[0], Node::Set { value: Expr::Range(_, _), .. }));
    assert!(matches!(&nodes[1], Node::Set { value: Expr::Map(entries), .. } if entries.len() == 2));
  }

  #[test]
  fn test_interpolated_string() {
    let nodes = parse(r#"#set($s = "id-$id")"#).unwrap();
    assert!(matches!(
      &nodes[0],
      Node::Set {
        value: Expr::Interpolated(_),
        ..
      }
    ));
  }

  #[test]
  fn test_missing_end_is_compile_error() {
    let err = parse("{\n#if($a)\n  x\n").unwrap_err();
    assert!(matches!(err, TemplateError::Compile { line: 2, .. }));
  }

  #[test]
  fn test_unexpected_end_reports_position() {
    let err = parse("ok\n  #end").unwrap_err();
    assert_eq!(
      err,
      TemplateError::Compile {
        line: 2,
        column: 3,
        message: "unexpected #end".to_string(),
      }
    );
  }

  #[test]
  fn test_return_with_and_without_argument() {
    let nodes = parse("#return #return($x)").unwrap();
    assert_eq!(nodes[0], Node::Return(None));
    assert!(matches!(&nodes[2], Node::Return(Some(_))));
  }

  #[test]
  fn test_bad_expression() {
    assert!(matches!(
      parse("#set($x = )"),
      Err(TemplateError::Compile { .. })
    ));
  }
}
