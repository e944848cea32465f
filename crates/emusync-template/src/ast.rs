//! Parsed template tree.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
  Text(String),
  Reference(Reference),
  Set {
    target: Reference,
    value: Expr,
  },
  If {
    branches: Vec<(Expr, Vec<Node>)>,
    otherwise: Option<Vec<Node>>,
  },
  Foreach {
    var: String,
    iterable: Expr,
    body: Vec<Node>,
  },
  Break,
  Stop,
  Return(Option<Expr>),
  Console(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reference {
  pub root: String,
  pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
  Property(String),
  Index(Expr),
  Method { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
  Not,
  Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
  Or,
  And,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Add,
  Sub,
  Mul,
  Div,
  Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
  Literal(Literal),
  /// Double-quoted string containing references.
  Interpolated(Vec<Node>),
  Reference(Reference),
  List(Vec<Expr>),
  Range(Box<Expr>, Box<Expr>),
  Map(Vec<(Expr, Expr)>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
}
