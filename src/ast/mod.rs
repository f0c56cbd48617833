use std::rc::Rc;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

pub mod build;
pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Source region of a node: byte range plus the 1-based line/column of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0, line: 0, column: 0 };

    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Span { start, end, line, column }
    }

    /// A zero-width span at a line/column, for callers that have no byte offsets.
    pub fn at(line: usize, column: usize) -> Self {
        Span { start: 0, end: 0, line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

/// Wraps a node with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    #[serde(default)]
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Spanned { node, span }
    }

    pub fn unknown(node: T) -> Self {
        Spanned { node, span: Span::UNKNOWN }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.span = Span::at(line, column);
        self
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

// ---- Core AST types ----

/// Root node handed over by the front end.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Expr>,
    #[serde(default)]
    pub span: Span,
}

pub type Expr = Spanned<ExprKind>;
pub type Pattern = Spanned<PatternKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    And,
    Or,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnaryOp::Not => "¬",
            UnaryOp::Neg => "−",
        })
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "−",
            BinOp::Mul => "×",
            BinOp::Div => "÷",
            BinOp::Mod => "%",
            BinOp::Concat => "⊞",
            BinOp::Equals => "=",
            BinOp::NotEquals => "≠",
            BinOp::LessThan => "<",
            BinOp::LessOrEqual => "≤",
            BinOp::GreaterThan => ">",
            BinOp::GreaterOrEqual => "≥",
            BinOp::And => "∧",
            BinOp::Or => "∨",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmMode {
    /// `↻`: the arm result replaces the loop state
    Continue,
    /// `⇥`: the arm result leaves the loop
    Finish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchArm {
    pub pattern: Pattern,
    pub body: Expr,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleArm {
    pub pattern: Pattern,
    pub mode: ArmMode,
    pub body: Expr,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Name(String),
    Unit,
    Bool(bool),
    Int(#[serde(with = "int_literal")] BigInt),
    Dec(f64),
    Text(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Variant {
        tag: String,
        payload: Box<Expr>,
    },
    /// `name ← value`
    Bind {
        name: String,
        value: Box<Expr>,
    },
    /// `name ⇐ value`
    Mutate {
        name: String,
        value: Box<Expr>,
    },
    Block(Vec<Expr>),
    Lambda {
        params: Rc<Vec<Pattern>>,
        body: Rc<Expr>,
    },
    Call {
        func: Box<Expr>,
        arg: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Dispatch {
        scrutinee: Box<Expr>,
        arms: Vec<DispatchArm>,
    },
    Cycle {
        seed: Box<Expr>,
        arms: Vec<CycleArm>,
    },
}

impl ExprKind {
    /// Node kind label used by the execution trace.
    pub fn label(&self) -> &'static str {
        match self {
            ExprKind::Name(_) => "Name",
            ExprKind::Unit => "UnitLit",
            ExprKind::Bool(_) => "BoolLit",
            ExprKind::Int(_) => "IntLit",
            ExprKind::Dec(_) => "DecLit",
            ExprKind::Text(_) => "TextLit",
            ExprKind::Tuple(_) => "TupleExpr",
            ExprKind::List(_) => "ListExpr",
            ExprKind::Map(_) => "MapExpr",
            ExprKind::Variant { .. } => "VariantExpr",
            ExprKind::Bind { .. } => "Binding",
            ExprKind::Mutate { .. } => "Mutation",
            ExprKind::Block(_) => "Block",
            ExprKind::Lambda { .. } => "Lambda",
            ExprKind::Call { .. } => "Call",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Dispatch { .. } => "Dispatch",
            ExprKind::Cycle { .. } => "Cycle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    Wildcard,
    Name(String),
    Unit,
    Bool(bool),
    Int(#[serde(with = "int_literal")] BigInt),
    Dec(f64),
    Text(String),
    Tuple(Vec<Pattern>),
    List {
        items: Vec<Pattern>,
        tail: Option<Box<Pattern>>,
    },
    Variant {
        tag: String,
        payload: Box<Pattern>,
    },
}

/// Integer literals travel as decimal strings so arbitrarily large values
/// survive JSON; plain JSON integers are accepted on input.
mod int_literal {
    use std::fmt;

    use num_bigint::BigInt;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Accepts any JSON integer, or a decimal string for literals of any size.
    struct IntLiteral;

    impl Visitor<'_> for IntLiteral {
        type Value = BigInt;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer, or a string of decimal digits")
        }

        fn visit_i64<E: de::Error>(self, n: i64) -> Result<BigInt, E> {
            Ok(BigInt::from(n))
        }

        fn visit_u64<E: de::Error>(self, n: u64) -> Result<BigInt, E> {
            Ok(BigInt::from(n))
        }

        fn visit_i128<E: de::Error>(self, n: i128) -> Result<BigInt, E> {
            Ok(BigInt::from(n))
        }

        fn visit_u128<E: de::Error>(self, n: u128) -> Result<BigInt, E> {
            Ok(BigInt::from(n))
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<BigInt, E> {
            s.parse::<BigInt>()
                .map_err(|e| E::custom(format!("invalid integer literal '{s}': {e}")))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        deserializer.deserialize_any(IntLiteral)
    }
}
