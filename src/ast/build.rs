//! Constructors for building ASTs in code.
//!
//! Every node starts with an unknown span; use [`Spanned::at`] to pin one.

use std::rc::Rc;

use num_bigint::BigInt;

use super::*;

pub fn program(items: Vec<Expr>) -> Program {
    Program { items, span: Span::UNKNOWN }
}

fn expr(kind: ExprKind) -> Expr {
    Spanned::unknown(kind)
}

fn pat(kind: PatternKind) -> Pattern {
    Spanned::unknown(kind)
}

// ── Expressions ──────────────────────────────────────────────────────

pub fn unit() -> Expr {
    expr(ExprKind::Unit)
}

pub fn boolean(b: bool) -> Expr {
    expr(ExprKind::Bool(b))
}

pub fn int(n: i64) -> Expr {
    expr(ExprKind::Int(BigInt::from(n)))
}

pub fn big(n: BigInt) -> Expr {
    expr(ExprKind::Int(n))
}

pub fn dec(d: f64) -> Expr {
    expr(ExprKind::Dec(d))
}

pub fn text(s: &str) -> Expr {
    expr(ExprKind::Text(s.to_string()))
}

pub fn name(n: &str) -> Expr {
    expr(ExprKind::Name(n.to_string()))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    expr(ExprKind::Tuple(items))
}

pub fn list(items: Vec<Expr>) -> Expr {
    expr(ExprKind::List(items))
}

pub fn map(entries: Vec<(Expr, Expr)>) -> Expr {
    expr(ExprKind::Map(entries))
}

pub fn variant(tag: &str, payload: Expr) -> Expr {
    expr(ExprKind::Variant { tag: tag.to_string(), payload: Box::new(payload) })
}

pub fn bind(n: &str, value: Expr) -> Expr {
    expr(ExprKind::Bind { name: n.to_string(), value: Box::new(value) })
}

pub fn mutate(n: &str, value: Expr) -> Expr {
    expr(ExprKind::Mutate { name: n.to_string(), value: Box::new(value) })
}

pub fn block(items: Vec<Expr>) -> Expr {
    expr(ExprKind::Block(items))
}

pub fn lambda(params: Vec<Pattern>, body: Expr) -> Expr {
    expr(ExprKind::Lambda { params: Rc::new(params), body: Rc::new(body) })
}

pub fn call(func: Expr, arg: Expr) -> Expr {
    expr(ExprKind::Call { func: Box::new(func), arg: Box::new(arg) })
}

/// Curried application `f a b c` as nested calls.
pub fn apply(func: Expr, args: Vec<Expr>) -> Expr {
    args.into_iter().fold(func, call)
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary { op, operand: Box::new(operand) })
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn neg(operand: Expr) -> Expr {
    unary(UnaryOp::Neg, operand)
}

pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) })
}

pub fn add(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Add, l, r)
}

pub fn sub(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Sub, l, r)
}

pub fn mul(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Mul, l, r)
}

pub fn div(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Div, l, r)
}

pub fn modulo(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Mod, l, r)
}

pub fn concat(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Concat, l, r)
}

pub fn eq(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Equals, l, r)
}

pub fn ne(l: Expr, r: Expr) -> Expr {
    binary(BinOp::NotEquals, l, r)
}

pub fn lt(l: Expr, r: Expr) -> Expr {
    binary(BinOp::LessThan, l, r)
}

pub fn le(l: Expr, r: Expr) -> Expr {
    binary(BinOp::LessOrEqual, l, r)
}

pub fn gt(l: Expr, r: Expr) -> Expr {
    binary(BinOp::GreaterThan, l, r)
}

pub fn ge(l: Expr, r: Expr) -> Expr {
    binary(BinOp::GreaterOrEqual, l, r)
}

pub fn and(l: Expr, r: Expr) -> Expr {
    binary(BinOp::And, l, r)
}

pub fn or(l: Expr, r: Expr) -> Expr {
    binary(BinOp::Or, l, r)
}

pub fn dispatch(scrutinee: Expr, arms: Vec<DispatchArm>) -> Expr {
    expr(ExprKind::Dispatch { scrutinee: Box::new(scrutinee), arms })
}

pub fn arm(pattern: Pattern, body: Expr) -> DispatchArm {
    DispatchArm { pattern, body, span: Span::UNKNOWN }
}

pub fn cycle(seed: Expr, arms: Vec<CycleArm>) -> Expr {
    expr(ExprKind::Cycle { seed: Box::new(seed), arms })
}

pub fn again(pattern: Pattern, body: Expr) -> CycleArm {
    CycleArm { pattern, mode: ArmMode::Continue, body, span: Span::UNKNOWN }
}

pub fn finish(pattern: Pattern, body: Expr) -> CycleArm {
    CycleArm { pattern, mode: ArmMode::Finish, body, span: Span::UNKNOWN }
}

// ── Patterns ─────────────────────────────────────────────────────────

pub fn p_wild() -> Pattern {
    pat(PatternKind::Wildcard)
}

pub fn p_name(n: &str) -> Pattern {
    pat(PatternKind::Name(n.to_string()))
}

pub fn p_unit() -> Pattern {
    pat(PatternKind::Unit)
}

pub fn p_bool(b: bool) -> Pattern {
    pat(PatternKind::Bool(b))
}

pub fn p_int(n: i64) -> Pattern {
    pat(PatternKind::Int(BigInt::from(n)))
}

pub fn p_dec(d: f64) -> Pattern {
    pat(PatternKind::Dec(d))
}

pub fn p_text(s: &str) -> Pattern {
    pat(PatternKind::Text(s.to_string()))
}

pub fn p_tuple(items: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Tuple(items))
}

pub fn p_list(items: Vec<Pattern>, tail: Option<Pattern>) -> Pattern {
    pat(PatternKind::List { items, tail: tail.map(Box::new) })
}

pub fn p_variant(tag: &str, payload: Pattern) -> Pattern {
    pat(PatternKind::Variant { tag: tag.to_string(), payload: Box::new(payload) })
}
