//! Runtime value model shared by the interpreter and the VM.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use rustc_hash::FxBuildHasher;

use crate::ast::{Expr, Pattern, Span};
use crate::error::{ErrorKind, EvalError, EvalResult, Origin};
use crate::pattern::match_pattern;
use crate::vm::bytecode::Code;

pub mod builtins;
pub mod env;
pub mod ops;

pub use builtins::{Builtin, Curry, Host, NativeFn};
pub use env::{Env, EnvError};

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(BigInt),
    Dec(f64),
    Text(Rc<str>),
    Tuple(Rc<Vec<Value>>),
    List(Rc<Vec<Value>>),
    Map(Rc<ValueMap>),
    Variant(Rc<Variant>),
    Closure(Rc<Closure>),
    Builtin(Rc<Builtin>),
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub tag: String,
    pub payload: Value,
}

impl Value {
    pub fn int(n: i64) -> Value {
        Value::Int(BigInt::from(n))
    }

    pub fn text(s: &str) -> Value {
        Value::Text(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn variant(tag: &str, payload: Value) -> Value {
        Value::Variant(Rc::new(Variant { tag: tag.to_string(), payload }))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Dec(_) => "Dec",
            Value::Text(_) => "Text",
            Value::Tuple(_) => "Tuple",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Variant(_) => "Variant",
            Value::Closure(_) => "Closure",
            Value::Builtin(_) => "Builtin",
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Dec(_))
    }

    /// Closures and builtins have no observable structure beyond their text form.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unit => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Binding an anonymous closure to a name gives it that name for stack traces.
    pub fn named(self, name: &str) -> Value {
        match &self {
            Value::Closure(c) if c.name.is_none() => {
                let mut renamed = (**c).clone();
                renamed.name = Some(Rc::from(name));
                Value::Closure(Rc::new(renamed))
            }
            _ => self,
        }
    }
}

// ── Equality ─────────────────────────────────────────────────────────

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Unit, Value::Unit) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Dec(x), Value::Dec(y)) => x == y,
        (Value::Int(i), Value::Dec(d)) | (Value::Dec(d), Value::Int(i)) => {
            compare_int_dec(i, *d) == Some(Ordering::Equal)
        }
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) | (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| values_equal(p, q))
        }
        (Value::Map(x), Value::Map(y)) => x.same_entries(y),
        (Value::Variant(x), Value::Variant(y)) => x.tag == y.tag && values_equal(&x.payload, &y.payload),
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => {
            x.name == y.name
                && x.bound.len() == y.bound.len()
                && x.bound.iter().zip(y.bound.iter()).all(|(p, q)| values_equal(p, q))
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        values_equal(self, other)
    }
}

/// Exact comparison of an integer against a double, no lossy coercion.
pub fn compare_int_dec(i: &BigInt, d: f64) -> Option<Ordering> {
    if d.is_nan() {
        return None;
    }
    if d.is_infinite() {
        return Some(if d > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = d.floor();
    let whole = BigInt::from_f64(floor)?;
    match i.cmp(&whole) {
        Ordering::Equal if d > floor => Some(Ordering::Less),
        other => Some(other),
    }
}

pub fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Dec(x), Value::Dec(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Dec(y)) => compare_int_dec(x, *y),
        (Value::Dec(x), Value::Int(y)) => compare_int_dec(y, *x).map(Ordering::reverse),
        _ => None,
    }
}

/// Widens a number to a double; integers beyond the double range overflow.
pub fn to_dec(v: &Value) -> EvalResult<f64> {
    match v {
        Value::Dec(d) => Ok(*d),
        Value::Int(i) => i
            .to_f64()
            .filter(|d| d.is_finite())
            .ok_or_else(|| EvalError::new(ErrorKind::Overflow, "Int too large to convert to Dec")),
        other => Err(EvalError::type_mismatch(format!("expected a number, got {}", other.kind_name()))),
    }
}

// ── Maps ─────────────────────────────────────────────────────────────

/// Hashable projection of a value. Integral decs collapse onto ints so `1` and `1.0` share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Unit,
    Bool(bool),
    Int(BigInt),
    Dec(u64),
    Text(Rc<str>),
    Tuple(Vec<MapKey>),
    Variant(String, Box<MapKey>),
}

impl MapKey {
    /// `None` when the value (or something inside it) cannot be a key.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        Some(match value {
            Value::Unit => MapKey::Unit,
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Int(i) => MapKey::Int(i.clone()),
            Value::Dec(d) => {
                if d.is_finite() && d.fract() == 0.0 {
                    MapKey::Int(BigInt::from_f64(*d)?)
                } else {
                    MapKey::Dec(d.to_bits())
                }
            }
            Value::Text(s) => MapKey::Text(Rc::clone(s)),
            Value::Tuple(items) => MapKey::Tuple(items.iter().map(MapKey::from_value).collect::<Option<_>>()?),
            Value::Variant(v) => MapKey::Variant(v.tag.clone(), Box::new(MapKey::from_value(&v.payload)?)),
            Value::List(_) | Value::Map(_) | Value::Closure(_) | Value::Builtin(_) => return None,
        })
    }
}

/// Fails unless `key` can be stored in a map.
pub fn check_key(key: &Value) -> EvalResult<()> {
    match MapKey::from_value(key) {
        Some(_) => Ok(()),
        None => Err(EvalError::new(ErrorKind::Unhashable, format!("Unhashable map key: {}", key.kind_name()))),
    }
}

/// Insertion-ordered map; remembers the first key value inserted for each key.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: IndexMap<MapKey, (Value, Value), FxBuildHasher>,
}

/// The offending key kind when a value cannot be hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unhashable(pub &'static str);

impl ValueMap {
    pub fn new() -> Self {
        ValueMap::default()
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), Unhashable> {
        let hashed = MapKey::from_value(&key).ok_or(Unhashable(key.kind_name()))?;
        match self.entries.get_mut(&hashed) {
            Some(slot) => slot.1 = value,
            None => {
                self.entries.insert(hashed, (key, value));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Result<Option<&Value>, Unhashable> {
        let hashed = MapKey::from_value(key).ok_or(Unhashable(key.kind_name()))?;
        Ok(self.entries.get(&hashed).map(|(_, v)| v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(k, _)| k)
    }

    /// Right-biased union; existing keys keep their position.
    pub fn merged(&self, other: &ValueMap) -> ValueMap {
        let mut out = self.clone();
        for (hashed, (k, v)) in &other.entries {
            match out.entries.get_mut(hashed) {
                Some(slot) => slot.1 = v.clone(),
                None => {
                    out.entries.insert(hashed.clone(), (k.clone(), v.clone()));
                }
            }
        }
        out
    }

    fn same_entries(&self, other: &ValueMap) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(hashed, (_, v))| {
                other.entries.get(hashed).is_some_and(|(_, w)| values_equal(v, w))
            })
    }
}

// ── Closures ─────────────────────────────────────────────────────────

/// A closure body is either an AST subtree (interpreter) or compiled code (VM).
#[derive(Debug, Clone)]
pub enum ClosureBody {
    Ast(Rc<Expr>),
    Code(Rc<Code>),
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub params: Rc<Vec<Pattern>>,
    /// Index of the first parameter still to be supplied.
    pub next: usize,
    pub body: ClosureBody,
    pub env: Env,
    pub name: Option<Rc<str>>,
    /// File the body was written in; errors inside it point there.
    pub origin: Rc<Origin>,
}

/// Outcome of feeding one argument to a closure.
pub enum Accepted {
    /// More parameters remain.
    Partial(Closure),
    /// Every parameter is bound; evaluate the body in this scope.
    Saturated(Env),
}

impl Closure {
    pub fn new(params: Rc<Vec<Pattern>>, body: ClosureBody, env: Env, origin: Rc<Origin>) -> Self {
        Closure { params, next: 0, body, env, name: None, origin }
    }

    pub fn remaining(&self) -> &[Pattern] {
        self.params.get(self.next..).unwrap_or(&[])
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }

    /// Matches `arg` against the first remaining parameter and layers the
    /// bindings over the captured environment.
    pub fn accept(&self, arg: &Value, call_span: Option<Span>) -> EvalResult<Accepted> {
        let Some(first) = self.remaining().first() else {
            return Err(located(
                EvalError::new(ErrorKind::NotCallable, "Cannot call a function with no remaining parameters"),
                call_span,
            ));
        };
        let bindings = match_pattern(first, arg)?.ok_or_else(|| {
            located(
                EvalError::new(ErrorKind::ParamMismatch, "Function argument did not match parameter pattern"),
                call_span,
            )
        })?;
        let scope = Env::child(&self.env);
        scope.define_all(bindings)?;
        if self.next + 1 < self.params.len() {
            Ok(Accepted::Partial(Closure {
                params: Rc::clone(&self.params),
                next: self.next + 1,
                body: self.body.clone(),
                env: scope,
                name: self.name.clone(),
                origin: Rc::clone(&self.origin),
            }))
        } else {
            Ok(Accepted::Saturated(scope))
        }
    }
}

fn located(err: EvalError, span: Option<Span>) -> EvalError {
    match span {
        Some(s) => err.at(s),
        None => err,
    }
}

// ── Text form ────────────────────────────────────────────────────────

/// Shortest round-trip rendering of a double: `1.0`, `0.1`, `1e+16`, `1.5e-07`.
pub fn format_dec(d: f64) -> String {
    if d.is_nan() {
        return "nan".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sign = if d.is_sign_negative() { "-" } else { "" };
    let sci = format!("{:e}", d.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        let body = if exp >= 0 {
            let point = exp as usize + 1;
            let (int_part, frac_part) = if digits.len() > point {
                (digits[..point].to_string(), digits[point..].to_string())
            } else {
                (format!("{digits}{}", "0".repeat(point - digits.len())), "0".to_string())
            };
            format!("{int_part}.{frac_part}")
        } else {
            format!("0.{}{digits}", "0".repeat((-exp - 1) as usize))
        };
        format!("{sign}{body}")
    } else {
        let (lead, rest) = digits.split_at(1);
        let frac = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{sign}{lead}{frac}e{exp_sign}{:02}", exp.abs())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "ø"),
            Value::Bool(b) => write!(f, "{}", if *b { "⊤" } else { "⊥" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Dec(d) => write!(f, "{}", format_dec(*d)),
            Value::Text(s) => write!(f, "{s}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "⟦")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} ↦ {v}")?;
                }
                write!(f, "⟧")
            }
            Value::Variant(v) => write!(f, "{}•{}", v.tag, v.payload),
            Value::Closure(c) => write!(f, "<⌁ {}>", c.name.as_deref().unwrap_or("anon")),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
        }
    }
}

/// Converts a signed index/count to `usize`, `None` when negative or enormous.
pub(crate) fn to_index(n: &BigInt) -> Option<usize> {
    if n.is_negative() { None } else { n.to_usize() }
}

pub(crate) fn is_zero(v: &Value) -> bool {
    match v {
        Value::Int(i) => i.is_zero(),
        Value::Dec(d) => *d == 0.0,
        _ => false,
    }
}
