use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::Signed;

use super::{to_index, Env, Value, ValueMap};
use crate::ast::Span;
use crate::error::{ErrorKind, EvalError, EvalResult};

/// What a native function may ask of the engine running it.
pub trait Host {
    /// Applies a callable to one argument, exactly as a `Call` node would.
    fn apply(&mut self, func: Value, arg: Value, call_span: Option<Span>) -> EvalResult<Value>;
    fn say(&mut self, line: &str) -> EvalResult<()>;
    fn hear(&mut self, prompt: &str) -> EvalResult<String>;
    /// Loads (or reuses) a module relative to the running file and exports one member.
    fn link(&mut self, path: &str, member: &str, call_span: Option<Span>) -> EvalResult<Value>;
}

pub type NativeFn = fn(&mut dyn Host, &[Value], Option<Span>) -> EvalResult<Value>;

/// A curried native function.
#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub bound: Vec<Value>,
    pub func: NativeFn,
}

pub enum Curry {
    Partial(Builtin),
    Saturated(Vec<Value>),
}

impl Builtin {
    pub fn new(name: &'static str, arity: usize, func: NativeFn) -> Self {
        Builtin { name, arity, bound: Vec::new(), func }
    }

    /// Adds one argument: a new partial builtin, or the full argument list once arity is reached.
    pub fn bind(&self, arg: Value) -> EvalResult<Curry> {
        if self.bound.len() >= self.arity {
            return Err(EvalError::new(ErrorKind::OverApplied, "Builtin over-applied"));
        }
        let mut bound = self.bound.clone();
        bound.push(arg);
        if bound.len() < self.arity {
            Ok(Curry::Partial(Builtin { bound, ..self.clone() }))
        } else {
            Ok(Curry::Saturated(bound))
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("bound", &self.bound)
            .finish()
    }
}

const TABLE: &[(&str, usize, NativeFn)] = &[
    ("say", 1, say),
    ("hear", 1, hear),
    ("text", 1, text),
    ("abs", 1, abs),
    ("count", 1, count),
    ("at", 2, at),
    ("take", 2, take),
    ("drop", 2, drop),
    ("keys", 1, keys),
    ("has", 2, has),
    ("put", 3, put),
    ("map", 2, map),
    ("fold", 3, fold),
    ("link", 2, link),
];

/// A fresh builtin scope. Each program and module gets its own.
pub fn scope() -> Env {
    let env = Env::root();
    for &(name, arity, func) in TABLE {
        env.define(name, Value::Builtin(Rc::new(Builtin::new(name, arity, func))))
            .expect("builtin names are distinct");
    }
    env
}

pub fn names() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|(name, _, _)| *name)
}

// ── Argument helpers ─────────────────────────────────────────────────

fn arg(args: &[Value], i: usize) -> EvalResult<&Value> {
    args.get(i).ok_or_else(|| EvalError::internal(format!("builtin called with {} arguments", args.len())))
}

fn int_arg<'a>(builtin: &str, what: &str, v: &'a Value) -> EvalResult<&'a BigInt> {
    match v {
        Value::Int(i) => Ok(i),
        other => Err(EvalError::type_mismatch(format!(
            "{builtin} expects an Int {what}; got {}",
            other.kind_name()
        ))),
    }
}

fn count_arg(builtin: &str, v: &Value) -> EvalResult<usize> {
    let n = int_arg(builtin, "count", v)?;
    if n.is_negative() {
        return Err(EvalError::type_mismatch(format!("{builtin} expects a non-negative count")));
    }
    Ok(to_index(n).unwrap_or(usize::MAX))
}

fn map_arg<'a>(builtin: &str, v: &'a Value) -> EvalResult<&'a Rc<ValueMap>> {
    match v {
        Value::Map(m) => Ok(m),
        other => Err(EvalError::type_mismatch(format!("{builtin} expects a Map, got {}", other.kind_name()))),
    }
}

fn list_arg<'a>(builtin: &str, v: &'a Value) -> EvalResult<&'a Rc<Vec<Value>>> {
    match v {
        Value::List(items) => Ok(items),
        other => Err(EvalError::type_mismatch(format!("{builtin} expects a list, got {}", other.kind_name()))),
    }
}

fn unhashable(builtin: &str) -> EvalError {
    EvalError::new(ErrorKind::Unhashable, format!("{builtin} expects a hashable key"))
}

// ── Implementations ──────────────────────────────────────────────────

fn say(host: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    host.say(&arg(args, 0)?.to_string())?;
    Ok(Value::Unit)
}

fn hear(host: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let line = host.hear(&arg(args, 0)?.to_string())?;
    Ok(Value::text(&line))
}

fn text(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    Ok(Value::text(&arg(args, 0)?.to_string()))
}

fn abs(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    match arg(args, 0)? {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Dec(d) => Ok(Value::Dec(d.abs())),
        other => Err(EvalError::type_mismatch(format!("abs expects a number, got {}", other.kind_name()))),
    }
}

fn count(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let n = match arg(args, 0)? {
        Value::Text(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Map(m) => m.len(),
        other => {
            return Err(EvalError::type_mismatch(format!(
                "count expects Text, List, Tuple, or Map; got {}",
                other.kind_name()
            )));
        }
    };
    Ok(Value::Int(BigInt::from(n)))
}

fn at(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let (xs, i) = (arg(args, 0)?, arg(args, 1)?);
    let i = int_arg("at", "index", i)?;
    let resolve = |len: usize, what: &str| -> EvalResult<usize> {
        let j = if i.is_negative() { BigInt::from(len) + i } else { i.clone() };
        to_index(&j).filter(|j| *j < len).ok_or_else(|| {
            EvalError::new(ErrorKind::IndexOutOfRange, format!("Index {i} out of range for {what} of length {len}"))
        })
    };
    match xs {
        Value::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            let j = resolve(chars.len(), "Text")?;
            Ok(Value::Text(Rc::from(chars[j].to_string())))
        }
        Value::List(items) | Value::Tuple(items) => {
            let j = resolve(items.len(), "sequence")?;
            Ok(items[j].clone())
        }
        other => Err(EvalError::type_mismatch(format!(
            "at expects Text, List, or Tuple; got {}",
            other.kind_name()
        ))),
    }
}

fn take(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let (xs, n) = (arg(args, 0)?, count_arg("take", arg(args, 1)?)?);
    match xs {
        Value::Text(s) => Ok(Value::Text(Rc::from(s.chars().take(n).collect::<String>()))),
        Value::List(items) => Ok(Value::list(items.iter().take(n).cloned().collect())),
        other => Err(EvalError::type_mismatch(format!("take expects Text or List; got {}", other.kind_name()))),
    }
}

fn drop(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let (xs, n) = (arg(args, 0)?, count_arg("drop", arg(args, 1)?)?);
    match xs {
        Value::Text(s) => Ok(Value::Text(Rc::from(s.chars().skip(n).collect::<String>()))),
        Value::List(items) => Ok(Value::list(items.iter().skip(n).cloned().collect())),
        other => Err(EvalError::type_mismatch(format!("drop expects Text or List; got {}", other.kind_name()))),
    }
}

fn keys(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let m = map_arg("keys", arg(args, 0)?)?;
    Ok(Value::list(m.keys().cloned().collect()))
}

fn has(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let m = map_arg("has", arg(args, 0)?)?;
    let found = m.get(arg(args, 1)?).map_err(|_| unhashable("has"))?;
    Ok(Value::Bool(found.is_some()))
}

fn put(_: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let m = map_arg("put", arg(args, 0)?)?;
    let mut out = (**m).clone();
    out.insert(arg(args, 1)?.clone(), arg(args, 2)?.clone()).map_err(|_| unhashable("put"))?;
    Ok(Value::Map(Rc::new(out)))
}

fn map(host: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let func = arg(args, 0)?;
    let items = list_arg("map", arg(args, 1)?)?;
    let mut out = Vec::with_capacity(items.len());
    for x in items.iter() {
        out.push(host.apply(func.clone(), x.clone(), None)?);
    }
    Ok(Value::list(out))
}

fn fold(host: &mut dyn Host, args: &[Value], _: Option<Span>) -> EvalResult<Value> {
    let func = arg(args, 0)?;
    let mut acc = arg(args, 1)?.clone();
    for x in list_arg("fold", arg(args, 2)?)?.iter() {
        let step = host.apply(func.clone(), acc, None)?;
        acc = host.apply(step, x.clone(), None)?;
    }
    Ok(acc)
}

fn link(host: &mut dyn Host, args: &[Value], call_span: Option<Span>) -> EvalResult<Value> {
    let (Value::Text(path), Value::Text(member)) = (arg(args, 0)?, arg(args, 1)?) else {
        return Err(EvalError::type_mismatch(format!(
            "link expects (Text,Text); got ({},{})",
            arg(args, 0)?.kind_name(),
            arg(args, 1)?.kind_name()
        )));
    };
    if member.starts_with('_') {
        return Err(EvalError::new(ErrorKind::PrivateMember, format!("Module member '{member}' is private")));
    }
    host.link(path, member, call_span)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Host that applies builtins only and records console traffic.
    #[derive(Default)]
    struct Recorder {
        out: Vec<String>,
        input: Vec<String>,
        closed: bool,
    }

    impl Host for Recorder {
        fn apply(&mut self, func: Value, arg: Value, _: Option<Span>) -> EvalResult<Value> {
            match func {
                Value::Builtin(b) => match b.bind(arg)? {
                    Curry::Partial(p) => Ok(Value::Builtin(Rc::new(p))),
                    Curry::Saturated(args) => (b.func)(self, &args, None),
                },
                _ => Err(EvalError::new(ErrorKind::NotCallable, "Value is not callable")),
            }
        }
        fn say(&mut self, line: &str) -> EvalResult<()> {
            if self.closed {
                return Err(EvalError::internal("cannot write output: broken pipe"));
            }
            self.out.push(line.to_string());
            Ok(())
        }
        fn hear(&mut self, prompt: &str) -> EvalResult<String> {
            self.out.push(prompt.to_string());
            Ok(self.input.pop().unwrap_or_default())
        }
        fn link(&mut self, path: &str, member: &str, _: Option<Span>) -> EvalResult<Value> {
            Ok(Value::text(&format!("{path}:{member}")))
        }
    }

    fn builtin(name: &str) -> Value {
        scope().lookup(name).unwrap()
    }

    fn call(host: &mut Recorder, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let mut f = builtin(name);
        for a in args {
            f = host.apply(f, a, None)?;
        }
        Ok(f)
    }

    #[test]
    fn currying_returns_partial_until_saturated() {
        let at = builtin("at");
        let Value::Builtin(b) = &at else { panic!("at is a builtin") };
        let Curry::Partial(partial) = b.bind(Value::list(vec![Value::int(7)])).unwrap() else {
            panic!("one argument should leave a partial builtin")
        };
        assert_eq!(partial.bound.len(), 1);
        let Curry::Saturated(args) = partial.bind(Value::int(0)).unwrap() else {
            panic!("second argument should saturate")
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn over_application_is_an_error() {
        let saturated = Builtin { bound: vec![Value::Unit], ..Builtin::new("say", 1, say) };
        let err = saturated.bind(Value::Unit).err().unwrap();
        assert_eq!(err.kind, ErrorKind::OverApplied);
        assert_eq!(err.code(), "E-ARITY");
    }

    #[test]
    fn say_and_hear_use_the_host() {
        let mut host = Recorder { input: vec!["yes".into()], ..Default::default() };
        call(&mut host, "say", vec![Value::tuple(vec![Value::int(1), Value::Bool(true)])]).unwrap();
        let answer = call(&mut host, "hear", vec![Value::text("? ")]).unwrap();
        assert_eq!(answer, Value::text("yes"));
        assert_eq!(host.out, vec!["(1 ⊤)", "? "]);
        assert_eq!(call(&mut host, "hear", vec![Value::text("")]).unwrap(), Value::text(""));
    }

    #[test]
    fn say_reports_output_failures() {
        let mut host = Recorder { closed: true, ..Default::default() };
        let err = call(&mut host, "say", vec![Value::text("lost")]).unwrap_err();
        assert_eq!(err.code(), "E-INTERNAL");
        assert!(err.message.contains("broken pipe"));
        assert!(host.out.is_empty());
    }

    #[test]
    fn builtin_names_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        assert!(names().all(|n| seen.insert(n)));
    }

    #[test]
    fn at_supports_negative_indices() {
        let mut host = Recorder::default();
        let xs = Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]);
        assert_eq!(call(&mut host, "at", vec![xs.clone(), Value::int(-1)]).unwrap(), Value::int(3));
        assert_eq!(call(&mut host, "at", vec![Value::text("héllo"), Value::int(1)]).unwrap(), Value::text("é"));
        let err = call(&mut host, "at", vec![xs, Value::int(3)]).unwrap_err();
        assert_eq!(err.message, "Index 3 out of range for sequence of length 3");
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn take_and_drop() {
        let mut host = Recorder::default();
        let xs = Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]);
        assert_eq!(
            call(&mut host, "take", vec![xs.clone(), Value::int(2)]).unwrap(),
            Value::list(vec![Value::int(1), Value::int(2)])
        );
        assert_eq!(call(&mut host, "drop", vec![xs.clone(), Value::int(10)]).unwrap(), Value::list(vec![]));
        assert_eq!(call(&mut host, "take", vec![Value::text("abc"), Value::int(1)]).unwrap(), Value::text("a"));
        let err = call(&mut host, "drop", vec![xs, Value::int(-1)]).unwrap_err();
        assert_eq!(err.message, "drop expects a non-negative count");
    }

    #[test]
    fn map_builtins_do_not_mutate() {
        let mut host = Recorder::default();
        let empty = Value::Map(Rc::new(ValueMap::new()));
        let one = call(&mut host, "put", vec![empty.clone(), Value::text("k"), Value::int(1)]).unwrap();
        assert_eq!(call(&mut host, "count", vec![empty.clone()]).unwrap(), Value::int(0));
        assert_eq!(call(&mut host, "has", vec![one.clone(), Value::text("k")]).unwrap(), Value::Bool(true));
        assert_eq!(call(&mut host, "keys", vec![one.clone()]).unwrap(), Value::list(vec![Value::text("k")]));
        let err = call(&mut host, "put", vec![one, Value::list(vec![]), Value::Unit]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unhashable);
    }

    #[test]
    fn fold_applies_accumulator_first() {
        let mut host = Recorder::default();
        let grid = Value::list(vec![
            Value::list(vec![Value::int(5), Value::int(6)]),
            Value::list(vec![Value::int(7), Value::int(8)]),
        ]);
        // at (at grid 1) 0
        let path = Value::list(vec![Value::int(1), Value::int(0)]);
        let r = call(&mut host, "fold", vec![builtin("at"), grid, path]).unwrap();
        assert_eq!(r, Value::int(7));
    }

    #[test]
    fn map_applies_to_each_item() {
        let mut host = Recorder::default();
        let words = Value::list(vec![Value::text("ab"), Value::text("c")]);
        let counted = call(&mut host, "map", vec![builtin("count"), words]).unwrap();
        assert_eq!(counted, Value::list(vec![Value::int(2), Value::int(1)]));
        let err = call(&mut host, "map", vec![builtin("count"), Value::int(1)]).unwrap_err();
        assert_eq!(err.message, "map expects a list, got Int");
    }

    #[test]
    fn link_checks_privacy_before_loading() {
        let mut host = Recorder::default();
        let err = call(&mut host, "link", vec![Value::text("m"), Value::text("_secret")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrivateMember);
        assert_eq!(err.message, "Module member '_secret' is private");
        assert_eq!(call(&mut host, "link", vec![Value::text("m"), Value::text("x")]).unwrap(), Value::text("m:x"));
    }

    #[test]
    fn scope_holds_every_builtin() {
        let env = scope();
        for name in names() {
            assert!(env.lookup_local(name).is_some(), "{name} missing");
        }
        assert_eq!(names().count(), 14);
    }
}
