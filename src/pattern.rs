//! Structural pattern matching, shared verbatim by both backends.

use crate::ast::{Pattern, PatternKind};
use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::runtime::Value;

/// Names bound by a successful match, in binding order.
pub type Bindings = Vec<(String, Value)>;

/// Matches `value` against `pattern`.
///
/// `Ok(None)` is an ordinary mismatch. A pattern that binds the same name
/// twice is an error, raised as soon as the second binding is produced.
pub fn match_pattern(pattern: &Pattern, value: &Value) -> EvalResult<Option<Bindings>> {
    let mut out = Bindings::new();
    if match_into(pattern, value, &mut out)? {
        Ok(Some(out))
    } else {
        Ok(None)
    }
}

fn match_into(pattern: &Pattern, value: &Value, out: &mut Bindings) -> EvalResult<bool> {
    let matched = match (&pattern.node, value) {
        (PatternKind::Wildcard, _) => true,
        (PatternKind::Name(name), _) => {
            if out.iter().any(|(bound, _)| bound == name) {
                return Err(duplicate(pattern));
            }
            out.push((name.clone(), value.clone()));
            true
        }
        (PatternKind::Unit, Value::Unit) => true,
        (PatternKind::Bool(b), Value::Bool(v)) => b == v,
        (PatternKind::Int(i), Value::Int(v)) => i == v,
        (PatternKind::Dec(d), Value::Dec(v)) => d == v,
        (PatternKind::Text(s), Value::Text(v)) => s.as_str() == &**v,
        (PatternKind::Tuple(items), Value::Tuple(values)) => {
            items.len() == values.len() && match_all(pattern, items, values, out)?
        }
        (PatternKind::List { items, tail }, Value::List(values)) => {
            let fits = match tail {
                None => values.len() == items.len(),
                Some(_) => values.len() >= items.len(),
            };
            if !fits || !match_all(pattern, items, &values[..items.len()], out)? {
                false
            } else if let Some(tail) = tail {
                let rest = Value::list(values[items.len()..].to_vec());
                match_nested(pattern, tail, &rest, out)?
            } else {
                true
            }
        }
        (PatternKind::Variant { tag, payload }, Value::Variant(v)) => {
            *tag == v.tag && match_into(payload, &v.payload, out)?
        }
        _ => false,
    };
    Ok(matched)
}

fn match_all(parent: &Pattern, items: &[Pattern], values: &[Value], out: &mut Bindings) -> EvalResult<bool> {
    for (item, value) in items.iter().zip(values) {
        if !match_nested(parent, item, value, out)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Sub-matches into a scratch set, then merges; a clash is reported at the enclosing pattern.
fn match_nested(parent: &Pattern, item: &Pattern, value: &Value, out: &mut Bindings) -> EvalResult<bool> {
    let mut sub = Bindings::new();
    if !match_into(item, value, &mut sub)? {
        return Ok(false);
    }
    for (name, bound) in sub {
        if out.iter().any(|(existing, _)| *existing == name) {
            return Err(duplicate(parent));
        }
        out.push((name, bound));
    }
    Ok(true)
}

fn duplicate(pattern: &Pattern) -> EvalError {
    EvalError::new(ErrorKind::DuplicateBinder, "Duplicate name binder in pattern").at(pattern.span)
}
