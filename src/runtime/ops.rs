//! Operator semantics. Short-circuit `∧`/`∨` never reach here; both
//! backends lower them to conditional control flow.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};

use super::{compare_numbers, is_zero, to_dec, values_equal, Value};
use crate::ast::{BinOp, UnaryOp};
use crate::error::{ErrorKind, EvalError, EvalResult};

pub fn eval_unary(op: UnaryOp, v: &Value) -> EvalResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Neg => match v {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Dec(d) => Ok(Value::Dec(-d)),
            other => Err(EvalError::type_mismatch(format!(
                "Unary minus expects a number, got {}",
                other.kind_name()
            ))),
        },
    }
}

pub fn eval_binop(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, left, right),
        BinOp::Concat => concat(left, right),
        BinOp::Equals => Ok(Value::Bool(values_equal(left, right))),
        BinOp::NotEquals => Ok(Value::Bool(!values_equal(left, right))),
        BinOp::LessThan | BinOp::LessOrEqual | BinOp::GreaterThan | BinOp::GreaterOrEqual => {
            compare(op, left, right)
        }
        BinOp::And | BinOp::Or => Err(EvalError::internal(format!(
            "Short-circuit operator '{op}' reached operator evaluation"
        ))),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if !left.is_number() || !right.is_number() {
        return Err(EvalError::type_mismatch(format!(
            "{op} expects numbers, got {} and {}",
            left.kind_name(),
            right.kind_name()
        )));
    }
    if matches!(op, BinOp::Div | BinOp::Mod) && is_zero(right) {
        return Err(EvalError::new(
            ErrorKind::DivisionByZero,
            format!("Runtime error for operator '{op}': division by zero"),
        ));
    }
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return Ok(match op {
            BinOp::Add => Value::Int(a + b),
            BinOp::Sub => Value::Int(a - b),
            BinOp::Mul => Value::Int(a * b),
            BinOp::Mod => Value::Int(a.mod_floor(b)),
            _ => Value::Dec(int_ratio(a, b)?),
        });
    }
    let (a, b) = (to_dec(left)?, to_dec(right)?);
    Ok(Value::Dec(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Mod => floored_rem(a, b),
        _ => a / b,
    }))
}

/// True division of two integers, rounded once to the nearest Dec.
fn int_ratio(a: &BigInt, b: &BigInt) -> EvalResult<f64> {
    let (q, r) = a.div_rem(b);
    if r.is_zero() {
        return to_dec(&Value::Int(q));
    }
    // Scale the magnitudes so the quotient carries at least 64 bits, then
    // fold any remainder into the lowest bit so the conversion rounds right.
    let (n, d) = (a.magnitude(), b.magnitude());
    let shift = 64 + d.bits() as i64 - n.bits() as i64;
    let (n, d) = if shift >= 0 {
        (n << shift.unsigned_abs(), d.clone())
    } else {
        (n.clone(), d << shift.unsigned_abs())
    };
    let (mut q, r) = n.div_rem(&d);
    if !r.is_zero() {
        q |= BigUint::one();
    }
    let magnitude = scale_pow2(q.to_f64().unwrap_or(f64::INFINITY), -shift);
    if !magnitude.is_finite() {
        return Err(EvalError::new(ErrorKind::Overflow, "Int quotient too large for Dec"));
    }
    Ok(if a.sign() == b.sign() { magnitude } else { -magnitude })
}

/// `x * 2^exp` without overflowing the intermediate power.
fn scale_pow2(mut x: f64, exp: i64) -> f64 {
    let mut exp = exp.clamp(-2200, 2200) as i32;
    while exp > 1000 {
        x *= 2f64.powi(1000);
        exp -= 1000;
    }
    while exp < -1000 {
        x *= 2f64.powi(-1000);
        exp += 1000;
    }
    x * 2f64.powi(exp)
}

/// Remainder carrying the sign of the divisor.
fn floored_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

fn concat(left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Ok(Value::Text(Rc::from(format!("{a}{b}")))),
        (Value::List(a), Value::List(b)) => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend(a.iter().cloned());
            out.extend(b.iter().cloned());
            Ok(Value::list(out))
        }
        (Value::Map(a), Value::Map(b)) => Ok(Value::Map(Rc::new(a.merged(b)))),
        _ => Err(EvalError::type_mismatch(format!(
            "⊞ expects (Text,Text), (List,List), or (Map,Map); got {} and {}",
            left.kind_name(),
            right.kind_name()
        ))),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ if left.is_number() && right.is_number() => compare_numbers(left, right),
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "{op} expects (Num,Num) or (Text,Text); got {} and {}",
                left.kind_name(),
                right.kind_name()
            )));
        }
    };
    // NaN compares false under every ordering operator
    let result = ordering.is_some_and(|o| match op {
        BinOp::LessThan => o == Ordering::Less,
        BinOp::LessOrEqual => o != Ordering::Greater,
        BinOp::GreaterThan => o == Ordering::Greater,
        _ => o != Ordering::Less,
    });
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinOp, a: Value, b: Value) -> EvalResult<Value> {
        eval_binop(op, &a, &b)
    }

    #[test]
    fn huge_int_quotients_stay_finite() {
        let big = BigInt::from(10).pow(400u32);
        let a = Value::Int(&big + 1);
        let b = Value::Int(BigInt::from(10).pow(399u32));
        assert_eq!(bin(BinOp::Div, a, b).unwrap(), Value::Dec(10.0));
        let Value::Dec(tiny) = bin(BinOp::Div, Value::int(-1), Value::Int(big.clone())).unwrap() else {
            panic!("int division yields a Dec")
        };
        assert!(tiny == 0.0 && tiny.is_sign_negative());
        let err = bin(BinOp::Div, Value::Int(big.pow(2u32) + 1), Value::int(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn int_quotients_round_once() {
        assert_eq!(bin(BinOp::Div, Value::int(1), Value::int(3)).unwrap(), Value::Dec(1.0 / 3.0));
        assert_eq!(bin(BinOp::Div, Value::int(-7), Value::int(2)).unwrap(), Value::Dec(-3.5));
        assert_eq!(bin(BinOp::Div, Value::int(2), Value::int(-3)).unwrap(), Value::Dec(-2.0 / 3.0));
        let third = BigInt::from(10).pow(30u32);
        assert_eq!(
            bin(BinOp::Div, Value::Int(third.clone()), Value::Int(&third * 3)).unwrap(),
            Value::Dec(1.0 / 3.0)
        );
    }

    #[test]
    fn int_arithmetic_stays_int() {
        assert_eq!(bin(BinOp::Add, Value::int(1), Value::int(2)).unwrap(), Value::int(3));
        assert!(matches!(bin(BinOp::Mul, Value::int(6), Value::int(7)).unwrap(), Value::Int(_)));
    }

    #[test]
    fn big_ints_do_not_overflow() {
        let big = Value::Int(BigInt::from(i64::MAX));
        let r = bin(BinOp::Mul, big.clone(), big).unwrap();
        assert_eq!(r.to_string(), "85070591730234615847396907784232501249");
    }

    #[test]
    fn division_is_true_division() {
        assert!(matches!(bin(BinOp::Div, Value::int(6), Value::int(3)).unwrap(), Value::Dec(d) if d == 2.0));
        assert!(matches!(bin(BinOp::Div, Value::int(1), Value::int(4)).unwrap(), Value::Dec(d) if d == 0.25));
    }

    #[test]
    fn division_by_zero() {
        let err = bin(BinOp::Div, Value::int(1), Value::int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.message, "Runtime error for operator '÷': division by zero");
        let err = bin(BinOp::Mod, Value::Dec(1.0), Value::Dec(0.0)).unwrap_err();
        assert_eq!(err.code(), "E-DIV0");
    }

    #[test]
    fn modulo_is_floored() {
        assert_eq!(bin(BinOp::Mod, Value::int(-7), Value::int(3)).unwrap(), Value::int(2));
        assert_eq!(bin(BinOp::Mod, Value::int(7), Value::int(-3)).unwrap(), Value::int(-2));
        assert_eq!(bin(BinOp::Mod, Value::Dec(-7.5), Value::int(2)).unwrap(), Value::Dec(0.5));
    }

    #[test]
    fn mixed_arithmetic_widens() {
        assert_eq!(bin(BinOp::Add, Value::int(1), Value::Dec(0.5)).unwrap(), Value::Dec(1.5));
    }

    #[test]
    fn arithmetic_rejects_non_numbers() {
        let err = bin(BinOp::Add, Value::int(1), Value::text("a")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "+ expects numbers, got Int and Text");
        assert!(bin(BinOp::Sub, Value::Bool(true), Value::int(1)).is_err());
    }

    #[test]
    fn concat_kinds() {
        assert_eq!(bin(BinOp::Concat, Value::text("ab"), Value::text("c")).unwrap(), Value::text("abc"));
        assert_eq!(
            bin(BinOp::Concat, Value::list(vec![Value::int(1)]), Value::list(vec![Value::int(2)])).unwrap(),
            Value::list(vec![Value::int(1), Value::int(2)])
        );
        assert!(bin(BinOp::Concat, Value::text("a"), Value::list(vec![])).is_err());
    }

    #[test]
    fn ordering_only_for_numbers_or_text() {
        assert_eq!(bin(BinOp::LessThan, Value::int(1), Value::Dec(1.5)).unwrap(), Value::Bool(true));
        assert_eq!(bin(BinOp::GreaterOrEqual, Value::text("b"), Value::text("a")).unwrap(), Value::Bool(true));
        let err = bin(BinOp::LessThan, Value::int(1), Value::text("a")).unwrap_err();
        assert_eq!(err.message, "< expects (Num,Num) or (Text,Text); got Int and Text");
        assert_eq!(bin(BinOp::LessOrEqual, Value::Dec(f64::NAN), Value::int(1)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn unary_ops() {
        assert_eq!(eval_unary(UnaryOp::Not, &Value::Unit).unwrap(), Value::Bool(true));
        assert_eq!(eval_unary(UnaryOp::Neg, &Value::int(3)).unwrap(), Value::int(-3));
        let err = eval_unary(UnaryOp::Neg, &Value::text("x")).unwrap_err();
        assert_eq!(err.message, "Unary minus expects a number, got Text");
    }
}
