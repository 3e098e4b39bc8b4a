use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;

use crate::error::VmError;
use crate::op::Operator;

use super::Value;

impl Value {
    /// Apply an operator. The left operand picks the arithmetic and the right
    /// operand is coerced to the left operand's kind. `Unm` ignores `rhs`.
    pub fn arith(&self, op: Operator, rhs: &Value) -> Result<Value, VmError> {
        let unary = !op.is_binary();
        match self {
            Value::Int(x) => {
                let y = if unary { 0 } else { rhs.to_int()? };
                int_arith(op, *x, y).map(Value::Int)
            }
            Value::Float(x) => {
                let y = if unary { 0.0 } else { rhs.to_float()? };
                float_arith(op, *x, y).map(Value::Float)
            }
            Value::Str(s) if op == Operator::Add => {
                let rhs = rhs.to_str()?;
                if rhs.is_empty() {
                    return Ok(Value::Str(Arc::clone(s)));
                }
                let mut out = String::with_capacity(s.len() + rhs.len());
                out.push_str(s);
                out.push_str(&rhs);
                Ok(Value::from(out))
            }
            other => Err(VmError::InvalidOperation { op, kind: other.kind() }),
        }
    }

    #[inline]
    pub fn pow(&self, rhs: &Value) -> Result<Value, VmError> {
        self.arith(Operator::Pow, rhs)
    }

    /// Three-way comparison returning -1, 0 or 1. Pairs without an order
    /// (NaN, distinct functions, unrelated kinds) yield -1.
    pub fn compare(&self, other: &Value) -> i8 {
        let ord = match (self, other) {
            (Value::Nil, Value::Nil) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Func(a), Value::Func(b)) if a.ptr_eq(b) => Some(Ordering::Equal),
            _ => None,
        };
        match ord {
            Some(Ordering::Equal) => 0,
            Some(Ordering::Greater) => 1,
            Some(Ordering::Less) | None => -1,
        }
    }
}

fn int_arith(op: Operator, x: i64, y: i64) -> Result<i64, VmError> {
    Ok(match op {
        Operator::Add => x.wrapping_add(y),
        Operator::Sub => x.wrapping_sub(y),
        Operator::Mul => x.wrapping_mul(y),
        Operator::Div => {
            if y == 0 {
                return Err(VmError::DivisionByZero);
            }
            x.wrapping_div(y)
        }
        Operator::Mod => {
            if y == 0 {
                return Err(VmError::DivisionByZero);
            }
            x.wrapping_rem(y)
        }
        Operator::Pow => int_pow(x, y),
        Operator::Unm => x.wrapping_neg(),
    })
}

fn int_pow(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return (base as f64).powf(exp as f64) as i64;
    }
    base.wrapping_pow(u32::try_from(exp).unwrap_or(u32::MAX))
}

fn float_arith(op: Operator, x: f64, y: f64) -> Result<f64, VmError> {
    Ok(match op {
        Operator::Add => x + y,
        Operator::Sub => x - y,
        Operator::Mul => x * y,
        Operator::Div => x / y,
        Operator::Mod => x % y,
        Operator::Pow => x.powf(y),
        Operator::Unm => -x,
    })
}

impl Add for &Value {
    type Output = Result<Value, VmError>;

    #[inline]
    fn add(self, other: Self) -> Self::Output {
        self.arith(Operator::Add, other)
    }
}

impl Sub for &Value {
    type Output = Result<Value, VmError>;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        self.arith(Operator::Sub, other)
    }
}

impl Mul for &Value {
    type Output = Result<Value, VmError>;

    #[inline]
    fn mul(self, other: Self) -> Self::Output {
        self.arith(Operator::Mul, other)
    }
}

impl Div for &Value {
    type Output = Result<Value, VmError>;

    #[inline]
    fn div(self, other: Self) -> Self::Output {
        self.arith(Operator::Div, other)
    }
}

impl Rem for &Value {
    type Output = Result<Value, VmError>;

    #[inline]
    fn rem(self, other: Self) -> Self::Output {
        self.arith(Operator::Mod, other)
    }
}

/// Unary minus (`UNM`).
impl Neg for &Value {
    type Output = Result<Value, VmError>;

    #[inline]
    fn neg(self) -> Self::Output {
        self.arith(Operator::Unm, &Value::Nil)
    }
}

/// Boolean negation of truthiness; defined for every variant.
impl Not for &Value {
    type Output = Value;

    #[inline]
    fn not(self) -> Self::Output {
        Value::Bool(!self.truthy())
    }
}
