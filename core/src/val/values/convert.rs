use std::sync::Arc;

use crate::error::VmError;

use super::{Function, Kind, Value};

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::Str(Arc::<str>::from(s))
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Function> for Value {
    #[inline]
    fn from(f: Function) -> Self {
        Value::Func(f)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Nil,
        }
    }
}

#[inline]
fn invalid(from: Kind, to: Kind) -> VmError {
    VmError::InvalidConversion { from, to }
}

impl Value {
    /// Integer coercion. Floats truncate toward zero (saturating at the i64
    /// bounds), strings parse after trimming.
    pub fn to_int(&self) -> Result<i64, VmError> {
        match self {
            Value::Nil => Ok(0),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Str(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(i);
                }
                trimmed
                    .parse::<f64>()
                    .map(|f| f as i64)
                    .map_err(|_| invalid(Kind::String, Kind::Int))
            }
            Value::Func(_) => Err(invalid(Kind::Func, Kind::Int)),
        }
    }

    pub fn to_float(&self) -> Result<f64, VmError> {
        match self {
            Value::Nil => Ok(0.0),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| invalid(Kind::String, Kind::Float)),
            Value::Func(_) => Err(invalid(Kind::Func, Kind::Float)),
        }
    }

    /// Text coercion; strings are returned without copying.
    pub fn to_str(&self) -> Result<Arc<str>, VmError> {
        match self {
            Value::Str(s) => Ok(Arc::clone(s)),
            Value::Func(_) => Err(invalid(Kind::Func, Kind::String)),
            other => Ok(Arc::from(other.to_string())),
        }
    }

    /// Truthiness used by `TEST` and `NOT`.
    #[inline]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Func(_) => true,
        }
    }
}
