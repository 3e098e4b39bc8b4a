use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::vm::FunctionPrototype;

mod convert;
mod ops;

/// A VM value. Exactly one variant is live; there is no implicit variant other
/// than the ones the arithmetic in `ops` defines.
#[derive(Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Functions only exist at runtime, constants can never hold one.
    #[serde(skip)]
    Func(Function),
}

/// Fieldless mirror of [`Value`]'s variants, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Nil,
    Bool,
    Int,
    Float,
    String,
    Func,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Nil => "Nil",
            Kind::Bool => "Bool",
            Kind::Int => "Int",
            Kind::Float => "Float",
            Kind::String => "String",
            Kind::Func => "Func",
        };
        f.write_str(name)
    }
}

/// Callable handle bound to one prototype.
///
/// Cloning copies the handle. Two handles are the same function only when they
/// come from the same instantiation, even if they share a prototype.
#[derive(Clone)]
pub struct Function(Arc<FunctionHandle>);

struct FunctionHandle {
    proto: Arc<FunctionPrototype>,
}

impl Function {
    pub fn new(proto: Arc<FunctionPrototype>) -> Self {
        Function(Arc::new(FunctionHandle { proto }))
    }

    #[inline]
    pub fn prototype(&self) -> &Arc<FunctionPrototype> {
        &self.0.proto
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.0.proto.display_name()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("native", &self.0.proto.is_native)
            .finish()
    }
}

impl Value {
    #[inline]
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::String,
            Value::Func(_) => Kind::Func,
        }
    }

    pub fn as_func(&self) -> Option<&Function> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Str(s) => write!(f, "Str({:?})", s.as_ref()),
            Value::Func(func) => write!(f, "Func({})", func.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => f.write_str(itoa::Buffer::new().format(*i)),
            Value::Float(x) => f.write_str(ryu::Buffer::new().format(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Func(func) => write!(f, "<func {}>", func.name()),
        }
    }
}

/// Same-variant equality; functions compare by handle identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}
