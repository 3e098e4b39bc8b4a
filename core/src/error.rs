use thiserror::Error;

use crate::op::Operator;
use crate::val::Kind;
use crate::vm::{Flag, Opcode};

/// Fault raised while executing bytecode.
///
/// None of these are recovered inside the interpreter: the failing activation
/// and every activation above it unwind back to the embedding host.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("cannot convert {from} to {to}")]
    InvalidConversion { from: Kind, to: Kind },

    #[error("cannot apply {op} on a {kind} value")]
    InvalidOperation { op: Operator, kind: Kind },

    #[error("native function not found: {0}")]
    NativeFunctionNotFound(String),

    #[error("malformed bytecode: {0}")]
    MalformedBytecode(#[from] BytecodeFault),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Kind, found: Kind },

    #[error("division by zero")]
    DivisionByZero,

    #[error("native function `{name}` failed: {source}")]
    Native {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Inconsistencies in a compiled unit that a correct compiler never emits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeFault {
    #[error("pop on an empty operand stack")]
    StackUnderflow,

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("flag {flag} is not valid for {opcode}")]
    InvalidFlag { opcode: Opcode, flag: Flag },

    #[error("constant index {index} out of range ({len} constants)")]
    ConstantOutOfRange { index: u64, len: usize },

    #[error("variable index {index} out of range ({len} slots)")]
    VariableOutOfRange { index: u64, len: usize },

    #[error("prototype index {index} out of range ({len} prototypes)")]
    PrototypeOutOfRange { index: u64, len: usize },

    #[error("program counter {target} outside code of length {len}")]
    PcOutOfRange { target: i64, len: usize },
}

impl VmError {
    /// Shorthand used by the interpreter when the operand stack runs dry.
    #[inline]
    pub(crate) fn underflow() -> Self {
        VmError::MalformedBytecode(BytecodeFault::StackUnderflow)
    }

    #[inline]
    pub fn is_malformed(&self) -> bool {
        matches!(self, VmError::MalformedBytecode(_))
    }
}
