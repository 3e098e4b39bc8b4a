use std::sync::Arc;

use crate::error::{BytecodeFault, VmError};
use crate::val::Value;
use crate::vm::bytecode::{Flag, FunctionPrototype, Opcode};
use crate::vm::context::Context;

/// Upper bound on the slots preallocated from a prototype's stack hint.
const MAX_PREALLOC: usize = 1024;

/// One live invocation of a prototype: local slots, operand stack and program
/// counter. Built fresh for every call, never shared between calls.
pub struct Activation<'ctx> {
    pub(super) proto: Arc<FunctionPrototype>,
    pub(super) ctx: &'ctx Context,
    pub(super) vars: Vec<Value>,
    pub(super) stack: Vec<Value>,
    pub(super) sp: usize,
    pub(super) pc: usize,
}

impl<'ctx> Activation<'ctx> {
    pub fn new(ctx: &'ctx Context, proto: Arc<FunctionPrototype>) -> Self {
        let vars = vec![Value::Nil; proto.variables.len()];
        // The hint ignores loops, so the stack still grows on demand.
        let stack = Vec::with_capacity(proto.stack_size_hint.min(MAX_PREALLOC));
        Self {
            proto,
            ctx,
            vars,
            stack,
            sp: 0,
            pc: 0,
        }
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    #[inline]
    pub fn vars(&self) -> &[Value] {
        &self.vars
    }

    /// Raw stack slot, including slots at or above `sp`.
    #[inline]
    pub fn stack_slot(&self, index: usize) -> Option<&Value> {
        self.stack.get(index)
    }

    pub fn push(&mut self, v: Value) {
        if self.sp == self.stack.len() {
            self.stack.push(v);
        } else {
            self.stack[self.sp] = v;
        }
        self.sp += 1;
    }

    /// Pop the top value, leaving Nil in its slot so the reference is dropped.
    pub fn pop(&mut self) -> Result<Value, VmError> {
        if self.sp == 0 {
            return Err(VmError::underflow());
        }
        self.sp -= 1;
        Ok(std::mem::take(&mut self.stack[self.sp]))
    }

    /// Value `depth` slots below the top without popping it.
    #[inline]
    pub(super) fn peek(&self, depth: usize) -> Result<&Value, VmError> {
        if depth >= self.sp {
            return Err(VmError::underflow());
        }
        Ok(&self.stack[self.sp - 1 - depth])
    }

    #[inline]
    pub(super) fn require(&self, count: usize) -> Result<(), VmError> {
        if self.sp < count {
            return Err(VmError::underflow());
        }
        Ok(())
    }

    pub fn get_val(&self, flag: Flag, index: u64) -> Result<Value, VmError> {
        match flag {
            Flag::K => slot(&self.proto.constants, index)
                .cloned()
                .ok_or(VmError::MalformedBytecode(BytecodeFault::ConstantOutOfRange {
                    index,
                    len: self.proto.constants.len(),
                })),
            Flag::V => slot(&self.vars, index)
                .cloned()
                .ok_or(VmError::MalformedBytecode(BytecodeFault::VariableOutOfRange {
                    index,
                    len: self.vars.len(),
                })),
            Flag::N => Ok(Value::Nil),
            Flag::F => self.ctx.instantiate(index).map(Value::Func),
        }
    }

    pub fn set_val(&mut self, flag: Flag, index: u64, v: Value) -> Result<(), VmError> {
        if flag != Flag::V {
            return Err(VmError::MalformedBytecode(BytecodeFault::InvalidFlag {
                opcode: Opcode::Pop,
                flag,
            }));
        }
        let len = self.vars.len();
        match usize::try_from(index).ok().and_then(|i| self.vars.get_mut(i)) {
            Some(target) => {
                *target = v;
                Ok(())
            }
            None => Err(VmError::MalformedBytecode(BytecodeFault::VariableOutOfRange { index, len })),
        }
    }

    /// Return to a fresh state: pc and sp at zero, every slot Nil.
    pub(super) fn reset(&mut self) {
        self.pc = 0;
        self.sp = 0;
        self.stack.clear();
        self.vars.fill(Value::Nil);
    }

    /// Copy up to `expected_arg_count` positional arguments into slots 0..k.
    /// Extra arguments are dropped, missing ones leave their slots Nil.
    pub(super) fn bind_args(&mut self, args: &[Value]) -> Result<(), VmError> {
        let count = args.len().min(self.proto.expected_arg_count);
        for (i, arg) in args.iter().take(count).enumerate() {
            self.set_val(Flag::V, i as u64, arg.clone())?;
        }
        Ok(())
    }
}

#[inline]
fn slot(values: &[Value], index: u64) -> Option<&Value> {
    usize::try_from(index).ok().and_then(|i| values.get(i))
}
