use tracing::{debug, trace};

use crate::error::{BytecodeFault, VmError};
use crate::val::{Kind, Value};
use crate::vm::activation::Activation;
use crate::vm::bytecode::Opcode;
use crate::vm::context::DumpMode;

impl Activation<'_> {
    /// Bind `args` and drive this activation until `RET` or a fault.
    ///
    /// Every call starts from pc 0 with an empty stack and Nil locals.
    pub fn call(&mut self, args: &[Value]) -> Result<Value, VmError> {
        self.reset();
        self.bind_args(args)?;
        trace!(
            target: "goblin::vm",
            function = self.proto.display_name(),
            argc = args.len(),
            "enter"
        );
        match self.run() {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!(
                    target: "goblin::vm",
                    function = self.proto.display_name(),
                    pc = self.pc,
                    sp = self.sp,
                    error = %err,
                    "unwinding activation"
                );
                Err(err)
            }
        }
    }

    fn run(&mut self) -> Result<Value, VmError> {
        loop {
            if let Some(ret) = self.step()? {
                return Ok(ret);
            }
        }
    }

    /// Execute one instruction. `Some` carries the return value of `RET`.
    pub(super) fn step(&mut self) -> Result<Option<Value>, VmError> {
        let len = self.proto.instructions.len();
        let Some(&instr) = self.proto.instructions.get(self.pc) else {
            return Err(BytecodeFault::PcOutOfRange {
                target: self.pc as i64,
                len,
            }
            .into());
        };
        let (op, flag, ix) = instr.decode()?;
        // Jumps are relative to the instruction after this one.
        self.pc += 1;

        match op {
            Opcode::Ret => return self.pop().map(Some),
            Opcode::Push => {
                let v = self.get_val(flag, ix)?;
                self.push(v);
            }
            Opcode::Pop => {
                // Store first so a bad destination leaves the operand in place.
                let v = self.peek(0)?.clone();
                self.set_val(flag, ix, v)?;
                self.pop()?;
            }
            Opcode::Add => self.binary(|x, y| x + y)?,
            Opcode::Sub => self.binary(|x, y| x - y)?,
            Opcode::Mul => self.binary(|x, y| x * y)?,
            Opcode::Div => self.binary(|x, y| x / y)?,
            Opcode::Mod => self.binary(|x, y| x % y)?,
            Opcode::Pow => self.binary(|x, y| x.pow(y))?,
            Opcode::Not => self.unary(|x| Ok(!x))?,
            Opcode::Unm => self.unary(|x| -x)?,
            Opcode::Lt => self.binary(|x, y| Ok(Value::Bool(x.compare(y) == -1)))?,
            Opcode::Gt => self.binary(|x, y| Ok(Value::Bool(x.compare(y) == 1)))?,
            Opcode::Call => self.call_op(ix)?,
            Opcode::Test => {
                if !self.peek(0)?.truthy() {
                    self.jump(offset(ix))?;
                }
                self.pop()?;
            }
            Opcode::Jmpb => self.jump(-(offset(ix) + 1))?,
            Opcode::Jmpf => self.jump(offset(ix))?,
            Opcode::Dump => self.emit_dump(),
        }
        Ok(None)
    }

    /// `x` was pushed before `y`; both stay on the stack until `f` succeeds.
    fn binary<F>(&mut self, f: F) -> Result<(), VmError>
    where
        F: FnOnce(&Value, &Value) -> Result<Value, VmError>,
    {
        self.require(2)?;
        let result = f(&self.stack[self.sp - 2], &self.stack[self.sp - 1])?;
        self.pop()?;
        self.pop()?;
        self.push(result);
        Ok(())
    }

    fn unary<F>(&mut self, f: F) -> Result<(), VmError>
    where
        F: FnOnce(&Value) -> Result<Value, VmError>,
    {
        let result = f(self.peek(0)?)?;
        self.pop()?;
        self.push(result);
        Ok(())
    }

    /// `CALL n`: callee on top, its `n` arguments below in push order.
    ///
    /// Everything that can be checked up front is checked before the first
    /// pop, so a call that cannot be dispatched leaves the stack untouched.
    fn call_op(&mut self, argc: u64) -> Result<(), VmError> {
        let callee = match self.peek(0)? {
            Value::Func(f) => f.clone(),
            other => {
                return Err(VmError::TypeMismatch {
                    expected: Kind::Func,
                    found: other.kind(),
                });
            }
        };
        let argc = usize::try_from(argc).map_err(|_| VmError::underflow())?;
        self.require(argc.saturating_add(1))?;
        let target = self.ctx.resolve(&callee)?;

        self.pop()?;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop()?);
        }
        args.reverse();

        let ret = self.ctx.invoke(target, &args)?;
        self.push(ret);
        Ok(())
    }

    /// Move `pc` by `delta`; the target must stay within `0..=len`.
    fn jump(&mut self, delta: i64) -> Result<(), VmError> {
        let len = self.proto.instructions.len();
        let target = self.pc as i64 + delta;
        if target < 0 || target as usize > len {
            return Err(BytecodeFault::PcOutOfRange { target, len }.into());
        }
        self.pc = target as usize;
        Ok(())
    }

    fn emit_dump(&self) {
        match self.ctx.config().dump {
            DumpMode::Off => {}
            DumpMode::Trace => {
                if tracing::enabled!(target: "goblin::vm::dump", tracing::Level::DEBUG) {
                    debug!(target: "goblin::vm::dump", "{}", self.dump());
                }
            }
            DumpMode::Stderr => {
                let snapshot = self.dump();
                debug!(target: "goblin::vm::dump", "{}", snapshot);
                eprintln!("{snapshot}");
            }
        }
    }
}

/// Instruction indexes are at most 54 bits wide, so this never truncates.
#[inline]
fn offset(ix: u64) -> i64 {
    ix as i64
}
