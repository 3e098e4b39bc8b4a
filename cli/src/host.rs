//! Natives the command-line host provides to bytecode units.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use goblin_core::val::Value;
use goblin_core::vm::Context;

pub(crate) fn register(ctx: &mut Context) {
    ctx.register_native("print", native_print);
    ctx.register_native("println", native_println);
}

/// Space-joined `Display` of every argument.
pub(crate) fn join_args(args: &[Value]) -> Result<String> {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write!(out, "{arg}")?;
    }
    Ok(out)
}

fn native_print(_ctx: &Context, args: &[Value]) -> Result<Value> {
    let text = join_args(args)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(Value::Nil)
}

fn native_println(_ctx: &Context, args: &[Value]) -> Result<Value> {
    let text = join_args(args)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(Value::Nil)
}
