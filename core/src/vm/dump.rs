use std::fmt::Write as _;

use crate::val::Value;
use crate::vm::activation::Activation;

const STACK_WINDOW: usize = 5;
const CODE_WINDOW: usize = 3;

fn describe(v: &Value) -> String {
    match v {
        Value::Nil => "[Nil]".to_string(),
        Value::Str(s) => format!("{:?} (String)", s.as_ref()),
        Value::Func(f) => format!("{} (Func)", f.name()),
        other => format!("{} ({})", other, other.kind()),
    }
}

#[inline]
fn marker(here: bool) -> &'static str {
    if here { "  ->" } else { "    " }
}

impl Activation<'_> {
    /// Human-readable snapshot of this activation for `DUMP`.
    pub fn dump(&self) -> String {
        let proto = &self.proto;
        let mut out = String::new();
        if proto.is_native {
            let _ = writeln!(out, "func {} (native)", proto.native_name);
        } else {
            let _ = writeln!(out, "func {} (file: {})", proto.display_name(), proto.debug.file);
        }

        out.push_str("  Constants:\n");
        for (i, v) in proto.constants.iter().enumerate() {
            let _ = writeln!(out, "    [{i}] {}", describe(v));
        }

        out.push_str("\n  Variables:\n");
        for (i, v) in self.vars.iter().enumerate() {
            let name = proto.variables.get(i).map(|d| d.name.as_str()).unwrap_or("?");
            let _ = writeln!(out, "    [{i}] {name} = {}", describe(v));
        }

        out.push_str("\n  Stack:\n");
        for i in self.sp.saturating_sub(STACK_WINDOW)..=self.sp {
            let v = self.stack.get(i).cloned().unwrap_or_default();
            let _ = writeln!(out, "{}[{i}] {}", marker(i == self.sp), describe(&v));
        }

        out.push_str("\n  Instructions:\n");
        let end = (self.pc + CODE_WINDOW).min(proto.instructions.len().saturating_sub(1));
        for i in self.pc.saturating_sub(CODE_WINDOW)..=end {
            if let Some(instr) = proto.instructions.get(i) {
                let _ = writeln!(out, "{}[{i}] {instr}", marker(i == self.pc));
            }
        }
        out
    }
}
