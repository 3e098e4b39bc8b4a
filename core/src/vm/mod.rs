//! Bytecode VM subsystem
//!
//! Prototypes and packed instructions, the shared execution context, per-call
//! activations with their interpreter loop, and loaders for compiled units.

mod activation;
mod bytecode;
mod context;
mod dump;
mod exec;
mod gbc;
mod unit;

pub use activation::Activation;
pub use bytecode::*;
pub use context::{Context, DumpMode, NativeFunction, VmConfig};
pub use gbc::{decode_unit, encode_unit};
pub use unit::{BytecodeUnit, UNIT_VERSION, UnitFormat, UnitMeta};
