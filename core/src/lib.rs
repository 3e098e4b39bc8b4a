mod error;
pub mod op;
pub mod val;

// Bytecode, interpreter and unit loading
pub mod vm;

pub use error::{BytecodeFault, VmError};
