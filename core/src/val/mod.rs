//! Tagged runtime values.

mod values;

pub use values::{Function, Kind, Value};
