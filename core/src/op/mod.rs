mod ops;

pub use ops::Operator;
