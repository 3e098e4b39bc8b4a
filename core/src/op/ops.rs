use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Operators that can be rejected by a value's arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
}

impl Operator {
    #[inline]
    pub fn is_binary(self) -> bool {
        !matches!(self, Operator::Unm)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Add => "Add",
            Operator::Sub => "Sub",
            Operator::Mul => "Mul",
            Operator::Div => "Div",
            Operator::Mod => "Mod",
            Operator::Pow => "Pow",
            Operator::Unm => "Unm",
        };
        f.write_str(name)
    }
}
