use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BytecodeFault;
use crate::val::Value;

/// Operation selector carried by an [`Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Opcode {
    Ret = 0,
    Push,
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Not,
    Unm,
    Call,
    Lt,
    Gt,
    Test,
    Jmpb,
    Jmpf,
    Dump,
}

impl Opcode {
    pub const ALL: [Opcode; 18] = [
        Opcode::Ret,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::Not,
        Opcode::Unm,
        Opcode::Call,
        Opcode::Lt,
        Opcode::Gt,
        Opcode::Test,
        Opcode::Jmpb,
        Opcode::Jmpf,
        Opcode::Dump,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ret => "RET",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::Not => "NOT",
            Opcode::Unm => "UNM",
            Opcode::Call => "CALL",
            Opcode::Lt => "LT",
            Opcode::Gt => "GT",
            Opcode::Test => "TEST",
            Opcode::Jmpb => "JMPB",
            Opcode::Jmpf => "JMPF",
            Opcode::Dump => "DUMP",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = BytecodeFault;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(byte as usize)
            .copied()
            .ok_or(BytecodeFault::UnknownOpcode(byte))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Addressing mode of an instruction's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Flag {
    /// Constant table.
    K = 0,
    /// Local variable slot.
    V = 1,
    /// Always Nil, index ignored.
    N = 2,
    /// Fresh function bound to the index-th prototype of the context.
    F = 3,
}

impl Flag {
    #[inline]
    const fn from_bits(bits: u8) -> Flag {
        match bits & 0b11 {
            0 => Flag::K,
            1 => Flag::V,
            2 => Flag::N,
            _ => Flag::F,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Flag::K => "K",
            Flag::V => "V",
            Flag::N => "N",
            Flag::F => "F",
        };
        f.write_str(s)
    }
}

const OPCODE_BITS: u32 = 8;
const FLAG_BITS: u32 = 2;
const INDEX_SHIFT: u32 = OPCODE_BITS + FLAG_BITS;

/// Largest index an instruction word can carry (54 bits).
pub const MAX_INDEX: u64 = u64::MAX >> INDEX_SHIFT;

/// One packed bytecode word: bits 0..8 opcode, 8..10 flag, 10..64 index.
///
/// The opcode byte is only validated when the interpreter decodes the word, so
/// a unit loaded from raw words may carry opcodes this VM does not know.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u64);

impl Instruction {
    /// Build an instruction. Indexes wider than [`MAX_INDEX`] are truncated.
    #[inline]
    pub const fn new(opcode: Opcode, flag: Flag, index: u64) -> Self {
        debug_assert!(index <= MAX_INDEX);
        Instruction((opcode as u64) | ((flag as u64) << OPCODE_BITS) | ((index & MAX_INDEX) << INDEX_SHIFT))
    }

    /// Instruction without an operand (flag `N`, index 0).
    #[inline]
    pub const fn op(opcode: Opcode) -> Self {
        Self::new(opcode, Flag::N, 0)
    }

    #[inline]
    pub const fn from_word(word: u64) -> Self {
        Instruction(word)
    }

    #[inline]
    pub const fn word(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn opcode_byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    #[inline]
    pub fn opcode(self) -> Result<Opcode, BytecodeFault> {
        Opcode::try_from(self.opcode_byte())
    }

    #[inline]
    pub const fn flag(self) -> Flag {
        Flag::from_bits((self.0 >> OPCODE_BITS) as u8)
    }

    #[inline]
    pub const fn index(self) -> u64 {
        self.0 >> INDEX_SHIFT
    }

    #[inline]
    pub fn decode(self) -> Result<(Opcode, Flag, u64), BytecodeFault> {
        Ok((self.opcode()?, self.flag(), self.index()))
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({self})")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Ok(op) => write!(f, "{} {} {}", op, self.flag(), self.index()),
            Err(_) => write!(f, "<op {:#04x}> {} {}", self.opcode_byte(), self.flag(), self.index()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct InstructionRepr {
    opcode: Opcode,
    #[serde(default = "default_flag")]
    flag: Flag,
    #[serde(default)]
    index: u64,
}

fn default_flag() -> Flag {
    Flag::N
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (opcode, flag, index) = self.decode().map_err(serde::ser::Error::custom)?;
        InstructionRepr { opcode, flag, index }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = InstructionRepr::deserialize(deserializer)?;
        if repr.index > MAX_INDEX {
            return Err(serde::de::Error::custom(format!(
                "instruction index {} exceeds {}",
                repr.index, MAX_INDEX
            )));
        }
        Ok(Instruction::new(repr.opcode, repr.flag, repr.index))
    }
}

/// Name and source location of one local slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarDesc {
    pub name: String,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl VarDesc {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Declared name and source range of a function body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugInfo {
    pub name: String,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}

/// Immutable compiled description of one function body, shared by every
/// activation instantiated from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionPrototype {
    pub is_native: bool,
    pub native_name: String,
    pub stack_size_hint: usize,
    pub expected_arg_count: usize,
    pub constants: Vec<Value>,
    pub variables: Vec<VarDesc>,
    pub instructions: Vec<Instruction>,
    pub debug: DebugInfo,
}

impl FunctionPrototype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            debug: DebugInfo {
                name: name.into(),
                ..DebugInfo::default()
            },
            ..Self::default()
        }
    }

    /// Prototype whose calls are routed to the host's native registry.
    pub fn native(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            is_native: true,
            native_name: name.clone(),
            ..Self::new(name)
        }
    }

    pub fn with_constants(mut self, constants: Vec<Value>) -> Self {
        self.constants = constants;
        self
    }

    pub fn with_vars(mut self, variables: Vec<VarDesc>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_var_names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vars = names.into_iter().map(VarDesc::named).collect();
        self.with_vars(vars)
    }

    pub fn with_code(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_args(mut self, expected_arg_count: usize) -> Self {
        self.expected_arg_count = expected_arg_count;
        self
    }

    pub fn with_stack_hint(mut self, stack_size_hint: usize) -> Self {
        self.stack_size_hint = stack_size_hint;
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line_start: u32, line_end: u32) -> Self {
        self.debug.file = file.into();
        self.debug.line_start = line_start;
        self.debug.line_end = line_end;
        self
    }

    /// Declared name, `<main>` for the anonymous top-level body.
    pub fn display_name(&self) -> &str {
        if self.debug.name.is_empty() {
            "<main>"
        } else {
            &self.debug.name
        }
    }
}
