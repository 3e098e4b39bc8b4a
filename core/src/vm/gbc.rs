//! GBC binary container for bytecode units.
//!
//! Layout: `GBC1` magic, `u16` version, `u16` reserved, then tagged sections
//! (`[u8; 4]` tag, `u32` length, payload). `PROT` holds the prototype table and
//! is required; `META` holds JSON-encoded [`UnitMeta`]. Unknown sections are
//! skipped. All integers are little-endian. Instructions are stored as their
//! raw 64-bit words, so opcodes are only checked when executed.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail, ensure};

use super::bytecode::{DebugInfo, FunctionPrototype, Instruction, VarDesc};
use super::unit::{BytecodeUnit, UNIT_VERSION, UnitMeta};
use crate::val::Value;

const MAGIC: [u8; 4] = *b"GBC1";
const HEADER_LEN: usize = 8;

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;

const PROTO_NATIVE: u8 = 1 << 0;

pub fn encode_unit(unit: &BytecodeUnit) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, unit.version);
    write_u16(&mut out, 0);

    let mut protos = Vec::new();
    write_len(&mut protos, unit.prototypes.len(), "prototype table")?;
    for (i, proto) in unit.prototypes.iter().enumerate() {
        encode_prototype(&mut protos, proto).with_context(|| format!("while encoding prototype {i}"))?;
    }
    write_section(&mut out, *b"PROT", &protos)?;

    if !unit.meta.is_empty() {
        let meta = serde_json::to_vec(&unit.meta)?;
        write_section(&mut out, *b"META", &meta)?;
    }
    Ok(out)
}

pub fn decode_unit(bytes: &[u8]) -> Result<BytecodeUnit> {
    ensure!(bytes.len() >= HEADER_LEN, "unit too small");
    ensure!(bytes[..4] == MAGIC, "invalid GBC magic");

    let mut r = Reader::new(&bytes[4..]);
    let version = r.u16()?;
    let _reserved = r.u16()?;
    ensure!(
        version <= UNIT_VERSION,
        "unsupported GBC version {} (reader supports <= {})",
        version,
        UNIT_VERSION
    );

    let mut prototypes: Option<Vec<FunctionPrototype>> = None;
    let mut meta: Option<UnitMeta> = None;
    while !r.is_empty() {
        let tag = r.tag()?;
        let len = r.u32()? as usize;
        let payload = r.take(len).context("section overruns payload")?;
        match &tag {
            b"PROT" => {
                ensure!(prototypes.is_none(), "duplicate PROT section");
                prototypes = Some(decode_prototypes(payload)?);
            }
            b"META" => {
                ensure!(meta.is_none(), "duplicate META section");
                meta = Some(serde_json::from_slice(payload).context("invalid META section")?);
            }
            _ => {}
        }
    }

    let prototypes = prototypes.ok_or_else(|| anyhow::anyhow!("missing PROT section"))?;
    Ok(BytecodeUnit {
        version,
        prototypes,
        meta: meta.unwrap_or_default(),
    })
}

fn encode_prototype(out: &mut Vec<u8>, proto: &FunctionPrototype) -> Result<()> {
    write_u8(out, if proto.is_native { PROTO_NATIVE } else { 0 });
    write_str(out, &proto.native_name)?;
    write_len(out, proto.stack_size_hint, "stack size hint")?;
    write_len(out, proto.expected_arg_count, "argument count")?;

    let DebugInfo {
        name,
        file,
        line_start,
        line_end,
    } = &proto.debug;
    write_str(out, name)?;
    write_str(out, file)?;
    write_u32(out, *line_start);
    write_u32(out, *line_end);

    write_len(out, proto.constants.len(), "constant table")?;
    for v in &proto.constants {
        encode_value(out, v)?;
    }

    write_len(out, proto.variables.len(), "variable table")?;
    for var in &proto.variables {
        write_str(out, &var.name)?;
        write_str(out, &var.file)?;
        write_u32(out, var.line_start);
        write_u32(out, var.line_end);
    }

    write_len(out, proto.instructions.len(), "instruction stream")?;
    for instr in &proto.instructions {
        out.extend_from_slice(&instr.word().to_le_bytes());
    }
    Ok(())
}

fn decode_prototypes(payload: &[u8]) -> Result<Vec<FunctionPrototype>> {
    let mut r = Reader::new(payload);
    let count = r.u32()? as usize;
    let mut protos = Vec::with_capacity(count.min(payload.len()));
    for i in 0..count {
        protos.push(decode_prototype(&mut r).with_context(|| format!("while decoding prototype {i}"))?);
    }
    ensure!(r.is_empty(), "extra data at end of PROT section");
    Ok(protos)
}

fn decode_prototype(r: &mut Reader<'_>) -> Result<FunctionPrototype> {
    let bits = r.u8()?;
    ensure!(bits & !PROTO_NATIVE == 0, "unknown prototype flags {:#04x}", bits);
    let native_name = r.string()?;
    let stack_size_hint = r.u32()? as usize;
    let expected_arg_count = r.u32()? as usize;
    let debug = DebugInfo {
        name: r.string()?,
        file: r.string()?,
        line_start: r.u32()?,
        line_end: r.u32()?,
    };

    let n = r.u32()? as usize;
    let mut constants = Vec::with_capacity(n.min(r.remaining()));
    for _ in 0..n {
        constants.push(decode_value(r)?);
    }

    let n = r.u32()? as usize;
    let mut variables = Vec::with_capacity(n.min(r.remaining()));
    for _ in 0..n {
        variables.push(VarDesc {
            name: r.string()?,
            file: r.string()?,
            line_start: r.u32()?,
            line_end: r.u32()?,
        });
    }

    let n = r.u32()? as usize;
    let mut instructions = Vec::with_capacity(n.min(r.remaining() / 8));
    for _ in 0..n {
        instructions.push(Instruction::from_word(r.u64()?));
    }

    Ok(FunctionPrototype {
        is_native: bits & PROTO_NATIVE != 0,
        native_name,
        stack_size_hint,
        expected_arg_count,
        constants,
        variables,
        instructions,
        debug,
    })
}

fn encode_value(out: &mut Vec<u8>, v: &Value) -> Result<()> {
    match v {
        Value::Nil => write_u8(out, TAG_NIL),
        Value::Bool(b) => {
            write_u8(out, TAG_BOOL);
            write_u8(out, *b as u8);
        }
        Value::Int(i) => {
            write_u8(out, TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            write_u8(out, TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::Str(s) => {
            write_u8(out, TAG_STR);
            write_str(out, s)?;
        }
        Value::Func(_) => bail!("function values cannot be stored as constants"),
    }
    Ok(())
}

fn decode_value(r: &mut Reader<'_>) -> Result<Value> {
    Ok(match r.u8()? {
        TAG_NIL => Value::Nil,
        TAG_BOOL => match r.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => bail!("invalid bool byte {}", other),
        },
        TAG_INT => Value::Int(r.u64()? as i64),
        TAG_FLOAT => Value::Float(f64::from_bits(r.u64()?)),
        TAG_STR => Value::Str(Arc::from(r.string()?)),
        other => bail!("unknown constant tag {}", other),
    })
}

fn write_section(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    out.extend_from_slice(&tag);
    write_len(out, payload.len(), "section")?;
    out.extend_from_slice(payload);
    Ok(())
}

#[inline]
fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

#[inline]
fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_len(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let Ok(len) = u32::try_from(len) else {
        bail!("{} too large for GBC ({} entries)", what, len);
    };
    write_u32(out, len);
    Ok(())
}

fn write_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    write_len(out, value.len(), "string")?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Bounds-checked little-endian cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            bail!("unexpected end of input: wanted {} bytes, {} left", n, self.remaining());
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn tag(&mut self) -> Result<[u8; 4]> {
        self.array().context("truncated section header")
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).context("invalid UTF-8 in string")
    }
}
