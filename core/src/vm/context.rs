use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{BytecodeFault, VmError};
use crate::val::{Function, Value};
use crate::vm::activation::Activation;
use crate::vm::bytecode::FunctionPrototype;

/// Host-provided callable. Receives the context and the arguments exactly as
/// the caller collected them.
pub type NativeFunction = fn(ctx: &Context, args: &[Value]) -> Result<Value>;

/// Where `DUMP` snapshots go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpMode {
    Off,
    /// `debug` event on target `goblin::vm::dump`.
    #[default]
    Trace,
    /// Trace event plus a copy on stderr.
    Stderr,
}

impl FromStr for DumpMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" | "0" | "false" | "none" => Ok(DumpMode::Off),
            "trace" => Ok(DumpMode::Trace),
            "stderr" => Ok(DumpMode::Stderr),
            other => Err(anyhow::anyhow!("unknown dump mode '{}'", other)),
        }
    }
}

/// Runtime knobs that do not change instruction semantics.
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    pub dump: DumpMode,
}

impl VmConfig {
    pub const DUMP_ENV: &'static str = "GOBLIN_DUMP";

    /// Defaults overridden by `GOBLIN_DUMP`; unparsable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(Self::DUMP_ENV)
            && let Ok(mode) = raw.parse()
        {
            config.dump = mode;
        }
        config
    }
}

/// Process-wide state shared by every activation: the prototype table and the
/// native registry.
///
/// Registration takes `&mut self` while execution borrows the context
/// immutably, so the tables cannot change once a call is running.
#[derive(Debug, Default)]
pub struct Context {
    protos: Vec<Arc<FunctionPrototype>>,
    natives: FxHashMap<String, NativeFunction>,
    config: VmConfig,
}

/// A callee after name resolution.
pub(crate) enum Target<'a> {
    Native { name: &'a str, func: NativeFunction },
    Vm(&'a Arc<FunctionPrototype>),
}

impl Context {
    pub fn new(protos: Vec<FunctionPrototype>) -> Self {
        Self {
            protos: protos.into_iter().map(Arc::new).collect(),
            natives: FxHashMap::default(),
            config: VmConfig::default(),
        }
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Bind `name` to a native implementation, replacing any earlier binding.
    pub fn register_native(&mut self, name: impl Into<String>, func: NativeFunction) -> Option<NativeFunction> {
        self.natives.insert(name.into(), func)
    }

    #[inline]
    pub fn native(&self, name: &str) -> Option<NativeFunction> {
        self.natives.get(name).copied()
    }

    #[inline]
    pub fn prototypes(&self) -> &[Arc<FunctionPrototype>] {
        &self.protos
    }

    pub fn prototype(&self, index: u64) -> Result<&Arc<FunctionPrototype>, VmError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.protos.get(i))
            .ok_or(VmError::MalformedBytecode(BytecodeFault::PrototypeOutOfRange {
                index,
                len: self.protos.len(),
            }))
    }

    /// New, non-capturing function value bound to prototype `index`.
    pub fn instantiate(&self, index: u64) -> Result<Function, VmError> {
        self.prototype(index).map(|proto| Function::new(Arc::clone(proto)))
    }

    pub(crate) fn resolve<'a>(&self, func: &'a Function) -> Result<Target<'a>, VmError> {
        let proto = func.prototype();
        if !proto.is_native {
            return Ok(Target::Vm(proto));
        }
        let name = proto.native_name.as_str();
        match self.native(name) {
            Some(native) => Ok(Target::Native { name, func: native }),
            None => Err(VmError::NativeFunctionNotFound(name.to_string())),
        }
    }

    pub(crate) fn invoke(&self, target: Target<'_>, args: &[Value]) -> Result<Value, VmError> {
        match target {
            Target::Native { name, func } => {
                trace!(target: "goblin::vm", native = name, argc = args.len(), "native call");
                func(self, args).map_err(|source| VmError::Native {
                    name: name.to_string(),
                    source,
                })
            }
            Target::Vm(proto) => Activation::new(self, Arc::clone(proto)).call(args),
        }
    }

    /// Call a function value. Natives may use this to call back into the VM.
    pub fn call(&self, func: &Function, args: &[Value]) -> Result<Value, VmError> {
        let target = self.resolve(func)?;
        self.invoke(target, args)
    }

    /// Run prototype 0, the unit's entry point.
    pub fn run_entry(&self, args: &[Value]) -> Result<Value, VmError> {
        let entry = self.instantiate(0)?;
        self.call(&entry, args)
    }
}
