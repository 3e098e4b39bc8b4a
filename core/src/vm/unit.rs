//! Loading compiled bytecode units.
//!
//! A unit is the full prototype table an external compiler produced; prototype
//! 0 is the entry point. Units travel as JSON, YAML or TOML through serde, or
//! in the compact binary container from [`super::gbc`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use super::bytecode::FunctionPrototype;
use super::context::{Context, VmConfig};
use super::gbc;

pub const UNIT_VERSION: u16 = 1;

fn default_version() -> u16 {
    UNIT_VERSION
}

/// Optional description of where a unit came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl UnitMeta {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BytecodeUnit {
    #[serde(default = "default_version")]
    pub version: u16,
    pub prototypes: Vec<FunctionPrototype>,
    #[serde(default, skip_serializing_if = "UnitMeta::is_empty")]
    pub meta: UnitMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFormat {
    Json,
    Yaml,
    Toml,
    Binary,
}

impl UnitFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Ok(match ext.as_str() {
            "json" => UnitFormat::Json,
            "yaml" | "yml" => UnitFormat::Yaml,
            "toml" => UnitFormat::Toml,
            "gbc" => UnitFormat::Binary,
            "" => bail!("cannot infer unit format of '{}' without an extension", path.display()),
            other => bail!("unsupported unit extension '.{}'", other),
        })
    }
}

impl BytecodeUnit {
    pub fn new(prototypes: Vec<FunctionPrototype>) -> Self {
        Self {
            version: UNIT_VERSION,
            prototypes,
            meta: UnitMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: UnitMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn from_bytes(bytes: &[u8], format: UnitFormat) -> Result<Self> {
        let unit: BytecodeUnit = match format {
            UnitFormat::Json => serde_json::from_slice(bytes).context("invalid JSON bytecode unit")?,
            UnitFormat::Yaml => serde_yaml::from_slice(bytes).context("invalid YAML bytecode unit")?,
            UnitFormat::Toml => {
                let text = std::str::from_utf8(bytes).context("TOML bytecode unit is not UTF-8")?;
                toml::from_str(text).context("invalid TOML bytecode unit")?
            }
            UnitFormat::Binary => gbc::decode_unit(bytes)?,
        };
        unit.validate()?;
        Ok(unit)
    }

    pub fn to_bytes(&self, format: UnitFormat) -> Result<Vec<u8>> {
        Ok(match format {
            UnitFormat::Json => serde_json::to_vec_pretty(self)?,
            UnitFormat::Yaml => serde_yaml::to_string(self)?.into_bytes(),
            UnitFormat::Toml => toml::to_string(self)?.into_bytes(),
            UnitFormat::Binary => gbc::encode_unit(self)?,
        })
    }

    /// Read a unit from disk, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let format = UnitFormat::from_path(path)?;
        let bytes = std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        Self::from_bytes(&bytes, format).with_context(|| format!("failed to load '{}'", path.display()))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.version <= UNIT_VERSION,
            "unsupported unit version {} (reader supports <= {})",
            self.version,
            UNIT_VERSION
        );
        ensure!(!self.prototypes.is_empty(), "unit has no entry prototype");
        Ok(())
    }

    pub fn into_context(self) -> Context {
        Context::new(self.prototypes)
    }

    pub fn into_context_with(self, config: VmConfig) -> Context {
        Context::new(self.prototypes).with_config(config)
    }
}
