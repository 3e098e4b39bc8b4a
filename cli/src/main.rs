use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use goblin_core::vm::{BytecodeUnit, DumpMode, UnitFormat, VmConfig};

mod host;

static TRACE_INIT: Once = Once::new();
const TRACE_ENV: &str = "GOBLIN_TRACE";
const DEFAULT_TRACE_FILTER: &str = "goblin::vm=debug,goblin_core=info,goblin_cli=info";

#[derive(Debug, Parser)]
#[command(name = "goblin", author, version, about = "Run compiled goblin bytecode units", long_about = None)]
struct CliArgs {
    /// Subcommands like `run FILE` or `encode FILE`
    #[command(subcommand)]
    command: Option<Commands>,

    /// If no subcommand, treat as a bytecode unit to run
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,

    /// Where `DUMP` snapshots go; overrides GOBLIN_DUMP
    #[arg(long, value_enum, global = true)]
    dump: Option<DumpArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpArg {
    Off,
    Trace,
    Stderr,
}

impl From<DumpArg> for DumpMode {
    fn from(value: DumpArg) -> Self {
        match value {
            DumpArg::Off => DumpMode::Off,
            DumpArg::Trace => DumpMode::Trace,
            DumpArg::Stderr => DumpMode::Stderr,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a unit (.json, .yaml, .toml or .gbc) and call its entry prototype.
    Run {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Convert a unit into the binary `.gbc` container.
    Encode {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        /// Output path, defaults to INPUT with a `.gbc` extension
        #[arg(short, long, value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let Ok(raw) = std::env::var(TRACE_ENV) else {
        return;
    };
    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());
        let builder = fmt().with_writer(std::io::stderr);
        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };
        let _ = builder.try_init();
    });
}

/// Environment first, then the command line.
fn vm_config(dump: Option<DumpArg>) -> VmConfig {
    let mut config = VmConfig::from_env();
    if let Some(dump) = dump {
        config.dump = dump.into();
    }
    config
}

fn run_file(path: &Path, config: VmConfig) -> anyhow::Result<()> {
    let unit = BytecodeUnit::load(path)?;
    tracing::debug!(
        target: "goblin::cli",
        file = %path.display(),
        prototypes = unit.prototypes.len(),
        "loaded unit"
    );
    let mut ctx = unit.into_context_with(config);
    host::register(&mut ctx);

    let value = ctx
        .run_entry(&[])
        .with_context(|| format!("failed to run '{}'", path.display()))?;
    println!("{value}");
    Ok(())
}

fn encode_file(input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let unit = BytecodeUnit::load(input)?;
    let out_path = output.map(Path::to_path_buf).unwrap_or_else(|| input.with_extension("gbc"));
    if out_path == input {
        anyhow::bail!("refusing to overwrite input '{}'", input.display());
    }

    let bytes = unit.to_bytes(UnitFormat::Binary)?;
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory for {}", out_path.display()))?;
    }
    std::fs::write(&out_path, &bytes)
        .with_context(|| format!("Failed to write bytecode to {}", out_path.display()))?;
    eprintln!("Encoded {} to {} ({} bytes)", input.display(), out_path.display(), bytes.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { command, file, dump } = CliArgs::parse();
    let config = vm_config(dump);

    match (command, file) {
        (Some(Commands::Run { file }), _) | (None, Some(file)) => run_file(&file, config),
        (Some(Commands::Encode { input, output }), _) => encode_file(&input, output.as_deref()),
        (None, None) => {
            CliArgs::command().print_help()?;
            std::process::exit(2);
        }
    }
}
