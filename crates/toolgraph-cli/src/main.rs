//! Toolgraph - tool program loader
//!
//! Usage:
//!   toolgraph ./tool.gpt                   # Print the resolved program as JSON
//!   toolgraph --sub-tool lister ./tool.gpt # Start from a named tool
//!   toolgraph --assemble -o out.json URL   # Write a self-contained artifact
//!   cat tool.gpt | toolgraph -             # Read the root tool from stdin

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use toolgraph_core::config::{ConfigStore, LoaderConfig};
use toolgraph_core::monitor::MonitorFactory;
use toolgraph_core::program::Program;
use toolgraph_core::resolver::Resolver;
use toolgraph_core::source::{Location, Source};
use toolgraph_core::{assemble, source::normalize_path};

#[derive(Parser)]
#[command(name = "toolgraph")]
#[command(about = "Resolve tool programs into a single graph", long_about = None)]
struct Cli {
    /// Tool file, URL, or `-` to read from stdin
    program: String,

    /// Use the named tool of the file as the entry
    #[arg(long)]
    sub_tool: Option<String>,

    /// Write a self-contained artifact instead of the program JSON
    #[arg(long)]
    assemble: bool,

    /// Output file (stdout when omitted or `-`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the load-time run record (the program, no calls) to a file
    #[arg(long, value_name = "FILE")]
    dump_state: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, conflicts_with = "quiet")]
    debug: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn default_filter(&self) -> &'static str {
        if self.debug {
            "toolgraph=debug,info"
        } else if self.quiet {
            "error"
        } else {
            "toolgraph=info,warn"
        }
    }

    /// Output file, or `None` for stdout.
    fn output_path(&self) -> Option<&Path> {
        self.output
            .as_deref()
            .filter(|path| path.as_os_str() != "-")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.default_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = load_config(cli.config.clone())?;
    let resolver = Resolver::with_default_fetcher(config.clone())
        .context("Failed to initialize the source fetcher")?;
    let sub_tool = cli.sub_tool.as_deref().unwrap_or_default();

    let program = if cli.program == "-" {
        let source = stdin_source(&config)?;
        resolver.load_source(source, sub_tool).await
    } else {
        resolver.load(&cli.program, sub_tool, None).await
    }
    .with_context(|| format!("Failed to load {}", cli.program))?;

    if let Some(path) = &cli.dump_state {
        dump_load_state(&program, path)?;
    }

    write_output(&cli, &program)
}

/// Record of a run that loaded `program` and made no calls.
fn dump_load_state(program: &Program, path: &Path) -> Result<()> {
    let monitor = MonitorFactory::new(Some(path.to_path_buf())).start(program, "");
    monitor
        .stop("", None)
        .with_context(|| format!("Failed to write state dump: {}", path.display()))
}

fn load_config(path: Option<PathBuf>) -> Result<LoaderConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_dir()?,
    };
    store
        .load()
        .with_context(|| format!("Failed to load config: {}", store.config_path().display()))
}

/// Root source read from stdin, placed in the working directory.
fn stdin_source(config: &LoaderConfig) -> Result<Source> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read program from stdin")?;

    let dir = match &config.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let location = Location::Local(normalize_path(&dir.join("<stdin>")));
    Ok(Source::inline(location, &text))
}

fn write_output(cli: &Cli, program: &Program) -> Result<()> {
    if let Some(path) = cli.output_path() {
        if cli.assemble {
            assemble::assemble_to_path(program, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        } else {
            let json = serde_json::to_string_pretty(program)?;
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        tracing::info!(path = %path.display(), "output written");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.assemble {
        assemble::assemble(program, &mut out)?;
    } else {
        serde_json::to_writer_pretty(&mut out, program)?;
        writeln!(out)?;
    }
    Ok(())
}
