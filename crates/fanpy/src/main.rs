//! fanpy command-line interface.
//!
//! Reads serialized pod ASTs (`*.pod.json`), runs the lowering engine, and
//! writes the generated Python tree. Failures are reported as a single line
//! naming the pod, type, and error kind, with a non-zero exit.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use fanpy_ast::Pod;
use fanpy_core::{TranspileError, TranspileOptions, Transpiler};

#[derive(Parser)]
#[command(
    name = "fanpy",
    version,
    about = "Transpile analyzed Fantom pod ASTs into Python source trees"
)]
struct Cli {
    /// Pod AST files (*.pod.json) or directories to scan for them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Root of the generated output tree (overrides the config file)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// TOML config carrying out_dir and per-pod natives directories
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    out_dir: Option<PathBuf>,
    #[serde(default)]
    natives: IndexMap<String, PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(&cli) {
        Ok(pods) => {
            println!("{} {} pod(s)", "transpiled".green().bold(), pods);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let line = e
                .downcast_ref::<TranspileError>()
                .map_or_else(|| format!("{:#}", e), TranspileError::summary);
            eprintln!("{} {}", "error:".red().bold(), line);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<usize> {
    let config = load_config(cli)?;
    let out_dir = cli
        .out_dir
        .clone()
        .or(config.out_dir)
        .unwrap_or_else(|| PathBuf::from("out"));
    let opts = TranspileOptions {
        out_dir,
        natives: config.natives,
    };
    let transpiler = Transpiler::new(opts);

    let files = collect_inputs(&cli.inputs)?;
    for file in &files {
        let text = fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let pod: Pod = serde_json::from_str(&text)
            .with_context(|| format!("parsing pod AST {}", file.display()))?;
        tracing::info!(pod = %pod.name, input = %file.display(), "transpiling pod");
        transpiler.emit_pod(&pod)?;
    }
    Ok(files.len())
}

fn load_config(cli: &Cli) -> Result<ConfigFile> {
    let Some(path) = &cli.config else {
        return Ok(ConfigFile::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in walkdir::WalkDir::new(input).sort_by_file_name() {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().is_file() && name.ends_with(".pod.json") {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    if files.is_empty() {
        bail!("no pod AST files found in the given inputs");
    }
    Ok(files)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
