//! cppan CLI.
//!
//! Runs the resolve-fetch-generate pipeline in the project directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cppan::cwd::CwdGuard;
use cppan::error::Result;
use cppan::manifest::Config;
use cppan::{generate, resolve, sources};

#[derive(Parser)]
#[command(name = "cppan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C/C++ package manager and CMake build-system generator")]
struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Override the package storage directory
    #[arg(long, value_name = "PATH")]
    storage_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "cppan=debug" } else { "cppan=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().without_time().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let guard = match &cli.dir {
        Some(dir) => CwdGuard::change(dir)?,
        None => CwdGuard::capture()?,
    };
    let dir = guard.cwd().to_path_buf();

    let mut config = Config::load(&dir)?;
    if let Some(storage) = cli.storage_dir {
        config.storage_dir = storage;
    }

    for project in &mut config.projects {
        sources::find_sources(project, &dir)?;
    }

    resolve::download_dependencies(&mut config)?;
    generate::create_build_files(&config, &dir)
}
