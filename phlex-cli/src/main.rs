//! Phlex CLI - drive a job document through the framework graph.

mod builtins;
mod job;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Phlex - hierarchical, layered, parallel data-processing orchestrator.
#[derive(Parser)]
#[command(name = "phlex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job document to completion
    Run {
        /// Path to the job YAML file
        config: PathBuf,
    },

    /// Validate a job document without running it
    Validate {
        /// Path to the job YAML file
        config: PathBuf,
    },

    /// Emit the wired graph topology as DOT
    Graph {
        /// Path to the job YAML file
        config: PathBuf,
    },
}

fn setup_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

/// Exit code 1 for configuration/wiring errors, 2 for runtime errors.
fn exit_code(error: &phlex_core::Error) -> ExitCode {
    if error.is_wiring_error() {
        ExitCode::from(1)
    } else {
        ExitCode::from(2)
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run { config } => match job::load_file(&config) {
            Ok(wired) => match wired.execute().await {
                Ok(()) => {
                    tracing::info!(config = %config.display(), "job completed");
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    eprintln!("phlex: {error}");
                    Ok(exit_code(&error))
                }
            },
            Err(error) => {
                eprintln!("phlex: {error}");
                Ok(exit_code(&error))
            }
        },
        Commands::Validate { config } => match job::load_file(&config) {
            Ok(wired) => {
                println!(
                    "{}: valid ({} nodes)",
                    config.display(),
                    wired.nodes().count()
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => {
                eprintln!("phlex: {error}");
                Ok(exit_code(&error))
            }
        },
        Commands::Graph { config } => match job::load_file(&config) {
            Ok(wired) => {
                print!("{}", wired.to_dot());
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => {
                eprintln!("phlex: {error}");
                Ok(exit_code(&error))
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    run(cli.command).await
}
