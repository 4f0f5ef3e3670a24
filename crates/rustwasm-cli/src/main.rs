//! rustwasm CLI
//!
//! Builds a Rust source file or Cargo project into a staged WASM binary and
//! prints the JavaScript stub that loads it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// rustwasm - compile Rust to WebAssembly for a JavaScript host
#[derive(Parser)]
#[command(name = "rustwasm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "rustwasm.yaml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a `.rs` file or a `Cargo.toml` project
    Build {
        /// Source file or project manifest
        source: String,

        /// Write the glue stub here instead of stdout
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Remove staged binaries
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the stub
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Build { source, out } => {
            commands::build::run(&cli.config, &source, out.as_deref()).await?;
        }
        Commands::Clean => {
            commands::clean::run(&cli.config).await?;
        }
    }

    Ok(())
}
