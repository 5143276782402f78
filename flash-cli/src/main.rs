//! Flash CLI - command-line client for the flash daemon.
//!
//! Builds a firmware source file on the daemon and deploys the binary to a
//! mounted device, without going through the block editor.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod client;
mod commands;

use client::{FlashClient, DEFAULT_SERVER};

/// Build and deploy firmware through a running flashd.
#[derive(Parser)]
#[command(name = "flash")]
#[command(author, version)]
#[command(about = "Build and deploy firmware through a running flashd")]
#[command(propagate_version = true)]
#[command(after_help = "Examples:
  flash boards
  flash build main.cpp --target NUCLEO_F401RE --dest /media/NODE_F401RE
  flash status")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon base URL
    #[arg(long, global = true, env = "FLASH_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Print JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List boards known to the daemon
    Boards,

    /// Show daemon status and the last build
    Status,

    /// Compile a source file and deploy it to a device
    #[command(visible_alias = "b")]
    Build {
        /// Source file to submit
        file: PathBuf,

        /// Target board identifier (e.g. NUCLEO_F401RE)
        #[arg(short, long, env = "FLASH_TARGET")]
        target: String,

        /// Destination directory, usually the mounted board
        #[arg(short, long, env = "FLASH_DEST")]
        dest: String,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug,hyper=info,reqwest=info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let client = FlashClient::new(&cli.server)?;

    match cli.command {
        Commands::Boards => commands::boards::run(&client, cli.json).await,
        Commands::Status => commands::status::run(&client, cli.json).await,
        Commands::Build { file, target, dest } => {
            let deployed = commands::build::run(&client, &file, &target, &dest, cli.quiet).await?;
            if !deployed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
