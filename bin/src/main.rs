//! coffer CLI - Attachment downloads and vault exports over a shared job pool.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Attachment downloads and vault exports", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress progress output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a single file
    Fetch {
        /// Source URL
        url: String,

        /// Output file path. Defaults to the last segment of the URL.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a vault document into a ZIP archive
    Export {
        /// Vault document: JSON with ciphers, folders, collections,
        /// organizations and attachment sources
        vault: PathBuf,

        /// Directory the archive is written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Only export these item ids (repeatable)
        #[arg(short, long)]
        item: Vec<String>,

        /// Encrypt the archive with this password
        #[arg(short, long)]
        password: Option<String>,

        /// Download attachments into the archive
        #[arg(short, long)]
        attachments: bool,
    },
}

/// Installs the stderr log subscriber. `RUST_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,coffer={level},coffer_pool={level},coffer_fetch={level},coffer_export={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Fetch { url, output } => commands::fetch::fetch(&url, output, cli.quiet).await,
        Commands::Export {
            vault,
            output_dir,
            item,
            password,
            attachments,
        } => {
            let options = commands::export::ExportOptions {
                output_dir,
                items: item,
                password,
                attachments,
            };
            commands::export::export(&vault, options, cli.quiet).await
        }
    }
}
