//! seedshare - ephemeral content sharing server.
//!
//! - `seedshare serve` (default) runs the HTTP API
//! - `seedshare sweep` removes expired records once and exits

// Use mimalloc for better multi-core performance (especially important for musl builds)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, warn};

use seedshare::config::Config;
use seedshare::{logging, server};

const AFTER_HELP: &str = "\
EXAMPLES:
  seedshare                              Serve on 0.0.0.0:30601
  seedshare serve --port 8080            Custom port
  seedshare --config ./seedshare.toml    Explicit config file
  seedshare sweep --json                 Remove expired records once";

#[derive(Parser)]
#[command(name = "seedshare")]
#[command(version)]
#[command(about = "Share text and files by seed code, for a limited time")]
#[command(after_help = AFTER_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: ./seedshare.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory for uploaded files
        #[arg(long)]
        upload_dir: Option<PathBuf>,
        /// SQLite database path (`:memory:` for a throwaway store)
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Remove expired records and their files once, then exit
    Sweep {
        /// Print the sweep report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env()?;

    let command = cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
        upload_dir: None,
        database_url: None,
    });

    if let Command::Serve {
        host,
        port,
        upload_dir,
        database_url,
    } = &command
    {
        if let Some(host) = host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
        if let Some(dir) = upload_dir {
            config.storage.upload_dir.clone_from(dir);
        }
        if let Some(url) = database_url {
            config.storage.database_url.clone_from(url);
        }
    }

    let mut log_config = config.log_config();
    if cli.verbose {
        log_config = log_config.level(Level::DEBUG);
    }
    logging::init_logging(&log_config);

    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    match command {
        Command::Serve { .. } => server::run(&config).await,
        Command::Sweep { json } => {
            let report = server::sweep_once(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Examined {}, removed {} records and {} files ({} already missing)",
                    report.examined,
                    report.records_removed,
                    report.files_removed,
                    report.files_missing
                );
                if !report.is_clean() {
                    println!(
                        "{} file errors, {} record errors",
                        report.file_errors, report.record_errors
                    );
                }
            }
            Ok(())
        },
    }
}
