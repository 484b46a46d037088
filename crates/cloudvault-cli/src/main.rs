//! cloudvault - command line client for a personal cloud-storage service.
//!
//! Log in once; the session token pair is kept between runs and refreshed
//! automatically when the access token expires.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cloudvault_core::{is_session_expired, Config};

#[derive(Debug, Parser)]
#[command(name = "cloudvault", version, about = "Personal cloud storage from the terminal")]
pub struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true, env = "CLOUDVAULT_API_URL")]
    api_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session
    Login { username: Option<String> },
    /// Create an account and log in
    Register,
    /// End the session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List files
    Ls {
        /// List another user's files (admin only)
        #[arg(long)]
        user: Option<i64>,
        /// Only show files whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
    /// Upload a file
    Upload {
        path: PathBuf,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Download a file
    Download {
        id: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file
    Rm {
        id: i64,
        /// Delete another user's file (admin only)
        #[arg(long)]
        admin: bool,
    },
    /// Set the comment on a file
    Comment { id: i64, text: String },
    /// Print the share link for a file
    Share { id: i64 },
    /// Show what a share link points to
    ShareInfo { link: String },
    /// Download a file through a share link
    FetchShared {
        link: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List users (admin only)
    Users {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Grant or revoke admin rights (admin only)
    SetAdmin {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        admin: bool,
    },
    /// Delete a user (admin only)
    RmUser { id: i64 },
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must be held until exit so buffered log lines are flushed.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let log_guard = init_tracing(cli.log_file.as_ref())?;
    info!("cloudvault starting");

    let mut config = Config::load()?;
    if let Some(ref url) = cli.api_url {
        config.api_url = url.clone();
    }

    let result = commands::run(&cli, &mut config).await;
    if let Err(ref e) = result {
        if is_session_expired(e) {
            eprintln!("Session expired. Run `cloudvault login` to sign in again.");
            drop(log_guard);
            std::process::exit(2);
        }
    }
    result
}
