use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;

#[derive(Parser)]
#[command(name = "qanoon")]
#[command(about = "Terminal client for the Qanoon legal assistant", long_about = None)]
struct Cli {
    /// Settings file to use instead of the one in the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the OAuth URL to open in a browser
    Login {
        /// OAuth provider; defaults to the configured one
        #[arg(long)]
        provider: Option<String>,
    },
    /// Store the session returned by the OAuth callback
    Session {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Unix seconds at which the access token expires
        #[arg(long)]
        expires_at: Option<u64>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// List your chats, newest first
    Threads,
    /// Print the messages of one chat
    Show { thread_id: String },
    /// Refresh the chat list and open the newest chat
    Latest,
    /// Add a PDF to an existing chat
    Attach { thread_id: String, file: PathBuf },
    /// Show or change the custom system prompt
    Settings {
        #[arg(long, conflicts_with = "reset")]
        prompt: Option<String>,
        #[arg(long)]
        reset: bool,
    },
    /// Show or change where the client connects
    Config {
        #[arg(long)]
        api_base_url: Option<String>,
        #[arg(long)]
        auth_url: Option<String>,
        #[arg(long)]
        auth_anon_key: Option<String>,
        #[arg(long)]
        redirect_url: Option<String>,
        /// Request timeout in milliseconds; 0 disables it
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(error = ?error, "command failed");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
