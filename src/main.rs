//! mail-imap-smtp-mcp: email MCP server over stdio
//!
//! Exposes four tools for a single mailbox account: search emails, download
//! attachments, list folders (IMAP), and send email (SMTP).
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, stdio serving, shutdown
//! - [`config`]: Environment-driven, immutable server configuration
//! - [`credentials`]: Fernet decryption of the stored password
//! - [`errors`]: Application error model and caller-facing error kinds
//! - [`transport`]: `MailStore`/`MailSender` seams used by the pipelines
//! - [`imap`]: IMAP transport/session operations with timeout wrappers
//! - [`smtp`]: SMTP submission via `lettre`
//! - [`mime`]: Message decoding (headers, bodies, attachments)
//! - [`criteria`]: Filter → IMAP `SEARCH` query construction
//! - [`summarizer`]: Search → fetch → decode → summary pipeline
//! - [`attachments`]: Attachment extraction to disk
//! - [`outbound`]: Outgoing MIME assembly and send pipeline
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`server`]: MCP tool handlers

mod attachments;
mod config;
mod credentials;
mod criteria;
mod errors;
mod imap;
mod mime;
mod models;
mod outbound;
mod server;
mod smtp;
mod summarizer;
mod transport;

use std::path::PathBuf;

use clap::Parser;
use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

/// Command-line options
#[derive(Debug, Parser)]
#[command(version, about = "Email MCP server over stdio (IMAP search/download, SMTP send)")]
struct Cli {
    /// Load environment variables from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
}

/// Application entry point
///
/// Initializes tracing from environment, loads config (decrypting the
/// password), and serves the MCP server over stdio until the client
/// disconnects or the process receives SIGINT/SIGTERM.
///
/// # Example
///
/// ```no_run
/// IMAP_SERVER=imap.example.com \
/// SMTP_SERVER=smtp.example.com \
/// EMAIL_ACCOUNT=user@example.com \
/// EMAIL_PASSWORD_ENC=gAAAAA... \
/// EMAIL_SECRET_KEY=... \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    tracing::info!(
        imap = %config.imap_host,
        smtp = %config.smtp_host,
        "starting mail MCP server"
    );

    let service = server::MailServer::new(config).serve(stdio()).await?;
    tokio::select! {
        quit = service.waiting() => {
            quit?;
        }
        () = shutdown_signal() => {
            tracing::info!("shutdown signal received; exiting");
        }
    }
    Ok(())
}

/// Resolve on the first SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
