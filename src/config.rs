//! Configuration module for the mail account and server settings
//!
//! All configuration is resolved once at startup from environment variables.
//! The account password arrives encrypted (`EMAIL_PASSWORD_ENC`) and is
//! decrypted here with `EMAIL_SECRET_KEY`, before any transport is touched.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::credentials;
use crate::errors::{AppError, AppResult};

/// Server-wide configuration
///
/// Immutable for the lifetime of the process. Shared with tool handlers and
/// transport adapters via `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IMAP server hostname (TLS only)
    pub imap_host: String,
    /// IMAP server port (typically 993)
    pub imap_port: u16,
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port; 465 selects implicit TLS, anything else STARTTLS
    pub smtp_port: u16,
    /// Login identity, also used as the `From` address
    pub account: String,
    /// Decrypted password stored in a type that prevents accidental logging
    pub password: SecretString,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// IMAP greeting/TLS handshake timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Socket I/O timeout in milliseconds
    pub socket_timeout_ms: u64,
    /// Display truncation applied to summary bodies
    pub body_max_chars: usize,
    /// Directory used by `download_attachment` when the caller names none
    pub download_dir: PathBuf,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required environment variables are missing
    /// or malformed, or if the password cannot be decrypted.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// IMAP_SERVER=imap.gmail.com
    /// SMTP_SERVER=smtp.gmail.com
    /// SMTP_PORT=465
    /// EMAIL_ACCOUNT=user@gmail.com
    /// EMAIL_PASSWORD_ENC=gAAAAABl...
    /// EMAIL_SECRET_KEY=Zm9vYmFy...
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let vars = env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect::<BTreeMap<_, _>>();
        Self::from_vars(&vars)
    }

    /// Build configuration from an explicit variable map
    pub fn from_vars(vars: &BTreeMap<String, String>) -> AppResult<Self> {
        let encrypted = required(vars, "EMAIL_PASSWORD_ENC")?;
        let key = required(vars, "EMAIL_SECRET_KEY")?;
        let password = credentials::decrypt_password(&encrypted, &key)?;

        Ok(Self {
            imap_host: required(vars, "IMAP_SERVER")?,
            imap_port: parse_or(vars, "IMAP_PORT", 993)?,
            smtp_host: required(vars, "SMTP_SERVER")?,
            smtp_port: parse_or(vars, "SMTP_PORT", 465)?,
            account: required(vars, "EMAIL_ACCOUNT")?,
            password,
            connect_timeout_ms: parse_or(vars, "MAIL_CONNECT_TIMEOUT_MS", 30_000)?,
            greeting_timeout_ms: parse_or(vars, "MAIL_GREETING_TIMEOUT_MS", 15_000)?,
            socket_timeout_ms: parse_or(vars, "MAIL_SOCKET_TIMEOUT_MS", 300_000)?,
            body_max_chars: parse_or(vars, "MAIL_BODY_MAX_CHARS", 5_000)?,
            download_dir: vars
                .get("MAIL_DOWNLOAD_DIR")
                .filter(|v| !v.trim().is_empty())
                .map_or_else(|| PathBuf::from("./downloads"), PathBuf::from),
        })
    }
}

/// Read a required variable, returning error if missing or empty
fn required(vars: &BTreeMap<String, String>, key: &str) -> AppResult<String> {
    match vars.get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Parse a numeric variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but does not parse.
fn parse_or<T>(vars: &BTreeMap<String, String>, key: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
{
    match vars.get(key) {
        Some(v) => v.trim().parse::<T>().map_err(|_| {
            AppError::InvalidInput(format!("invalid numeric environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}
