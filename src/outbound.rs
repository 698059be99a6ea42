//! Outbound MIME assembly and submission
//!
//! Builds a `lettre` message with a plain body, an optional HTML
//! alternative, and base64 file attachments. Every attachment is loaded
//! before the message exists, so a missing file aborts the whole send.

use std::fs;
use std::path::{Path, PathBuf};

use lettre::address::Envelope;
use lettre::{Address, Message};
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};

use crate::errors::{AppError, AppResult};
use crate::models::SendEmailData;
use crate::transport::MailSender;

/// Everything needed to compose one outgoing message
#[derive(Debug, Clone, Default)]
pub struct OutboundSpec {
    pub to: Vec<String>,
    pub subject: String,
    pub plain_body: String,
    pub html_body: Option<String>,
    pub cc: Vec<String>,
    /// Envelope-only recipients
    pub bcc: Vec<String>,
    pub attachment_paths: Vec<PathBuf>,
}

/// Split a comma-separated address list, dropping blanks
pub fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Assemble the MIME message
///
/// Structure: `text/plain` alone, or `multipart/alternative` when an HTML
/// body is given, wrapped in `multipart/mixed` when there are attachments.
/// `Bcc` recipients end up in the envelope only.
///
/// # Errors
///
/// - `AttachmentNotFound` if any path is not an existing file
/// - `InvalidInput` for missing or unparsable addresses
/// - `Internal` if an attachment cannot be read
pub fn build_message(from: &str, spec: &OutboundSpec) -> AppResult<Message> {
    if spec.to.is_empty() {
        return Err(AppError::invalid("at least one recipient is required"));
    }

    let attachments = spec
        .attachment_paths
        .iter()
        .map(|path| load_attachment(path))
        .collect::<AppResult<Vec<_>>>()?;

    let from = parse_mailbox(from, "from")?;
    let mut recipients: Vec<Address> = Vec::new();
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(spec.subject.as_str());
    for addr in &spec.to {
        let mailbox = parse_mailbox(addr, "to")?;
        push_unique(&mut recipients, &mailbox);
        builder = builder.to(mailbox);
    }
    for addr in &spec.cc {
        let mailbox = parse_mailbox(addr, "cc")?;
        push_unique(&mut recipients, &mailbox);
        builder = builder.cc(mailbox);
    }
    for addr in &spec.bcc {
        let mailbox = parse_mailbox(addr, "bcc")?;
        push_unique(&mut recipients, &mailbox);
        builder = builder.bcc(mailbox);
    }
    let envelope = Envelope::new(Some(from.email), recipients)
        .map_err(|e| AppError::InvalidInput(format!("cannot build envelope: {e}")))?;
    builder = builder.envelope(envelope);

    let plain = spec.plain_body.clone();
    let html = spec.html_body.clone().filter(|h| !h.is_empty());
    let built = match (html, attachments.is_empty()) {
        (None, true) => builder.singlepart(SinglePart::plain(plain)),
        (Some(html), true) => builder.multipart(MultiPart::alternative_plain_html(plain, html)),
        (html, false) => {
            let mut mixed = match html {
                Some(html) => {
                    MultiPart::mixed().multipart(MultiPart::alternative_plain_html(plain, html))
                }
                None => MultiPart::mixed().singlepart(SinglePart::plain(plain)),
            };
            for part in attachments {
                mixed = mixed.singlepart(part);
            }
            builder.multipart(mixed)
        }
    };
    built.map_err(|e| AppError::InvalidInput(format!("cannot build message: {e}")))
}

/// Build and submit a message
///
/// Nothing reaches the sender unless the build succeeds. The recipient count
/// is taken from the envelope, where an address listed twice appears once.
pub async fn send_email<M: MailSender>(
    sender: &mut M,
    from: &str,
    spec: &OutboundSpec,
) -> AppResult<SendEmailData> {
    let message = build_message(from, spec)?;
    let recipients = message.envelope().to().len();
    sender.send(message).await?;
    Ok(SendEmailData {
        message: format!("Email sent successfully to {}", spec.to.join(", ")),
        recipients,
    })
}

/// Envelope recipients are the union of to, cc and bcc, each address once
fn push_unique(recipients: &mut Vec<Address>, mailbox: &Mailbox) {
    if !recipients.contains(&mailbox.email) {
        recipients.push(mailbox.email.clone());
    }
}

fn parse_mailbox(addr: &str, field: &str) -> AppResult<Mailbox> {
    addr.parse::<Mailbox>()
        .map_err(|e| AppError::InvalidInput(format!("invalid {field} address '{addr}': {e}")))
}

/// Read one file into a base64 attachment part named after its base name
fn load_attachment(path: &Path) -> AppResult<SinglePart> {
    if !path.is_file() {
        return Err(AppError::AttachmentNotFound(path.display().to_string()));
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::AttachmentNotFound(path.display().to_string()))?;
    let content = fs::read(path)
        .map_err(|e| AppError::Internal(format!("cannot read '{}': {e}", path.display())))?;
    let body = Body::new_with_encoding(content, ContentTransferEncoding::Base64)
        .map_err(|_| AppError::Internal("base64 body encoding rejected".to_owned()))?;
    Ok(Attachment::new(filename).body(body, content_type_for(path)?))
}

fn content_type_for(path: &Path) -> AppResult<ContentType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime)
        .map_err(|e| AppError::Internal(format!("invalid content type '{mime}': {e}")))
}
