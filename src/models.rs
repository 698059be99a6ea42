//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ErrorKind};

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Failure description embedded in a tool result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolError {
    /// Stable error classification
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl From<&AppError> for ToolError {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Tagged success/failure result of a tool call
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome<T> {
    /// Operation succeeded (possibly with an empty payload)
    Ok { data: T },
    /// Operation failed; nothing was raised past the tool boundary
    Error { error: ToolError },
}

/// Standard response envelope for all tools
///
/// Wraps the tagged outcome with human-readable summary and execution
/// metadata. Every tool returns this shape, including on failure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tagged payload or error
    pub result: ToolOutcome<T>,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Caller-facing projection of one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EmailSummary {
    /// Message UID within the searched folder
    pub uid: u32,
    /// Decoded Subject header
    pub subject: String,
    /// From header
    pub sender: String,
    /// Date header as sent
    pub date: String,
    /// Plain text body, truncated for display
    pub body: String,
    /// Decoded attachment filenames
    pub attachments: Vec<String>,
    /// Full HTML body (only when `include_html=true`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
}

/// Output of `search_emails`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchEmailsData {
    /// Folder that was searched
    pub folder: String,
    /// Matching messages in the requested order
    pub emails: Vec<EmailSummary>,
}

/// Output of `download_attachment`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadData {
    /// Directory the files were written to
    pub download_dir: String,
    /// Filenames written, in message order (empty when nothing matched)
    pub files: Vec<String>,
}

/// Output of `list_folders`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FoldersData {
    /// Decoded folder names
    pub folders: Vec<String>,
}

/// Output of `send_email`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendEmailData {
    /// Confirmation text
    pub message: String,
    /// Number of envelope recipients (to + cc + bcc)
    pub recipients: usize,
}

/// Input: search emails
///
/// Used by `search_emails`. At least one of `search_text`, `sender_filter`,
/// `since_date`, or `before_date` is required.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchEmailsInput {
    /// Full-text keyword
    pub search_text: Option<String>,
    /// Folder to search (default `INBOX`)
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Maximum messages to return (1..200, default 10)
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Only messages on or after this date (YYYY-MM-DD)
    pub since_date: Option<String>,
    /// Only messages before this date (YYYY-MM-DD)
    pub before_date: Option<String>,
    /// Return oldest messages first
    #[serde(default)]
    pub sort_ascending: bool,
    /// Include the full HTML body
    #[serde(default)]
    pub include_html: bool,
    /// Filter by sender address
    pub sender_filter: Option<String>,
    /// Only return messages that have attachments
    #[serde(default)]
    pub has_attachment: bool,
}

/// Input: download attachments from the first matching message
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DownloadAttachmentInput {
    /// Keyword identifying the message
    pub search_text: Option<String>,
    /// Folder to search (default `INBOX`)
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Filter by sender address
    pub sender_filter: Option<String>,
    /// Only messages on or after this date (YYYY-MM-DD)
    pub since_date: Option<String>,
    /// Save only attachments whose name contains this text
    pub attachment_name: Option<String>,
    /// Target directory (default from `MAIL_DOWNLOAD_DIR`)
    pub download_dir: Option<String>,
}

/// Input: send an email
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendEmailInput {
    /// Comma-separated recipient addresses
    pub to_email: String,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub body: String,
    /// Optional HTML alternative
    pub html_body: Option<String>,
    /// Comma-separated CC addresses
    pub cc_email: Option<String>,
    /// Comma-separated BCC addresses (never written to headers)
    pub bcc_email: Option<String>,
    /// Files to attach
    pub attachment_paths: Option<Vec<String>>,
}

/// Default value for `folder` fields
fn default_folder() -> String {
    "INBOX".to_owned()
}

/// Default value for `limit` in search
fn default_limit() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::{EmailSummary, Meta, SearchEmailsInput, ToolEnvelope, ToolError, ToolOutcome};
    use crate::errors::AppError;

    #[test]
    fn search_input_applies_defaults() {
        let input: SearchEmailsInput =
            serde_json::from_value(serde_json::json!({ "search_text": "invoice" }))
                .expect("deserializes");
        assert_eq!(input.folder, "INBOX");
        assert_eq!(input.limit, 10);
        assert!(!input.sort_ascending && !input.include_html && !input.has_attachment);
    }

    #[test]
    fn envelope_tags_success_and_error() {
        let ok = ToolEnvelope {
            summary: "1 email(s) found".to_owned(),
            result: ToolOutcome::Ok { data: vec![1_u32] },
            meta: Meta::now(3),
        };
        let value = serde_json::to_value(&ok).expect("serializes");
        assert_eq!(value["result"]["status"], "ok");
        assert_eq!(value["result"]["data"][0], 1);

        let err = ToolEnvelope::<Vec<u32>> {
            summary: "failed".to_owned(),
            result: ToolOutcome::Error {
                error: ToolError::from(&AppError::NoCriteriaSpecified),
            },
            meta: Meta::now(0),
        };
        let value = serde_json::to_value(&err).expect("serializes");
        assert_eq!(value["result"]["status"], "error");
        assert_eq!(value["result"]["error"]["kind"], "no_criteria_specified");
    }

    #[test]
    fn summary_omits_html_unless_requested() {
        let summary = EmailSummary {
            uid: 7,
            subject: "Hi".to_owned(),
            sender: "a@example.com".to_owned(),
            date: "Wed, 1 Jan 2025 00:00:00 +0000".to_owned(),
            body: "hello".to_owned(),
            attachments: Vec::new(),
            body_html: None,
        };
        let value = serde_json::to_value(&summary).expect("serializes");
        assert!(value.get("body_html").is_none());
    }
}
