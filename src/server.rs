//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the four mail tools.
//! Every tool validates its input, opens a fresh transport session, runs the
//! matching pipeline, and folds any failure into the tagged result so no
//! error crosses the tool boundary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};

use crate::attachments::{self, DownloadOutcome};
use crate::config::ServerConfig;
use crate::criteria::SearchFilter;
use crate::errors::{AppError, AppResult};
use crate::imap::ImapMailStore;
use crate::models::{
    DownloadAttachmentInput, DownloadData, FoldersData, Meta, SearchEmailsData,
    SearchEmailsInput, SendEmailData, SendEmailInput, ToolEnvelope, ToolError, ToolOutcome,
};
use crate::outbound::{self, OutboundSpec};
use crate::smtp::SmtpMailSender;
use crate::summarizer::{self, SummaryOptions};
use crate::transport::MailStore;

/// Maximum messages per search
const MAX_SEARCH_LIMIT: usize = 200;

/// Mail MCP server
///
/// Holds the immutable process configuration. Implements MCP tool handlers
/// via `#[tool]` attribute macro and `ServerHandler` trait.
#[derive(Clone)]
pub struct MailServer {
    /// Server config (hosts, credentials, limits)
    config: Arc<ServerConfig>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: Search emails
    ///
    /// Keyword, sender, and date filters are combined with AND. Results are
    /// newest first unless `sort_ascending` is set.
    #[tool(
        name = "search_emails",
        description = "Search emails by keyword, sender, date range and attachment presence"
    )]
    async fn search_emails(
        &self,
        Parameters(input): Parameters<SearchEmailsInput>,
    ) -> Result<Json<ToolEnvelope<SearchEmailsData>>, ErrorData> {
        let started = Instant::now();
        let result = self.search_emails_impl(input).await.map(|data| {
            let summary = if data.emails.is_empty() {
                "No emails found.".to_owned()
            } else {
                format!("{} email(s) found", data.emails.len())
            };
            (summary, data)
        });
        finalize_tool(started, "Error searching emails", result)
    }

    /// Tool: Download attachments from the first matching email
    #[tool(
        name = "download_attachment",
        description = "Download attachment(s) from the first email matching the filters"
    )]
    async fn download_attachment(
        &self,
        Parameters(input): Parameters<DownloadAttachmentInput>,
    ) -> Result<Json<ToolEnvelope<DownloadData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            "Error downloading attachment",
            self.download_attachment_impl(input).await,
        )
    }

    /// Tool: List folders
    #[tool(
        name = "list_folders",
        description = "List all folders/mailboxes on the email server"
    )]
    async fn list_folders(&self) -> Result<Json<ToolEnvelope<FoldersData>>, ErrorData> {
        let started = Instant::now();
        let result = self.list_folders_impl().await.map(|data| {
            let summary = if data.folders.is_empty() {
                "No folders found.".to_owned()
            } else {
                format!("{} folder(s)", data.folders.len())
            };
            (summary, data)
        });
        finalize_tool(started, "Error listing folders", result)
    }

    /// Tool: Send an email
    ///
    /// Supports an HTML alternative, CC/BCC, and file attachments. Missing
    /// attachment files abort the send before SMTP is contacted.
    #[tool(
        name = "send_email",
        description = "Send an email with optional HTML body, CC/BCC and attachments"
    )]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<Json<ToolEnvelope<SendEmailData>>, ErrorData> {
        let started = Instant::now();
        let result = self
            .send_email_impl(input)
            .await
            .map(|data| (data.message.clone(), data));
        finalize_tool(started, "Error sending email", result)
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Email MCP server for one IMAP/SMTP account: search, download attachments, list folders, send.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl MailServer {
    async fn search_emails_impl(&self, input: SearchEmailsInput) -> AppResult<SearchEmailsData> {
        validate_folder(&input.folder)?;
        validate_limit(input.limit)?;
        let filter = SearchFilter {
            search_text: input.search_text,
            folder: input.folder,
            limit: input.limit,
            since_date: input.since_date,
            before_date: input.before_date,
            sort_ascending: input.sort_ascending,
            include_html: input.include_html,
            sender_filter: input.sender_filter,
            require_attachment: input.has_attachment,
        };
        let options = SummaryOptions {
            body_max_chars: self.config.body_max_chars,
        };

        let mut store = ImapMailStore::new(Arc::clone(&self.config));
        let result = summarizer::search_emails(&mut store, &filter, options).await;
        store.close().await;

        Ok(SearchEmailsData {
            folder: filter.folder,
            emails: result?,
        })
    }

    async fn download_attachment_impl(
        &self,
        input: DownloadAttachmentInput,
    ) -> AppResult<(String, DownloadData)> {
        validate_folder(&input.folder)?;
        let target_dir = input
            .download_dir
            .filter(|d| !d.trim().is_empty())
            .map_or_else(|| self.config.download_dir.clone(), PathBuf::from);
        let filter = SearchFilter {
            search_text: input.search_text,
            folder: input.folder,
            since_date: input.since_date,
            sender_filter: input.sender_filter,
            ..SearchFilter::default()
        };

        let mut store = ImapMailStore::new(Arc::clone(&self.config));
        let result = attachments::download_first_match(
            &mut store,
            &filter,
            input.attachment_name.as_deref(),
            &target_dir,
        )
        .await;
        store.close().await;

        let (summary, files) = match result? {
            DownloadOutcome::NoMessage => (
                format!(
                    "No matching email found for: '{}'",
                    filter.search_text.unwrap_or_default()
                ),
                Vec::new(),
            ),
            DownloadOutcome::Saved(files) if files.is_empty() => {
                ("No matching attachment found.".to_owned(), files)
            }
            DownloadOutcome::Saved(files) => (format!("{} file(s) saved", files.len()), files),
        };
        Ok((
            summary,
            DownloadData {
                download_dir: target_dir.display().to_string(),
                files,
            },
        ))
    }

    async fn list_folders_impl(&self) -> AppResult<FoldersData> {
        let mut store = ImapMailStore::new(Arc::clone(&self.config));
        let result = store.list_folders().await;
        store.close().await;
        Ok(FoldersData { folders: result? })
    }

    async fn send_email_impl(&self, input: SendEmailInput) -> AppResult<SendEmailData> {
        let spec = OutboundSpec {
            to: outbound::split_addresses(&input.to_email),
            subject: input.subject,
            plain_body: input.body,
            html_body: input.html_body,
            cc: input
                .cc_email
                .as_deref()
                .map(outbound::split_addresses)
                .unwrap_or_default(),
            bcc: input
                .bcc_email
                .as_deref()
                .map(outbound::split_addresses)
                .unwrap_or_default(),
            attachment_paths: input
                .attachment_paths
                .unwrap_or_default()
                .into_iter()
                .map(PathBuf::from)
                .collect(),
        };

        let mut sender = SmtpMailSender::new(&self.config)?;
        outbound::send_email(&mut sender, &self.config.account, &spec).await
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized tool response envelope from business logic output
///
/// Failures become the `error` variant with `context` prefixed to the
/// summary; they are logged but never surfaced as protocol errors.
fn finalize_tool<T>(
    started: Instant,
    context: &str,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    let (summary, outcome) = match result {
        Ok((summary, data)) => (summary, ToolOutcome::Ok { data }),
        Err(e) => {
            tracing::warn!(error = %e, "{context}");
            (
                format!("{context}: {e}"),
                ToolOutcome::Error {
                    error: ToolError::from(&e),
                },
            )
        }
    };
    Ok(Json(ToolEnvelope {
        summary,
        result: outcome,
        meta: Meta::now(duration_ms(started)),
    }))
}

/// Validate folder name format
fn validate_folder(folder: &str) -> AppResult<()> {
    if folder.is_empty() || folder.len() > 256 {
        return Err(AppError::invalid("folder must be 1..256 characters"));
    }
    if folder.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::invalid("folder must not contain control characters"));
    }
    Ok(())
}

/// Validate requested result count
fn validate_limit(limit: usize) -> AppResult<()> {
    if limit == 0 || limit > MAX_SEARCH_LIMIT {
        return Err(AppError::InvalidInput(format!("limit must be in range 1..{MAX_SEARCH_LIMIT}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::{finalize_tool, validate_folder, validate_limit};
    use crate::errors::AppError;
    use crate::models::ToolOutcome;

    #[test]
    fn rejects_control_chars_in_folder() {
        let err = validate_folder("INBOX\r").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn limit_must_be_positive_and_bounded() {
        validate_limit(1).expect("lower bound valid");
        validate_limit(200).expect("upper bound valid");
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(201).is_err());
    }

    #[test]
    fn failures_are_folded_into_the_envelope() {
        let envelope = finalize_tool::<Vec<String>>(
            Instant::now(),
            "Error searching emails",
            Err(AppError::Connection("refused".to_owned())),
        )
        .expect("never a protocol error")
        .0;

        assert!(envelope.summary.starts_with("Error searching emails: "));
        match envelope.result {
            ToolOutcome::Error { error } => {
                assert_eq!(error.kind, crate::errors::ErrorKind::ConnectionError);
                assert!(error.message.contains("refused"));
            }
            ToolOutcome::Ok { .. } => panic!("expected error outcome"),
        }
    }

    #[test]
    fn successes_keep_summary_and_data() {
        let envelope = finalize_tool(
            Instant::now(),
            "Error listing folders",
            Ok(("2 folder(s)".to_owned(), vec!["INBOX".to_owned()])),
        )
        .expect("never a protocol error")
        .0;
        assert_eq!(envelope.summary, "2 folder(s)");
        assert!(matches!(envelope.result, ToolOutcome::Ok { .. }));
    }
}
