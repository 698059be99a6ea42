//! Search → fetch → decode → summarize pipeline
//!
//! A single parameterized pipeline serves every search caller: the body
//! truncation length comes from [`SummaryOptions`] and HTML inclusion from
//! the filter.

use crate::criteria::{self, SearchFilter};
use crate::errors::AppResult;
use crate::mime::{self, DecodedMessage};
use crate::models::EmailSummary;
use crate::transport::MailStore;

/// Shape of the produced summaries
#[derive(Debug, Clone, Copy)]
pub struct SummaryOptions {
    /// Maximum characters copied from the plain text body
    pub body_max_chars: usize,
}

/// Search a folder and summarize up to `limit` matching messages
///
/// The criteria are built before the store is touched, so invalid filters
/// never cause network I/O. Identifiers are ordered newest first unless
/// `sort_ascending` is set. The attachment filter is applied after decoding
/// and does not count towards `limit`.
///
/// # Errors
///
/// Criteria errors, plus any transport failure from the store.
pub async fn search_emails<S: MailStore>(
    store: &mut S,
    filter: &SearchFilter,
    options: SummaryOptions,
) -> AppResult<Vec<EmailSummary>> {
    let query = criteria::build(filter)?;

    store.select_folder(&filter.folder).await?;
    let mut ids = store.search(&query).await?;
    if filter.sort_ascending {
        ids.sort_unstable();
    } else {
        ids.sort_unstable_by(|a, b| b.cmp(a));
    }
    tracing::debug!(folder = %filter.folder, hits = ids.len(), "search completed");

    let mut summaries = Vec::with_capacity(filter.limit.min(ids.len()));
    for id in ids {
        if summaries.len() >= filter.limit {
            break;
        }
        let raw = store.fetch_raw(id).await?;
        let decoded = mime::decode(&raw);
        if filter.require_attachment && decoded.attachments.is_empty() {
            continue;
        }
        summaries.push(summarize(id, decoded, filter.include_html, options));
    }
    Ok(summaries)
}

/// Project a decoded message into its summary
pub fn summarize(
    uid: u32,
    decoded: DecodedMessage,
    include_html: bool,
    options: SummaryOptions,
) -> EmailSummary {
    let attachments = decoded.attachment_names();
    EmailSummary {
        uid,
        body: mime::truncate_chars(&decoded.text_body, options.body_max_chars),
        body_html: include_html.then_some(decoded.html_body),
        subject: decoded.subject,
        sender: decoded.sender,
        date: decoded.date,
        attachments,
    }
}
