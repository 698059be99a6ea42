//! Search criteria construction
//!
//! Turns caller filters into an IMAP `SEARCH` key list. Terms are always
//! conjunctive and emitted in a fixed order (sender, text, since, before)
//! so the generated query is reproducible.

use std::fmt;

use chrono::NaiveDate;

use crate::errors::{AppError, AppResult};

/// Caller-supplied search filters
#[derive(Debug, Clone)]
pub struct SearchFilter {
    /// Full-text search string
    pub search_text: Option<String>,
    /// Folder to search
    pub folder: String,
    /// Maximum number of summaries to return
    pub limit: usize,
    /// Lower date bound (`YYYY-MM-DD`, inclusive)
    pub since_date: Option<String>,
    /// Upper date bound (`YYYY-MM-DD`, exclusive)
    pub before_date: Option<String>,
    /// Oldest first when true, newest first otherwise
    pub sort_ascending: bool,
    /// Copy the HTML body into each summary
    pub include_html: bool,
    /// Sender address or fragment matched against `From`
    pub sender_filter: Option<String>,
    /// Drop messages without attachments after decoding
    pub require_attachment: bool,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            search_text: None,
            folder: "INBOX".to_owned(),
            limit: 10,
            since_date: None,
            before_date: None,
            sort_ascending: false,
            include_html: false,
            sender_filter: None,
            require_attachment: false,
        }
    }
}

/// Single conjunctive search term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    From(String),
    Text(String),
    Since(NaiveDate),
    Before(NaiveDate),
}

/// Native IMAP search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<SearchTerm>,
}

impl SearchQuery {
    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    /// Render as the argument of `UID SEARCH`, split at literals
    ///
    /// ASCII strings are sent quoted. A non-ASCII string becomes a
    /// synchronizing `{n}` literal and the command is prefixed with
    /// `CHARSET UTF-8`. Each chunk after the first starts with the literal
    /// octets announced at the end of the previous chunk, so the caller must
    /// wait for a continuation before sending it.
    pub fn to_wire_chunks(&self) -> Vec<String> {
        let needs_charset = self.terms.iter().any(|t| match t {
            SearchTerm::From(v) | SearchTerm::Text(v) => !v.is_ascii(),
            SearchTerm::Since(_) | SearchTerm::Before(_) => false,
        });
        let mut chunks = Vec::new();
        let mut current = String::new();
        if needs_charset {
            current.push_str("CHARSET UTF-8");
        }
        for term in &self.terms {
            let literal = match term {
                SearchTerm::From(v) if !v.is_ascii() => Some(("FROM", v)),
                SearchTerm::Text(v) if !v.is_ascii() => Some(("TEXT", v)),
                _ => None,
            };
            if !current.is_empty() {
                current.push(' ');
            }
            match literal {
                Some((key, value)) => {
                    current.push_str(&format!("{key} {{{}}}", value.len()));
                    chunks.push(std::mem::take(&mut current));
                    current.push_str(value);
                }
                None => current.push_str(&term.to_string()),
            }
        }
        chunks.push(current);
        chunks
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From(v) => write!(f, "FROM \"{}\"", quote_escape(v)),
            Self::Text(v) => write!(f, "TEXT \"{}\"", quote_escape(v)),
            Self::Since(d) => write!(f, "SINCE {}", imap_date(*d)),
            Self::Before(d) => write!(f, "BEFORE {}", imap_date(*d)),
        }
    }
}

/// Build the search query for a filter
///
/// # Errors
///
/// - `InvalidDateFormat` if a date is not `YYYY-MM-DD`
/// - `InvalidInput` if a text term contains control characters
/// - `NoCriteriaSpecified` if no term was produced
pub fn build(filter: &SearchFilter) -> AppResult<SearchQuery> {
    let mut terms = Vec::new();

    if let Some(sender) = non_empty(filter.sender_filter.as_deref()) {
        validate_search_text(sender, "sender_filter")?;
        terms.push(SearchTerm::From(sender.to_owned()));
    }
    if let Some(text) = non_empty(filter.search_text.as_deref()) {
        validate_search_text(text, "search_text")?;
        terms.push(SearchTerm::Text(text.to_owned()));
    }
    if let Some(since) = non_empty(filter.since_date.as_deref()) {
        terms.push(SearchTerm::Since(parse_ymd("since_date", since)?));
    }
    if let Some(before) = non_empty(filter.before_date.as_deref()) {
        terms.push(SearchTerm::Before(parse_ymd("before_date", before)?));
    }

    if terms.is_empty() {
        return Err(AppError::NoCriteriaSpecified);
    }
    Ok(SearchQuery { terms })
}

/// Treat absent and blank values alike
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Reject control characters, which would break the command line
fn validate_search_text(input: &str, field: &str) -> AppResult<()> {
    if input.chars().any(|ch| ch.is_control()) {
        return Err(AppError::InvalidInput(format!("{field} must not contain control characters")));
    }
    Ok(())
}

/// Escape backslashes and quotes for IMAP quoted strings
fn quote_escape(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Format date as IMAP SEARCH date (e.g., "01-Jan-2025")
fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Parse YYYY-MM-DD date string
fn parse_ymd(field: &'static str, input: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| AppError::InvalidDateFormat {
        field,
        value: input.to_owned(),
    })
}
