//! Transport capability seams
//!
//! The retrieval and sending pipelines only see these traits. Production
//! implementations live in [`crate::imap`] and [`crate::smtp`]; tests supply
//! in-memory fakes.

use lettre::Message;

use crate::criteria::SearchQuery;
use crate::errors::AppResult;

/// Read side of a mailbox account
pub trait MailStore {
    /// Open a folder for subsequent search/fetch calls
    async fn select_folder(&mut self, folder: &str) -> AppResult<()>;

    /// Run a search in the selected folder
    ///
    /// Identifiers are returned in the store's natural (ascending) order.
    async fn search(&mut self, query: &SearchQuery) -> AppResult<Vec<u32>>;

    /// Fetch the full RFC822 source of one message
    async fn fetch_raw(&mut self, id: u32) -> AppResult<Vec<u8>>;

    /// List all visible folder names
    async fn list_folders(&mut self) -> AppResult<Vec<String>>;
}

/// Submission side of a mailbox account
pub trait MailSender {
    /// Deliver a built message to every envelope recipient
    async fn send(&mut self, message: Message) -> AppResult<()>;
}
