//! Attachment extraction to disk
//!
//! Download works on a single message: the first identifier the store
//! reports for the search, in its natural order.

use std::fs;
use std::path::Path;

use crate::criteria::{self, SearchFilter};
use crate::errors::{AppError, AppResult};
use crate::mime::{self, DecodedMessage};
use crate::transport::MailStore;

/// Result of a download request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The search matched no message
    NoMessage,
    /// Filenames written (empty when no attachment matched)
    Saved(Vec<String>),
}

/// Find the first matching message and save its attachments
///
/// # Errors
///
/// Criteria errors, transport failures, or filesystem errors.
pub async fn download_first_match<S: MailStore>(
    store: &mut S,
    filter: &SearchFilter,
    name_filter: Option<&str>,
    target_dir: &Path,
) -> AppResult<DownloadOutcome> {
    let query = criteria::build(filter)?;

    store.select_folder(&filter.folder).await?;
    let ids = store.search(&query).await?;
    let Some(&first) = ids.first() else {
        return Ok(DownloadOutcome::NoMessage);
    };

    let raw = store.fetch_raw(first).await?;
    let decoded = mime::decode(&raw);
    let saved = extract_and_save(&decoded, name_filter, target_dir)?;
    tracing::info!(uid = first, saved = saved.len(), "attachments extracted");
    Ok(DownloadOutcome::Saved(saved))
}

/// Write matching attachments into `target_dir`
///
/// Creates the directory (and parents) if needed and overwrites existing
/// files. Only the final path component of each filename is used. Returns
/// the written filenames in message order.
///
/// # Errors
///
/// Returns `Internal` if the directory or a file cannot be written.
pub fn extract_and_save(
    message: &DecodedMessage,
    name_filter: Option<&str>,
    target_dir: &Path,
) -> AppResult<Vec<String>> {
    fs::create_dir_all(target_dir).map_err(|e| {
        AppError::Internal(format!(
            "cannot create download directory '{}': {e}",
            target_dir.display()
        ))
    })?;

    let name_filter = name_filter.filter(|f| !f.is_empty());
    let mut saved = Vec::new();
    for attachment in &message.attachments {
        if name_filter.is_some_and(|f| !attachment.filename.contains(f)) {
            continue;
        }
        let Some(filename) = safe_file_name(&attachment.filename) else {
            tracing::warn!(
                filename = %attachment.filename,
                "skipping attachment with unusable name"
            );
            continue;
        };
        let path = target_dir.join(&filename);
        fs::write(&path, &attachment.payload).map_err(|e| {
            AppError::Internal(format!("cannot write '{}': {e}", path.display()))
        })?;
        tracing::debug!(%filename, content_type = %attachment.content_type, "attachment written");
        saved.push(filename);
    }
    Ok(saved)
}

/// Reduce a filename to its last path component
fn safe_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    (!last.is_empty() && last != "." && last != "..").then(|| last.to_owned())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{DownloadOutcome, download_first_match, extract_and_save, safe_file_name};
    use crate::criteria::SearchFilter;
    use crate::errors::ErrorKind;
    use crate::mime::{DecodedAttachment, DecodedMessage};
    use crate::mime::tests::multipart_fixture;
    use crate::transport::fakes::FakeStore;

    fn message(files: &[(&str, &str)]) -> DecodedMessage {
        DecodedMessage {
            subject: "s".to_owned(),
            sender: "a@example.com".to_owned(),
            date: "d".to_owned(),
            text_body: "t".to_owned(),
            html_body: "h".to_owned(),
            attachments: files
                .iter()
                .map(|(name, payload)| DecodedAttachment {
                    filename: (*name).to_owned(),
                    content_type: "application/octet-stream".to_owned(),
                    payload: payload.as_bytes().to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn writes_all_attachments_into_new_nested_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let target = tmp.path().join("a").join("b");
        let msg = message(&[("one.txt", "1"), ("two.csv", "2,2")]);

        let saved = extract_and_save(&msg, None, &target).expect("save succeeds");

        assert_eq!(saved, vec!["one.txt".to_owned(), "two.csv".to_owned()]);
        assert_eq!(fs::read(target.join("two.csv")).expect("file exists"), b"2,2");
    }

    #[test]
    fn name_filter_is_substring_match_and_overwrites() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("invoice-2025.pdf"), b"old").expect("seed file");
        let msg = message(&[("invoice-2025.pdf", "new"), ("photo.jpg", "img")]);

        let saved = extract_and_save(&msg, Some("invoice"), tmp.path()).expect("save succeeds");

        assert_eq!(saved, vec!["invoice-2025.pdf".to_owned()]);
        assert_eq!(
            fs::read(tmp.path().join("invoice-2025.pdf")).expect("file exists"),
            b"new"
        );
        assert!(!tmp.path().join("photo.jpg").exists());
    }

    #[test]
    fn no_match_returns_empty_list() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let msg = message(&[("photo.jpg", "img")]);
        let saved = extract_and_save(&msg, Some("invoice"), tmp.path()).expect("save succeeds");
        assert!(saved.is_empty());
    }

    #[test]
    fn traversal_names_stay_inside_target() {
        assert_eq!(safe_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(safe_file_name("C:\\temp\\x.doc").as_deref(), Some("x.doc"));
        assert_eq!(safe_file_name("dir/.."), None);
    }

    #[tokio::test]
    async fn downloads_from_first_reported_message_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut store = FakeStore::with_messages(
            vec![
                (4, multipart_fixture("first", Some("first.pdf"))),
                (8, multipart_fixture("second", Some("second.pdf"))),
            ],
            vec![4, 8],
        );
        let filter = SearchFilter {
            search_text: Some("report".to_owned()),
            ..SearchFilter::default()
        };

        let outcome = download_first_match(&mut store, &filter, None, tmp.path())
            .await
            .expect("download succeeds");

        assert_eq!(outcome, DownloadOutcome::Saved(vec!["first.pdf".to_owned()]));
        assert_eq!(store.fetched(), vec![4]);
        assert_eq!(
            fs::read(tmp.path().join("first.pdf")).expect("file exists"),
            b"%PDF-1.4\n"
        );
    }

    #[tokio::test]
    async fn no_matching_message_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut store = FakeStore::default();
        let filter = SearchFilter {
            sender_filter: Some("nobody@example.com".to_owned()),
            ..SearchFilter::default()
        };

        let outcome = download_first_match(&mut store, &filter, None, tmp.path())
            .await
            .expect("download succeeds");
        assert_eq!(outcome, DownloadOutcome::NoMessage);
        assert!(store.fetched().is_empty());
    }

    #[tokio::test]
    async fn download_without_criteria_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut store = FakeStore::default();
        let err = download_first_match(&mut store, &SearchFilter::default(), None, tmp.path())
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::NoCriteriaSpecified);
        assert!(store.calls.is_empty());
    }
}
