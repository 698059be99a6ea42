//! IMAP transport and session operations
//!
//! Provides timeout-bounded wrappers around `async-imap` operations and the
//! [`ImapMailStore`] adapter used by the retrieval pipelines. All network
//! calls use TLS, and timeouts are derived from server config.

use std::sync::Arc;
use std::time::Duration;

use async_imap::imap_proto::{MailboxDatum, RequestId, Response, Status};
use async_imap::types::Fetch;
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::ServerConfig;
use crate::criteria::SearchQuery;
use crate::errors::{AppError, AppResult};
use crate::transport::MailStore;

/// Type alias for authenticated IMAP session over TLS
///
/// Wraps the TLS stream type to simplify signatures throughout the codebase.
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Get socket timeout duration from server config
fn socket_timeout(server: &ServerConfig) -> Duration {
    Duration::from_millis(server.socket_timeout_ms)
}

/// Connect to IMAP server and authenticate
///
/// Performs full connection sequence with timeouts:
/// 1. TCP connect
/// 2. TLS handshake with bundled root certificates
/// 3. Read IMAP greeting
/// 4. LOGIN authentication
///
/// # Errors
///
/// - `InvalidInput` if hostname is invalid for TLS SNI
/// - `Timeout` if any connection phase times out
/// - `Connection` for TCP, TLS, greeting, or authentication failures
pub async fn connect_authenticated(server: &ServerConfig) -> AppResult<ImapSession> {
    let connect_duration = Duration::from_millis(server.connect_timeout_ms);
    let greeting_duration = Duration::from_millis(server.greeting_timeout_ms);

    let tcp = timeout(
        connect_duration,
        TcpStream::connect((server.imap_host.as_str(), server.imap_port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Connection(format!("tcp connect failed: {e}"))))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = ServerName::try_from(server.imap_host.clone())
        .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
    let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Connection(format!("TLS handshake failed: {e}"))))?;

    let mut client = Client::new(tls_stream);
    let greeting = timeout(greeting_duration, client.read_response())
        .await
        .map_err(|_| AppError::Timeout("IMAP greeting timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Connection(format!("IMAP greeting failed: {e}"))))?;

    if greeting.is_none() {
        return Err(AppError::Connection(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }

    let pass = server.password.expose_secret();
    let session = timeout(greeting_duration, client.login(server.account.as_str(), pass))
        .await
        .map_err(|_| AppError::Timeout("IMAP login timeout".to_owned()))
        .and_then(|r| {
            r.map_err(|(e, _)| AppError::Connection(format!("IMAP authentication failed: {e}")))
        })?;

    tracing::debug!(host = %server.imap_host, "IMAP session established");
    Ok(session)
}

/// List all visible mailboxes/folders
pub async fn list_all_mailboxes(
    server: &ServerConfig,
    session: &mut ImapSession,
) -> AppResult<Vec<async_imap::types::Name>> {
    let stream = timeout(socket_timeout(server), session.list(None, Some("*")))
        .await
        .map_err(|_| AppError::Timeout("LIST timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("LIST failed: {e}"))))?;

    timeout(socket_timeout(server), stream.try_collect::<Vec<_>>())
        .await
        .map_err(|_| AppError::Timeout("LIST stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("LIST stream failed: {e}"))))
}

/// Select mailbox in read-only mode
///
/// Uses `EXAMINE` so fetching bodies does not set `\Seen`. The mailbox name
/// is encoded to IMAP modified UTF-7 before it goes on the wire.
pub async fn select_mailbox_readonly(
    server: &ServerConfig,
    session: &mut ImapSession,
    mailbox: &str,
) -> AppResult<()> {
    let encoded = utf7_imap::encode_utf7_imap(mailbox.to_owned());
    timeout(socket_timeout(server), session.examine(&encoded))
        .await
        .map_err(|_| AppError::Timeout(format!("EXAMINE timed out for folder '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::NotFound(format!("cannot open folder '{mailbox}': {e}")))
        })?;
    Ok(())
}

/// Fetch a single message with custom query
///
/// Runs a `UID FETCH` for a specific UID and returns the first result.
///
/// # Errors
///
/// - `NotFound` if UID does not exist in mailbox
/// - `Timeout` or `Internal` for network/protocol errors
pub async fn fetch_one(
    server: &ServerConfig,
    session: &mut ImapSession,
    uid: u32,
    query: &str,
) -> AppResult<Fetch> {
    let stream = timeout(
        socket_timeout(server),
        session.uid_fetch(uid.to_string(), query),
    )
    .await
    .map_err(|_| AppError::Timeout("UID FETCH timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid fetch failed: {e}"))))?;
    let fetches: Vec<Fetch> = timeout(socket_timeout(server), stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID FETCH stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid fetch stream failed: {e}"))))?;

    fetches
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("message uid {uid} not found")))
}

/// Fetch full RFC822 message source
pub async fn fetch_raw_message(
    server: &ServerConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<Vec<u8>> {
    let fetch = fetch_one(server, session, uid, "UID RFC822").await?;
    let body = fetch
        .body()
        .ok_or_else(|| AppError::Internal("message has no RFC822 body".to_owned()))?;
    Ok(body.to_vec())
}

/// Search for messages matching query
///
/// Runs `UID SEARCH` and returns matching UIDs in ascending order. Callers
/// decide on presentation order. A query with literals is sent chunk by
/// chunk, waiting for the server's continuation before each literal.
pub async fn uid_search(
    server: &ServerConfig,
    session: &mut ImapSession,
    query: &SearchQuery,
) -> AppResult<Vec<u32>> {
    let chunks = query.to_wire_chunks();
    let mut uids: Vec<u32> = match chunks.as_slice() {
        [line] => timeout(socket_timeout(server), session.uid_search(line))
            .await
            .map_err(|_| AppError::Timeout("UID SEARCH timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid search failed: {e}"))))?
            .into_iter()
            .collect(),
        _ => timeout(socket_timeout(server), uid_search_literal(session, &chunks))
            .await
            .map_err(|_| AppError::Timeout("UID SEARCH timed out".to_owned()))??,
    };
    uids.sort_unstable();
    Ok(uids)
}

/// `UID SEARCH` whose arguments contain synchronizing literals
async fn uid_search_literal(session: &mut ImapSession, chunks: &[String]) -> AppResult<Vec<u32>> {
    let Some((first, rest)) = chunks.split_first() else {
        return Err(AppError::Internal("empty search query".to_owned()));
    };

    let tag = session
        .run_command(format!("UID SEARCH {first}"))
        .await
        .map_err(search_failed)?;
    for chunk in rest {
        // untagged updates may arrive before the continuation
        loop {
            match next_reply(session, &tag).await? {
                SearchReply::Continue => break,
                SearchReply::Done(result) => {
                    result?;
                    return Err(AppError::Internal(
                        "server completed UID SEARCH before the literal was sent".to_owned(),
                    ));
                }
                SearchReply::Ids(_) | SearchReply::Other => {}
            }
        }
        session
            .run_command_untagged(chunk)
            .await
            .map_err(search_failed)?;
    }

    let mut uids = Vec::new();
    loop {
        match next_reply(session, &tag).await? {
            SearchReply::Ids(ids) => uids.extend(ids),
            SearchReply::Done(result) => return result.map(|()| uids),
            SearchReply::Continue | SearchReply::Other => {}
        }
    }
}

/// Classified server response during a literal search
enum SearchReply {
    Continue,
    Ids(Vec<u32>),
    /// Tagged completion of our command
    Done(AppResult<()>),
    Other,
}

async fn next_reply(session: &mut ImapSession, tag: &RequestId) -> AppResult<SearchReply> {
    let response = session
        .read_response()
        .await
        .map_err(search_failed)?
        .ok_or_else(|| AppError::Connection("connection closed during UID SEARCH".to_owned()))?;
    let reply = match response.parsed() {
        Response::Continue { .. } => SearchReply::Continue,
        Response::MailboxData(MailboxDatum::Search(ids)) => SearchReply::Ids(ids.clone()),
        Response::Done {
            tag: done,
            status,
            information,
            ..
        } if done == tag => {
            if *status == Status::Ok {
                SearchReply::Done(Ok(()))
            } else {
                SearchReply::Done(Err(AppError::Internal(format!(
                    "uid search rejected ({status:?}): {}",
                    information.as_deref().unwrap_or("no details")
                ))))
            }
        }
        _ => SearchReply::Other,
    };
    Ok(reply)
}

fn search_failed(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("uid search failed: {e}"))
}

/// End the session with `LOGOUT`
pub async fn logout(server: &ServerConfig, session: &mut ImapSession) -> AppResult<()> {
    timeout(socket_timeout(server), session.logout())
        .await
        .map_err(|_| AppError::Timeout("LOGOUT timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("LOGOUT failed: {e}"))))
}

/// Lazily connected IMAP mailbox
///
/// The TLS session is opened on the first call that needs it, so requests
/// rejected during validation never reach the network. One store serves a
/// single tool invocation and is closed afterwards.
pub struct ImapMailStore {
    config: Arc<ServerConfig>,
    session: Option<ImapSession>,
}

impl ImapMailStore {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Connected session plus config, connecting on first use
    async fn session(&mut self) -> AppResult<(&ServerConfig, &mut ImapSession)> {
        if self.session.is_none() {
            self.session = Some(connect_authenticated(&self.config).await?);
        }
        match self.session.as_mut() {
            Some(session) => Ok((self.config.as_ref(), session)),
            None => Err(AppError::Internal("IMAP session unavailable".to_owned())),
        }
    }

    /// Log out if a session was opened; failures are only logged
    pub async fn close(mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = logout(&self.config, &mut session).await
        {
            tracing::warn!(error = %e, "IMAP logout failed");
        }
    }
}

impl MailStore for ImapMailStore {
    async fn select_folder(&mut self, folder: &str) -> AppResult<()> {
        let (config, session) = self.session().await?;
        select_mailbox_readonly(config, session, folder).await
    }

    async fn search(&mut self, query: &SearchQuery) -> AppResult<Vec<u32>> {
        let (config, session) = self.session().await?;
        tracing::debug!(terms = query.terms().len(), "running UID SEARCH");
        uid_search(config, session, query).await
    }

    async fn fetch_raw(&mut self, id: u32) -> AppResult<Vec<u8>> {
        let (config, session) = self.session().await?;
        fetch_raw_message(config, session, id).await
    }

    async fn list_folders(&mut self) -> AppResult<Vec<String>> {
        let (config, session) = self.session().await?;
        let names = list_all_mailboxes(config, session).await?;
        Ok(names
            .iter()
            .map(|name| utf7_imap::decode_utf7_imap(name.name().to_owned()))
            .collect())
    }
}
