//! Mail source trait and boundary types.
//!
//! A [`MailSource`] manages one network connection to one mailbox account
//! and surfaces mail through two modes: a one-shot historical backlog fetch
//! and a long-lived change listener that emits typed [`ListenerEvent`]s to a
//! channel owned by the orchestrator.

use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::mpsc;

use crate::domain::AccountId;

/// Result type alias for mail source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors that can occur while talking to a mail source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Login failed or credentials were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected or failed a protocol command.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A fetched message before canonicalization.
///
/// Ephemeral: exists only between a source fetch and the transformer.
/// `date` is always populated (the source stamps the receive time when the
/// message carries no usable Date header), so canonicalization stays
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// RFC 5322 Message-ID, if the message carried one.
    pub message_id: Option<String>,
    /// In-Reply-To header value for thread linkage.
    pub in_reply_to: Option<String>,
    /// First resolvable sender.
    pub from: Option<RawAddress>,
    /// Recipient groups in encounter order; each group is an ordered list.
    pub to: Vec<Vec<RawAddress>>,
    /// Subject line.
    pub subject: Option<String>,
    /// Send date, falling back to receive time.
    pub date: DateTime<Utc>,
    /// Plain text body, when the message carried one.
    pub body_plain: Option<String>,
    /// HTML body, when the message carried one.
    pub body_html: Option<String>,
}

/// A raw address as parsed off the wire; either part may be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Connection state of a listener, owned exclusively by the source.
///
/// The orchestrator never inspects this directly; it only observes the
/// typed events the listener emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No connection; the initial state and the state after any failure.
    Disconnected,
    /// TCP/TLS connect and login in progress.
    Connecting,
    /// Authenticated, mailbox not yet opened.
    Ready,
    /// Mailbox opened, change notifications active.
    Listening,
    /// Connection being torn down before a reconnect attempt.
    Closing,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Connecting => "connecting",
            ListenerState::Ready => "ready",
            ListenerState::Listening => "listening",
            ListenerState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// What a listener observed, without the account context.
#[derive(Debug)]
pub enum SourceEvent {
    /// The listener is connected and watching the mailbox.
    Ready,
    /// The server announced `n` newly arrived messages.
    NewMail(usize),
    /// One parsed message from a new-mail fetch.
    Message(Box<RawMessage>),
    /// An I/O or protocol error was absorbed; reconnection follows.
    Error(String),
    /// The connection closed; the listener will reconnect after its delay.
    Closed,
}

/// A [`SourceEvent`] tagged with the account it came from.
#[derive(Debug)]
pub struct ListenerEvent {
    pub account_id: AccountId,
    pub event: SourceEvent,
}

impl ListenerEvent {
    pub fn new(account_id: AccountId, event: SourceEvent) -> Self {
        Self { account_id, event }
    }
}

/// Per-account connection to a remote mailbox.
#[async_trait::async_trait]
pub trait MailSource: Send + Sync {
    /// Fetches the trailing `window_days` of mail in one shot.
    ///
    /// Resolves with the full set once fetching completes, or an empty vec
    /// when the search matches nothing. Individual messages that fail to
    /// parse are skipped, never aborting the batch.
    ///
    /// # Errors
    ///
    /// Connection and search failures are account-level: the caller skips
    /// or retries the account, never the whole run.
    async fn fetch_backlog(&self, window_days: u32) -> Result<Vec<RawMessage>>;

    /// Starts the persistent listener for this account.
    ///
    /// Spawns a background task and returns immediately. The task emits
    /// [`ListenerEvent`]s on `events` and reconnects on its own after any
    /// connection loss, indefinitely, until process termination.
    fn start_listening(&self, events: mpsc::Sender<ListenerEvent>);
}
