//! IMAP mail source implementation.
//!
//! [`ImapMailSource`] implements [`MailSource`] over IMAP4rev1 (RFC 3501)
//! via `async-imap` on a rustls TLS stream, bridged with the tokio-util
//! compat layer.
//!
//! The listener keeps a persistent session in IDLE (RFC 2177) and detects
//! new arrivals from the EXISTS delta after each wakeup. Connection loss is
//! absorbed: the worker sleeps a fixed delay and reconnects, indefinitely.
//! A permanently-misconfigured account will reconnect forever, logging each
//! failure.

use std::time::Duration;

use async_imap::extensions::idle::IdleResponse;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use mail_parser::{Addr, Address as MailAddress, MessageParser};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use super::{
    ListenerEvent, ListenerState, MailSource, RawAddress, RawMessage, Result, SourceError,
    SourceEvent,
};
use crate::config::MailSettings;
use crate::domain::{Account, AccountId};

/// Type alias for the IMAP session with TLS (using tokio-util compat layer).
type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

/// Reconnection policy for dropped listener connections.
///
/// The delay is the same for every attempt and there is no attempt ceiling:
/// a listener never permanently gives up.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    /// Creates a fixed-delay policy.
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay to wait before the given (1-based) reconnect attempt.
    pub fn delay_for(&self, _attempt: u64) -> Duration {
        self.delay
    }
}

/// IMAP-backed [`MailSource`], bound to one account for its lifetime.
pub struct ImapMailSource {
    account: Account,
    settings: MailSettings,
    policy: ReconnectPolicy,
}

impl ImapMailSource {
    /// Creates a mail source for the specified account.
    pub fn new(account: Account, settings: MailSettings) -> Self {
        let policy = ReconnectPolicy::fixed(settings.reconnect_delay);
        Self {
            account,
            settings,
            policy,
        }
    }

    /// Returns the account this source is bound to.
    pub fn account_id(&self) -> &AccountId {
        &self.account.id
    }

    async fn fetch_backlog_inner(
        &self,
        session: &mut ImapSession,
        window_days: u32,
    ) -> Result<Vec<RawMessage>> {
        // Read-only open; the backlog fetch must not mark anything seen.
        session
            .examine(&self.settings.mailbox)
            .await
            .map_err(|e| SourceError::Protocol(format!("EXAMINE failed: {}", e)))?;

        let query = since_query(Utc::now().date_naive(), window_days);
        let uids = session
            .uid_search(&query)
            .await
            .map_err(|e| SourceError::Protocol(format!("SEARCH failed: {}", e)))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        if uid_list.is_empty() {
            return Ok(vec![]);
        }
        uid_list.sort_unstable();

        let uid_seq = uid_list
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut messages = Vec::new();
        let fetches = session
            .uid_fetch(&uid_seq, "(UID INTERNALDATE BODY.PEEK[])")
            .await
            .map_err(|e| SourceError::Protocol(format!("FETCH failed: {}", e)))?;
        let mut stream = fetches;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fetch) => match parse_fetch(fetch.body(), internal_date(&fetch)) {
                    Some(raw) => messages.push(raw),
                    None => {
                        tracing::warn!(
                            account_id = %self.account.id,
                            uid = ?fetch.uid,
                            "skipping message that failed to parse"
                        );
                    }
                },
                // One bad message must not abort the batch.
                Err(e) => {
                    tracing::warn!(
                        account_id = %self.account.id,
                        "skipping message that failed to fetch: {}",
                        e
                    );
                }
            }
        }

        Ok(messages)
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn fetch_backlog(&self, window_days: u32) -> Result<Vec<RawMessage>> {
        let mut session = connect_and_login(&self.account, &self.settings).await?;
        let result = self.fetch_backlog_inner(&mut session, window_days).await;
        // Best-effort: the connection is one-shot either way.
        let _ = session.logout().await;
        result
    }

    fn start_listening(&self, events: mpsc::Sender<ListenerEvent>) {
        let worker = ListenerWorker {
            account: self.account.clone(),
            settings: self.settings.clone(),
            policy: self.policy,
            events,
        };
        tokio::spawn(worker.run());
    }
}

/// The persistent listener task for one account.
struct ListenerWorker {
    account: Account,
    settings: MailSettings,
    policy: ReconnectPolicy,
    events: mpsc::Sender<ListenerEvent>,
}

impl ListenerWorker {
    /// Runs until process termination. There is no cancellation path.
    async fn run(self) {
        let mut state = ListenerState::Disconnected;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            self.transition(&mut state, ListenerState::Connecting);

            let session = match connect_and_login(&self.account, &self.settings).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(
                        account_id = %self.account.id,
                        attempt,
                        "listener connect failed: {}",
                        e
                    );
                    self.emit(SourceEvent::Error(e.to_string())).await;
                    self.transition(&mut state, ListenerState::Disconnected);
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    continue;
                }
            };
            self.transition(&mut state, ListenerState::Ready);

            if let Err(e) = self.watch(session, &mut state).await {
                tracing::warn!(
                    account_id = %self.account.id,
                    "listener connection lost: {}",
                    e
                );
                self.emit(SourceEvent::Error(e.to_string())).await;
            }

            self.transition(&mut state, ListenerState::Closing);
            self.emit(SourceEvent::Closed).await;
            self.transition(&mut state, ListenerState::Disconnected);

            let delay = self.policy.delay_for(attempt);
            tracing::info!(
                account_id = %self.account.id,
                delay_secs = delay.as_secs(),
                "reconnecting after delay"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Watches the mailbox until the connection fails.
    async fn watch(
        &self,
        mut session: ImapSession,
        state: &mut ListenerState,
    ) -> Result<()> {
        let mailbox = session
            .select(&self.settings.mailbox)
            .await
            .map_err(|e| SourceError::Protocol(format!("SELECT failed: {}", e)))?;
        let mut last_exists = mailbox.exists;

        self.transition(state, ListenerState::Listening);
        self.emit(SourceEvent::Ready).await;
        tracing::info!(
            account_id = %self.account.id,
            exists = last_exists,
            "listening for new mail"
        );

        loop {
            let mut idle = session.idle();
            idle.init()
                .await
                .map_err(|e| SourceError::Connection(format!("IDLE init failed: {}", e)))?;

            let (idle_wait, _interrupt) = idle.wait_with_timeout(self.settings.idle_refresh);
            let outcome = idle_wait
                .await
                .map_err(|e| SourceError::Connection(format!("IDLE wait failed: {}", e)))?;

            session = idle
                .done()
                .await
                .map_err(|e| SourceError::Connection(format!("IDLE done failed: {}", e)))?;

            match outcome {
                IdleResponse::NewData(_) => {
                    // Re-select to observe the new EXISTS count; the delta is
                    // the number of freshly arrived messages.
                    let mailbox = session
                        .select(&self.settings.mailbox)
                        .await
                        .map_err(|e| SourceError::Protocol(format!("SELECT failed: {}", e)))?;
                    let arrived = mailbox.exists.saturating_sub(last_exists) as usize;
                    last_exists = mailbox.exists;

                    if arrived > 0 {
                        tracing::info!(
                            account_id = %self.account.id,
                            count = arrived,
                            "new mail"
                        );
                        self.emit(SourceEvent::NewMail(arrived)).await;
                        self.fetch_newest(&mut session, arrived).await?;
                    }
                }
                // Periodic refresh keeps the IDLE session alive.
                IdleResponse::Timeout | IdleResponse::ManualInterrupt => continue,
            }
        }
    }

    /// Fetches exactly the `count` most-recently-arrived messages and emits
    /// one event per parsed message. Parse failures skip to the next UID.
    async fn fetch_newest(&self, session: &mut ImapSession, count: usize) -> Result<()> {
        let uids = session
            .uid_search("ALL")
            .await
            .map_err(|e| SourceError::Protocol(format!("SEARCH failed: {}", e)))?;

        let newest = newest_uids(uids.into_iter().collect(), count);
        if newest.is_empty() {
            return Ok(());
        }

        let uid_seq = newest
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let fetches = session
            .uid_fetch(&uid_seq, "(UID INTERNALDATE BODY[])")
            .await
            .map_err(|e| SourceError::Protocol(format!("FETCH failed: {}", e)))?;
        let mut stream = fetches;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fetch) => match parse_fetch(fetch.body(), internal_date(&fetch)) {
                    Some(raw) => self.emit(SourceEvent::Message(Box::new(raw))).await,
                    None => {
                        tracing::warn!(
                            account_id = %self.account.id,
                            uid = ?fetch.uid,
                            "skipping message that failed to parse"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        account_id = %self.account.id,
                        "skipping message that failed to fetch: {}",
                        e
                    );
                }
            }
        }

        Ok(())
    }

    async fn emit(&self, event: SourceEvent) {
        let _ = self
            .events
            .send(ListenerEvent::new(self.account.id.clone(), event))
            .await;
    }

    fn transition(&self, state: &mut ListenerState, next: ListenerState) {
        tracing::debug!(
            account_id = %self.account.id,
            from = %state,
            to = %next,
            "listener state change"
        );
        *state = next;
    }
}

/// Establishes TLS connection to the IMAP server with futures compat wrapper.
async fn connect_tls(settings: &MailSettings) -> Result<Compat<TlsStream<TcpStream>>> {
    let tcp_stream = TcpStream::connect(format!("{}:{}", settings.host, settings.port))
        .await
        .map_err(|e| SourceError::Connection(format!("TCP connect failed: {}", e)))?;

    let config = ClientConfig::builder()
        .with_root_certificates(tokio_rustls::rustls::RootCertStore::from_iter(
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
        ))
        .with_no_client_auth();

    let connector = TlsConnector::from(std::sync::Arc::new(config));
    let server_name = ServerName::try_from(settings.host.clone())
        .map_err(|e| SourceError::Connection(format!("invalid server name: {}", e)))?;

    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| SourceError::Connection(format!("TLS handshake failed: {}", e)))?;

    // Wrap with tokio-util compat layer for futures async read/write traits.
    Ok(tls_stream.compat())
}

async fn connect_and_login(account: &Account, settings: &MailSettings) -> Result<ImapSession> {
    let tls_stream = connect_tls(settings).await?;
    let client = async_imap::Client::new(tls_stream);

    let session = client
        .login(&account.user, &account.password)
        .await
        .map_err(|e| SourceError::Authentication(format!("IMAP login failed: {:?}", e.0)))?;

    tracing::debug!(account_id = %account.id, "IMAP session established");
    Ok(session)
}

/// Builds the IMAP SEARCH query for a trailing window of days.
fn since_query(today: NaiveDate, window_days: u32) -> String {
    let since = today - chrono::Duration::days(i64::from(window_days));
    format!("SINCE {}", since.format("%d-%b-%Y"))
}

/// Keeps the `count` highest UIDs, in ascending (arrival) order.
fn newest_uids(mut uids: Vec<u32>, count: usize) -> Vec<u32> {
    uids.sort_unstable();
    let start = uids.len().saturating_sub(count);
    uids.split_off(start)
}

fn internal_date(fetch: &async_imap::types::Fetch) -> Option<DateTime<Utc>> {
    fetch.internal_date().map(|d| d.with_timezone(&Utc))
}

fn parse_fetch(body: Option<&[u8]>, fallback_date: Option<DateTime<Utc>>) -> Option<RawMessage> {
    parse_rfc5322(body?, fallback_date)
}

/// Parses RFC 5322 bytes into the boundary [`RawMessage`] form.
///
/// `fallback_date` (typically INTERNALDATE) is used when the message has no
/// usable Date header; failing that, the current time is stamped so the
/// record always carries a date.
pub(crate) fn parse_rfc5322(
    bytes: &[u8],
    fallback_date: Option<DateTime<Utc>>,
) -> Option<RawMessage> {
    let message = MessageParser::default().parse(bytes)?;

    let date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or(fallback_date)
        .unwrap_or_else(Utc::now);

    let from = message.from().and_then(first_addr).map(raw_address);
    let to = message.to().map(recipient_groups).unwrap_or_default();

    // Only carry bodies the message genuinely has; mail-parser would
    // otherwise synthesize one representation from the other.
    let body_plain = if message.text_body.is_empty() {
        None
    } else {
        message.body_text(0).map(|s| s.to_string())
    };
    let body_html = if message.html_body.is_empty() {
        None
    } else {
        message.body_html(0).map(|s| s.to_string())
    };

    Some(RawMessage {
        message_id: message.message_id().map(|s| s.to_string()),
        in_reply_to: message.in_reply_to().as_text().map(|s| s.to_string()),
        from,
        to,
        subject: message.subject().map(|s| s.to_string()),
        date,
        body_plain,
        body_html,
    })
}

fn first_addr<'a>(addr: &'a MailAddress<'a>) -> Option<&'a Addr<'a>> {
    match addr {
        MailAddress::List(list) => list.first(),
        MailAddress::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).next(),
    }
}

/// Maps an address header to recipient groups, preserving group boundaries
/// and encounter order. A plain address list is a single group.
fn recipient_groups(addr: &MailAddress) -> Vec<Vec<RawAddress>> {
    match addr {
        MailAddress::List(list) => vec![list.iter().map(raw_address).collect()],
        MailAddress::Group(groups) => groups
            .iter()
            .map(|g| g.addresses.iter().map(raw_address).collect())
            .collect(),
    }
}

fn raw_address(addr: &Addr) -> RawAddress {
    RawAddress {
        name: addr.name().map(|s| s.to_string()),
        address: addr.address().map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn since_query_formats_imap_date() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        assert_eq!(since_query(today, 30), "SINCE 08-Jul-2026");
        assert_eq!(since_query(today, 0), "SINCE 07-Aug-2026");
    }

    #[test]
    fn newest_uids_keeps_highest_in_arrival_order() {
        assert_eq!(newest_uids(vec![5, 1, 9, 3, 7], 3), vec![5, 7, 9]);
        assert_eq!(newest_uids(vec![2, 4], 10), vec![2, 4]);
        assert_eq!(newest_uids(vec![], 3), Vec::<u32>::new());
        assert_eq!(newest_uids(vec![8, 6], 0), Vec::<u32>::new());
    }

    #[test]
    fn reconnect_policy_never_grows_and_never_gives_up() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(10));
        for attempt in [1u64, 2, 17, 1_000, u64::MAX] {
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(10));
        }
    }

    #[test]
    fn parse_rfc5322_full_message() {
        let bytes = b"Message-ID: <m1@example.com>\r\n\
            In-Reply-To: <m0@example.com>\r\n\
            From: Alice <alice@example.com>\r\n\
            To: Bob <bob@example.com>, carol@example.com\r\n\
            Subject: Meeting notes\r\n\
            Date: Wed, 01 Jul 2026 12:00:00 +0000\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            See attached.\r\n";

        let raw = parse_rfc5322(bytes, None).unwrap();
        assert_eq!(raw.message_id.as_deref(), Some("m1@example.com"));
        assert_eq!(raw.in_reply_to.as_deref(), Some("m0@example.com"));
        assert_eq!(raw.subject.as_deref(), Some("Meeting notes"));

        let from = raw.from.as_ref().unwrap();
        assert_eq!(from.name.as_deref(), Some("Alice"));
        assert_eq!(from.address.as_deref(), Some("alice@example.com"));

        assert_eq!(raw.to.len(), 1);
        assert_eq!(raw.to[0].len(), 2);
        assert_eq!(raw.to[0][1].address.as_deref(), Some("carol@example.com"));

        assert_eq!(
            raw.date,
            Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(raw.body_plain.unwrap().trim(), "See attached.");
        assert_eq!(raw.body_html, None);
    }

    #[test]
    fn parse_rfc5322_missing_date_uses_fallback() {
        let bytes = b"Message-ID: <m2@example.com>\r\n\
            From: alice@example.com\r\n\
            To: bob@example.com\r\n\
            Subject: No date\r\n\
            \r\n\
            body\r\n";

        let fallback = Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap();
        let raw = parse_rfc5322(bytes, Some(fallback)).unwrap();
        assert_eq!(raw.date, fallback);
    }

    #[test]
    fn parse_rfc5322_recipient_group_headers() {
        let bytes = b"Message-ID: <m3@example.com>\r\n\
            From: alice@example.com\r\n\
            To: eng: bob@example.com, carol@example.com;, sales: dan@example.com;\r\n\
            Subject: Group send\r\n\
            \r\n\
            body\r\n";

        let raw = parse_rfc5322(bytes, None).unwrap();
        assert_eq!(raw.to.len(), 2);
        let sizes: Vec<usize> = raw.to.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[test]
    fn parse_rfc5322_without_message_id() {
        let bytes = b"From: alice@example.com\r\n\
            To: bob@example.com\r\n\
            Subject: no id\r\n\
            \r\n\
            body\r\n";

        let raw = parse_rfc5322(bytes, None).unwrap();
        assert_eq!(raw.message_id, None);
    }
}
