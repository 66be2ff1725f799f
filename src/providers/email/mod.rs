//! Mail source implementations.
//!
//! This module contains the [`MailSource`] trait and the IMAP
//! implementation. A mail source manages one connection to one mailbox
//! account and surfaces mail through a one-shot backlog fetch and a
//! persistent, self-reconnecting listener.

mod imap;
mod traits;

pub use imap::{ImapMailSource, ReconnectPolicy};
pub use traits::{
    ListenerEvent, ListenerState, MailSource, RawAddress, RawMessage, Result, SourceError,
    SourceEvent,
};
