//! Canonical email record.
//!
//! [`Email`] is the unit the pipeline persists: produced by the mail
//! transformer, annotated with a classification, then handed to the indexer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Category, EmailId, ThreadId};

/// The canonical, indexable form of a fetched message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Stable identifier derived from the source Message-ID.
    pub id: EmailId,
    /// Account the message was fetched from.
    pub account_id: AccountId,
    /// Thread linkage: the In-Reply-To value, or this email's own id.
    pub thread_id: ThreadId,
    /// Subject line; empty string when the header is absent.
    pub subject: String,
    /// Sender address.
    pub from: Address,
    /// All recipients, flattened across recipient groups in encounter order.
    pub to: Vec<Address>,
    /// Date the message was sent.
    pub date: DateTime<Utc>,
    /// Message bodies.
    pub body: Body,
    /// Assigned category; `None` until the classifier has run.
    pub classification: Option<Category>,
}

/// A mail address with display name.
///
/// Both fields default to the empty string when the source message omits
/// them, so downstream consumers never deal with missing address parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub address: String,
}

impl Address {
    /// Creates an address with no display name.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            address: address.into(),
        }
    }

    /// Creates an address with a display name.
    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Returns "Name <address>" when a name is present, else the address.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.name, self.address)
        }
    }
}

/// Plain and optional HTML bodies of an email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Plain text body; empty string when the message carried none.
    pub plain: String,
    /// HTML body, only when the message genuinely carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_with_name() {
        let addr = Address::with_name("alice@example.com", "Alice");
        assert_eq!(addr.display(), "Alice <alice@example.com>");
    }

    #[test]
    fn address_display_without_name() {
        let addr = Address::new("alice@example.com");
        assert_eq!(addr.display(), "alice@example.com");
    }

    #[test]
    fn email_serialization_omits_absent_html() {
        let email = Email {
            id: EmailId::from("<m1@example.com>"),
            account_id: AccountId::from("acct-1"),
            thread_id: ThreadId::from("<m1@example.com>"),
            subject: "Hello".to_string(),
            from: Address::new("alice@example.com"),
            to: vec![Address::new("bob@example.com")],
            date: Utc::now(),
            body: Body {
                plain: "hi".to_string(),
                html: None,
            },
            classification: None,
        };

        let json = serde_json::to_string(&email).unwrap();
        assert!(!json.contains("\"html\""));
        assert!(json.contains("\"classification\":null"));

        let back: Email = serde_json::from_str(&json).unwrap();
        assert_eq!(back, email);
    }

    #[test]
    fn email_with_classification_round_trips() {
        let email = Email {
            id: EmailId::from("<m2@example.com>"),
            account_id: AccountId::from("acct-1"),
            thread_id: ThreadId::from("<m1@example.com>"),
            subject: "Re: Hello".to_string(),
            from: Address::with_name("bob@example.com", "Bob"),
            to: vec![Address::new("alice@example.com")],
            date: Utc::now(),
            body: Body {
                plain: "sounds good".to_string(),
                html: Some("<p>sounds good</p>".to_string()),
            },
            classification: Some(Category::Interested),
        };

        let json = serde_json::to_string(&email).unwrap();
        assert!(json.contains("\"classification\":\"Interested\""));

        let back: Email = serde_json::from_str(&json).unwrap();
        assert_eq!(back.classification, Some(Category::Interested));
        assert_eq!(back.body.html.as_deref(), Some("<p>sounds good</p>"));
    }
}
