//! Canonicalization of fetched mail.
//!
//! [`transform`] turns a [`RawMessage`] straight off the wire into the
//! canonical [`Email`] record the rest of the pipeline works with. It is a
//! pure function: no I/O, deterministic for identical input.

use crate::domain::{AccountId, Address, Body, Email, EmailId, ThreadId};
use crate::providers::email::{RawAddress, RawMessage};

/// Canonicalizes a raw message for the given account.
///
/// Returns `None` when the message is unusable: no message id, no
/// resolvable sender, or no recipient at all. Unusable input is dropped
/// silently; it is not a failure to report.
///
/// Recipient groups are flattened into a single ordered list, with missing
/// name/address parts defaulting to the empty string. The thread id is the
/// In-Reply-To value when present, otherwise the message's own id.
pub fn transform(raw: &RawMessage, account_id: &AccountId) -> Option<Email> {
    let message_id = raw.message_id.as_deref()?;
    let from = raw.from.as_ref()?;
    if raw.to.iter().all(|group| group.is_empty()) {
        return None;
    }

    let thread_id = raw
        .in_reply_to
        .clone()
        .map(ThreadId::from)
        .unwrap_or_else(|| ThreadId::from(message_id));

    let to = raw
        .to
        .iter()
        .flat_map(|group| group.iter().map(canonical_address))
        .collect();

    Some(Email {
        id: EmailId::from(message_id),
        account_id: account_id.clone(),
        thread_id,
        subject: raw.subject.clone().unwrap_or_default(),
        from: canonical_address(from),
        to,
        date: raw.date,
        body: Body {
            plain: raw.body_plain.clone().unwrap_or_default(),
            html: raw.body_html.clone(),
        },
        classification: None,
    })
}

fn canonical_address(raw: &RawAddress) -> Address {
    Address {
        name: raw.name.clone().unwrap_or_default(),
        address: raw.address.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn addr(name: &str, address: &str) -> RawAddress {
        RawAddress {
            name: Some(name.to_string()),
            address: Some(address.to_string()),
        }
    }

    fn sample_raw() -> RawMessage {
        RawMessage {
            message_id: Some("<m1@example.com>".to_string()),
            in_reply_to: None,
            from: Some(addr("Alice", "alice@example.com")),
            to: vec![vec![addr("Bob", "bob@example.com")]],
            subject: Some("Quarterly report".to_string()),
            date: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
            body_plain: Some("Attached below.".to_string()),
            body_html: None,
        }
    }

    #[test]
    fn rejects_missing_message_id() {
        let mut raw = sample_raw();
        raw.message_id = None;
        assert_eq!(transform(&raw, &AccountId::from("a1")), None);
    }

    #[test]
    fn rejects_missing_sender() {
        let mut raw = sample_raw();
        raw.from = None;
        assert_eq!(transform(&raw, &AccountId::from("a1")), None);
    }

    #[test]
    fn rejects_missing_recipients() {
        let mut raw = sample_raw();
        raw.to = vec![];
        assert_eq!(transform(&raw, &AccountId::from("a1")), None);

        // Present but empty groups are just as unusable.
        raw.to = vec![vec![], vec![]];
        assert_eq!(transform(&raw, &AccountId::from("a1")), None);
    }

    #[test]
    fn thread_id_prefers_in_reply_to() {
        let mut raw = sample_raw();
        raw.in_reply_to = Some("<m0@example.com>".to_string());

        let email = transform(&raw, &AccountId::from("a1")).unwrap();
        assert_eq!(email.thread_id, ThreadId::from("<m0@example.com>"));
    }

    #[test]
    fn thread_id_falls_back_to_own_id() {
        let email = transform(&sample_raw(), &AccountId::from("a1")).unwrap();
        assert_eq!(email.thread_id, ThreadId::from("<m1@example.com>"));
    }

    #[test]
    fn flattens_recipient_groups_in_order() {
        let mut raw = sample_raw();
        raw.to = vec![
            vec![addr("Bob", "bob@example.com"), addr("Carol", "carol@example.com")],
            vec![addr("Dan", "dan@example.com")],
        ];

        let email = transform(&raw, &AccountId::from("a1")).unwrap();
        let addresses: Vec<&str> = email.to.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(
            addresses,
            vec!["bob@example.com", "carol@example.com", "dan@example.com"]
        );
    }

    #[test]
    fn missing_address_parts_default_to_empty_strings() {
        let mut raw = sample_raw();
        raw.from = Some(RawAddress {
            name: None,
            address: Some("alice@example.com".to_string()),
        });
        raw.to = vec![vec![RawAddress {
            name: Some("Undisclosed".to_string()),
            address: None,
        }]];

        let email = transform(&raw, &AccountId::from("a1")).unwrap();
        assert_eq!(email.from.name, "");
        assert_eq!(email.to[0].address, "");
        assert_eq!(email.to[0].name, "Undisclosed");
    }

    #[test]
    fn subject_and_plain_body_default_to_empty() {
        let mut raw = sample_raw();
        raw.subject = None;
        raw.body_plain = None;

        let email = transform(&raw, &AccountId::from("a1")).unwrap();
        assert_eq!(email.subject, "");
        assert_eq!(email.body.plain, "");
    }

    #[test]
    fn html_body_is_carried_only_when_present() {
        let mut raw = sample_raw();
        let email = transform(&raw, &AccountId::from("a1")).unwrap();
        assert_eq!(email.body.html, None);

        raw.body_html = Some("<p>Attached below.</p>".to_string());
        let email = transform(&raw, &AccountId::from("a1")).unwrap();
        assert_eq!(email.body.html.as_deref(), Some("<p>Attached below.</p>"));
    }

    #[test]
    fn classification_starts_absent() {
        let email = transform(&sample_raw(), &AccountId::from("a1")).unwrap();
        assert_eq!(email.classification, None);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let raw = sample_raw();
        let account = AccountId::from("a1");

        let first = transform(&raw, &account).unwrap();
        let second = transform(&raw, &account).unwrap();
        assert_eq!(first, second);

        let first_json = serde_json::to_string(&first).unwrap();
        let second_json = serde_json::to_string(&second).unwrap();
        assert_eq!(first_json, second_json);
    }
}
