//! Notification channels for high-value classifications.
//!
//! Notifications are fire-and-forget side effects: a channel whose URL is
//! not configured silently does nothing, and a delivery failure is logged
//! and absorbed. Nothing here can fail a pipeline run.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::Email;

/// A notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs.
    fn channel(&self) -> &'static str;

    /// Sends a notification for the given email. Never fails: errors are
    /// logged inside the implementation.
    async fn notify(&self, email: &Email);
}

/// Posts a Block Kit message to a Slack incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl SlackNotifier {
    /// Creates the notifier; a `None` URL disables it.
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    fn payload(email: &Email) -> serde_json::Value {
        json!({
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!(
                            ":rocket: *New \"Interested\" lead!*\n*From:* {}",
                            email.from.display()
                        ),
                    },
                },
                {
                    "type": "section",
                    "fields": [
                        {
                            "type": "mrkdwn",
                            "text": format!("*Subject:*\n{}", email.subject),
                        }
                    ],
                },
                {
                    "type": "context",
                    "elements": [
                        {
                            "type": "mrkdwn",
                            "text": format!(
                                "Received on account {} at {}",
                                email.account_id,
                                email.date.to_rfc3339()
                            ),
                        }
                    ],
                },
            ]
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> &'static str {
        "slack"
    }

    async fn notify(&self, email: &Email) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let result = self
            .client
            .post(url)
            .json(&Self::payload(email))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => {
                tracing::info!(email_id = %email.id, "Slack notification sent");
            }
            Err(e) => {
                tracing::error!(email_id = %email.id, "failed to send Slack notification: {}", e);
            }
        }
    }
}

/// Posts the full email document to a generic webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    /// Creates the notifier; a `None` URL disables it.
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, email: &Email) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let result = self
            .client
            .post(url)
            .json(email)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => {
                tracing::info!(email_id = %email.id, "webhook triggered");
            }
            Err(e) => {
                tracing::error!(email_id = %email.id, "failed to trigger webhook: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, Address, Body, Category, EmailId, ThreadId};
    use chrono::Utc;

    fn sample_email() -> Email {
        Email {
            id: EmailId::from("m1@example.com"),
            account_id: AccountId::from("acct-1"),
            thread_id: ThreadId::from("m1@example.com"),
            subject: "Let's talk pricing".to_string(),
            from: Address::with_name("alice@example.com", "Alice"),
            to: vec![Address::new("sales@example.com")],
            date: Utc::now(),
            body: Body {
                plain: "Very interested, send a quote.".to_string(),
                html: None,
            },
            classification: Some(Category::Interested),
        }
    }

    #[tokio::test]
    async fn unconfigured_channels_are_silent_noops() {
        let email = sample_email();
        // No URL, no network, no panic.
        SlackNotifier::new(None).notify(&email).await;
        WebhookNotifier::new(None).notify(&email).await;
    }

    #[test]
    fn channel_names() {
        assert_eq!(SlackNotifier::new(None).channel(), "slack");
        assert_eq!(WebhookNotifier::new(None).channel(), "webhook");
    }

    #[test]
    fn slack_payload_shape() {
        let payload = SlackNotifier::payload(&sample_email());
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        let header = blocks[0]["text"]["text"].as_str().unwrap();
        assert!(header.contains("Alice <alice@example.com>"));
        let subject = blocks[1]["fields"][0]["text"].as_str().unwrap();
        assert!(subject.contains("Let's talk pricing"));
    }
}
