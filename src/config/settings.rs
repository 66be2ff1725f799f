//! Application settings.
//!
//! Settings are assembled from environment variables once at process start.
//! The account list and the classifier API key are required; everything else
//! has a working default. A missing required value is a fatal startup
//! condition, the only error class that terminates the process.

use std::env;
use std::time::Duration;

use crate::domain::Account;

/// Environment variable holding the JSON account list.
pub const ACCOUNTS_VAR: &str = "IMAP_ACCOUNTS";
/// Environment variable holding the classifier API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable overriding the search index endpoint.
pub const INDEX_NODE_VAR: &str = "ELASTICSEARCH_NODE";
/// Environment variable holding the Slack incoming-webhook URL.
pub const SLACK_WEBHOOK_VAR: &str = "SLACK_WEBHOOK_URL";
/// Environment variable holding the generic webhook URL.
pub const GENERIC_WEBHOOK_VAR: &str = "GENERIC_WEBHOOK_URL";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    /// The account list is present but not valid JSON.
    #[error("invalid {var}: {0}", var = ACCOUNTS_VAR)]
    InvalidAccounts(#[source] serde_json::Error),

    /// The account list parsed but contains no accounts.
    #[error("{} contains no accounts", ACCOUNTS_VAR)]
    NoAccounts,
}

/// Top-level settings for the ingestion process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Accounts to ingest from.
    pub accounts: Vec<Account>,
    /// Mail source connection settings, shared by all accounts.
    pub mail: MailSettings,
    /// Classifier settings.
    pub classifier: ClassifierSettings,
    /// Search index settings.
    pub index: IndexSettings,
    /// Notification channel settings.
    pub notifications: NotificationSettings,
    /// Sync pipeline settings.
    pub sync: SyncSettings,
}

impl Settings {
    /// Loads settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the account list or the classifier API
    /// key is missing or malformed. Callers treat this as fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let accounts_json =
            env::var(ACCOUNTS_VAR).map_err(|_| ConfigError::MissingVar(ACCOUNTS_VAR))?;
        let accounts = parse_accounts(&accounts_json)?;

        let api_key = env::var(API_KEY_VAR).map_err(|_| ConfigError::MissingVar(API_KEY_VAR))?;

        let mut index = IndexSettings::default();
        if let Ok(node) = env::var(INDEX_NODE_VAR) {
            index.url = node;
        }

        let notifications = NotificationSettings {
            slack_webhook_url: env::var(SLACK_WEBHOOK_VAR).ok(),
            generic_webhook_url: env::var(GENERIC_WEBHOOK_VAR).ok(),
        };

        Ok(Self {
            accounts,
            mail: MailSettings::default(),
            classifier: ClassifierSettings::new(api_key),
            index,
            notifications,
            sync: SyncSettings::default(),
        })
    }
}

/// Parses the JSON account list, rejecting an empty list.
pub fn parse_accounts(json: &str) -> Result<Vec<Account>, ConfigError> {
    let accounts: Vec<Account> =
        serde_json::from_str(json).map_err(ConfigError::InvalidAccounts)?;
    if accounts.is_empty() {
        return Err(ConfigError::NoAccounts);
    }
    Ok(accounts)
}

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (TLS).
    pub port: u16,
    /// Mailbox to watch.
    pub mailbox: String,
    /// Delay before reconnecting after a dropped connection.
    ///
    /// Fixed: reconnection never backs off and never gives up.
    pub reconnect_delay: Duration,
    /// How long each IDLE wait runs before being refreshed.
    pub idle_refresh: Duration,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            mailbox: "INBOX".to_string(),
            reconnect_delay: Duration::from_secs(10),
            idle_refresh: Duration::from_secs(300),
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// API key for the model endpoint.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Maximum number of body characters sent with a classification request.
    pub max_body_chars: usize,
}

impl ClassifierSettings {
    /// Creates settings with the default model for the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-2.0-flash-lite".to_string(),
            max_body_chars: 4000,
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Base URL of the Elasticsearch node.
    pub url: String,
    /// Index name.
    pub index: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "emails".to_string(),
        }
    }
}

/// Notification channel settings. A `None` URL disables that channel.
#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    /// Slack incoming-webhook URL.
    pub slack_webhook_url: Option<String>,
    /// Generic webhook URL receiving the full email document.
    pub generic_webhook_url: Option<String>,
}

/// Sync pipeline settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Trailing window of mail fetched during the historical backfill.
    pub backlog_window_days: u32,
    /// Minimum spacing between classification calls.
    pub classify_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            backlog_window_days: 30,
            classify_interval: Duration::from_secs(4),
        }
    }
}
