//! Configuration loading.
//!
//! Settings are read from the environment once at process start; missing
//! required values are fatal.

mod settings;

pub use settings::{
    parse_accounts, ClassifierSettings, ConfigError, IndexSettings, MailSettings,
    NotificationSettings, Settings, SyncSettings, ACCOUNTS_VAR, API_KEY_VAR, GENERIC_WEBHOOK_VAR,
    INDEX_NODE_VAR, SLACK_WEBHOOK_VAR,
};
