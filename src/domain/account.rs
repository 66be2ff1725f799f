//! Mailbox account configuration.

use serde::{Deserialize, Serialize};

use super::AccountId;

/// A mailbox account the pipeline ingests from.
///
/// Loaded once from configuration at startup and immutable afterwards;
/// each account is bound to exactly one mail source for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account.
    pub id: AccountId,
    /// Login user, usually the mailbox address.
    pub user: String,
    /// Login secret (password or app-specific password).
    pub password: String,
}
