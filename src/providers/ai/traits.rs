//! Classifier trait.

use async_trait::async_trait;

use crate::domain::Category;

/// Assigns a [`Category`] to an email.
///
/// Infallible by contract: implementations absorb transport and API
/// failures and return [`Category::Uncategorized`] instead of raising, so
/// one flaky classification can never abort a pipeline run.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies an email by subject and plain-text body.
    async fn classify(&self, subject: &str, body: &str) -> Category;
}
