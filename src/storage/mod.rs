//! Durable email storage.
//!
//! The [`Indexer`] trait is the seam the pipeline depends on: a dedup
//! lookup scoped to one account, an idempotent upsert, and existence/count
//! queries. [`ElasticIndexer`] implements it against an Elasticsearch node.

mod elastic;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::{AccountId, Email, EmailId};

pub use elastic::ElasticIndexer;

/// Result type alias for indexer operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur while talking to the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The index returned a non-success response.
    #[error("index error {status}: {message}")]
    Response { status: u16, message: String },

    /// The configured endpoint is not a usable base URL.
    #[error("invalid index URL: {0}")]
    InvalidUrl(String),
}

/// Searchable, durable store for canonical emails.
///
/// Implementations must be safe for concurrent use; the pipeline calls in
/// from the backfill loop and the listener consumer.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Returns the ids already indexed for one account.
    ///
    /// The dedup key space is per-account: two accounts may share a message
    /// id without colliding. An index that does not exist yet is an empty
    /// set, not an error.
    async fn existing_ids(&self, account_id: &AccountId) -> IndexResult<HashSet<EmailId>>;

    /// Stores an email, replacing any previous document with the same id.
    ///
    /// Idempotent: re-indexing the same email is a no-op beyond last-write-
    /// wins.
    async fn upsert(&self, email: &Email) -> IndexResult<()>;

    /// Returns whether an email is already indexed for an account.
    async fn exists(&self, account_id: &AccountId, id: &EmailId) -> IndexResult<bool>;

    /// Returns the total number of indexed documents.
    ///
    /// An index that does not exist yet counts as zero.
    async fn count(&self) -> IndexResult<u64>;
}
