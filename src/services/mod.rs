//! Business services layer.
//!
//! This module contains the services that orchestrate business logic,
//! coordinating between providers, storage, and domain types.
//!
//! - [`SyncService`]: drives the historical backfill and the per-account
//!   real-time listeners with one shared message pipeline
//! - [`Notifier`] implementations: fire-and-forget notification channels
//!   for high-value classifications
//! - [`RateGate`]: the fixed-interval gate on classification calls

mod notification_service;
mod rate_limit;
mod sync_service;

pub use notification_service::{Notifier, SlackNotifier, WebhookNotifier};
pub use rate_limit::RateGate;
pub use sync_service::{SyncReport, SyncService};
