//! Sync orchestration.
//!
//! [`SyncService`] drives both ingestion modes with the same downstream
//! pipeline: the one-time historical backfill across all registered
//! accounts, and the steady-state per-account listeners. Collaborators are
//! injected at construction; one mail source is registered per account.
//!
//! Failure isolation has two granularities. A failure processing one
//! message is logged with the offending subject and skipped; processing
//! continues with the next message of that account. A failure setting up an
//! account (dedup lookup or backlog fetch) is logged and the next account
//! proceeds. Only missing configuration, handled upstream of this service,
//! terminates the process.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::config::SyncSettings;
use crate::domain::{Account, AccountId, Category, EmailId};
use crate::providers::ai::Classifier;
use crate::providers::email::{ListenerEvent, MailSource, RawMessage, SourceEvent};
use crate::services::{Notifier, RateGate};
use crate::storage::Indexer;
use crate::transform::transform;

/// Capacity of the shared listener event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of the historical sync across all accounts.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Accounts whose backfill completed.
    pub accounts_synced: usize,
    /// Accounts skipped after a setup failure.
    pub accounts_failed: usize,
    /// Messages fetched across all backlogs.
    pub fetched: usize,
    /// Messages filtered out by the dedup snapshot.
    pub already_indexed: usize,
    /// Messages classified and indexed.
    pub indexed: usize,
    /// Messages dropped as unusable input.
    pub unusable: usize,
    /// Messages that failed processing and were skipped.
    pub failed: usize,
    /// Errors encountered (non-fatal).
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Returns true if the sync completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Stats for a single account's backfill.
#[derive(Debug, Default)]
struct AccountStats {
    fetched: usize,
    already_indexed: usize,
    indexed: usize,
    unusable: usize,
    failed: usize,
    errors: Vec<String>,
}

/// What the single-message pipeline did with a message.
enum ProcessOutcome {
    /// Classified and indexed.
    Indexed(Category),
    /// Dropped silently as unusable input.
    Unusable,
}

/// Orchestrates backfill and real-time ingestion across accounts.
pub struct SyncService {
    sources: Vec<(Account, Arc<dyn MailSource>)>,
    classifier: Arc<dyn Classifier>,
    indexer: Arc<dyn Indexer>,
    notifiers: Vec<Arc<dyn Notifier>>,
    gate: RateGate,
    settings: SyncSettings,
}

impl SyncService {
    /// Creates a service with its collaborators.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        indexer: Arc<dyn Indexer>,
        notifiers: Vec<Arc<dyn Notifier>>,
        settings: SyncSettings,
    ) -> Self {
        let gate = RateGate::new(settings.classify_interval);
        Self {
            sources: Vec::new(),
            classifier,
            indexer,
            notifiers,
            gate,
            settings,
        }
    }

    /// Registers the mail source bound to an account.
    pub fn register_source(&mut self, account: Account, source: Arc<dyn MailSource>) {
        self.sources.push((account, source));
    }

    /// Runs the historical backfill for every registered account.
    ///
    /// Strictly sequential across accounts and across messages: the
    /// classification call carries a shared external rate budget, so there
    /// is no parallel fan-out. Within one account, messages are indexed in
    /// encounter order.
    pub async fn run_initial_sync(&self) -> SyncReport {
        tracing::info!("starting initial sync for all accounts");
        let mut report = SyncReport::default();

        if self.sources.is_empty() {
            tracing::warn!("no accounts registered, nothing to sync");
            return report;
        }

        for (account, source) in &self.sources {
            tracing::info!(account_id = %account.id, user = %account.user, "syncing account");

            match self.sync_account(account, source.as_ref()).await {
                Ok(stats) => {
                    tracing::info!(
                        account_id = %account.id,
                        fetched = stats.fetched,
                        indexed = stats.indexed,
                        deduplicated = stats.already_indexed,
                        "account backfill complete"
                    );
                    report.accounts_synced += 1;
                    report.fetched += stats.fetched;
                    report.already_indexed += stats.already_indexed;
                    report.indexed += stats.indexed;
                    report.unusable += stats.unusable;
                    report.failed += stats.failed;
                    report.errors.extend(stats.errors);
                }
                // Account-level setup failure: skip to the next account.
                Err(e) => {
                    tracing::error!(account_id = %account.id, "failed to sync account: {:#}", e);
                    report.accounts_failed += 1;
                    report.errors.push(format!("account {}: {:#}", account.id, e));
                }
            }
        }

        tracing::info!(
            accounts = report.accounts_synced,
            indexed = report.indexed,
            "initial sync completed"
        );
        report
    }

    /// Backfills one account: dedup snapshot, backlog fetch, then the
    /// per-message pipeline with skip-and-continue isolation.
    async fn sync_account(
        &self,
        account: &Account,
        source: &dyn MailSource,
    ) -> Result<AccountStats> {
        let existing = self
            .indexer
            .existing_ids(&account.id)
            .await
            .context("dedup lookup failed")?;
        tracing::info!(
            account_id = %account.id,
            existing = existing.len(),
            "loaded dedup snapshot"
        );

        let backlog = source
            .fetch_backlog(self.settings.backlog_window_days)
            .await
            .context("backlog fetch failed")?;

        let mut stats = AccountStats {
            fetched: backlog.len(),
            ..AccountStats::default()
        };

        for raw in backlog {
            if is_already_indexed(&raw, &existing) {
                stats.already_indexed += 1;
                continue;
            }

            let subject = raw.subject.clone().unwrap_or_default();
            match self.process_message(&account.id, raw).await {
                Ok(ProcessOutcome::Indexed(category)) => {
                    tracing::info!(
                        account_id = %account.id,
                        subject = %subject,
                        category = %category,
                        "message classified and indexed"
                    );
                    stats.indexed += 1;
                }
                Ok(ProcessOutcome::Unusable) => stats.unusable += 1,
                // One bad message must not stop the account.
                Err(e) => {
                    tracing::error!(
                        account_id = %account.id,
                        subject = %subject,
                        "failed to process message, skipping: {:#}",
                        e
                    );
                    stats.failed += 1;
                    stats.errors.push(format!("{:?}: {:#}", subject, e));
                }
            }
        }

        Ok(stats)
    }

    /// Starts the persistent listeners for every registered account.
    ///
    /// Returns immediately after spawning. Each source reconnects on its
    /// own; all sources feed one consumer task that runs the same
    /// single-message pipeline as the backfill. There is no dedup check
    /// here (messages only reach the channel as genuinely new arrivals)
    /// and no cancellation: listening continues for the process lifetime.
    pub fn start_all_listeners(self: Arc<Self>) {
        if self.sources.is_empty() {
            tracing::warn!("no accounts registered, no listeners started");
            return;
        }

        tracing::info!(accounts = self.sources.len(), "starting real-time listeners");
        let (tx, rx) = mpsc::channel::<ListenerEvent>(EVENT_CHANNEL_CAPACITY);

        for (account, source) in &self.sources {
            tracing::info!(account_id = %account.id, "starting listener");
            source.start_listening(tx.clone());
        }

        tokio::spawn(self.consume_events(rx));
    }

    /// Drains listener events, running the pipeline per incoming message.
    async fn consume_events(self: Arc<Self>, mut rx: mpsc::Receiver<ListenerEvent>) {
        while let Some(ListenerEvent { account_id, event }) = rx.recv().await {
            match event {
                SourceEvent::Ready => {
                    tracing::info!(account_id = %account_id, "listener ready");
                }
                SourceEvent::NewMail(count) => {
                    tracing::info!(account_id = %account_id, count, "new mail announced");
                }
                SourceEvent::Message(raw) => {
                    let subject = raw.subject.clone().unwrap_or_default();
                    match self.process_message(&account_id, *raw).await {
                        Ok(ProcessOutcome::Indexed(category)) => {
                            tracing::info!(
                                account_id = %account_id,
                                subject = %subject,
                                category = %category,
                                "incoming message classified and indexed"
                            );
                        }
                        Ok(ProcessOutcome::Unusable) => {}
                        Err(e) => {
                            tracing::error!(
                                account_id = %account_id,
                                subject = %subject,
                                "failed to process incoming message: {:#}",
                                e
                            );
                        }
                    }
                }
                SourceEvent::Error(e) => {
                    tracing::warn!(account_id = %account_id, "listener error: {}", e);
                }
                SourceEvent::Closed => {
                    tracing::info!(account_id = %account_id, "listener connection closed");
                }
            }
        }
    }

    /// The single-message pipeline, identical for backfill and real-time:
    /// transform, rate-limited classify, attach, index, and notify when the
    /// category is high-value.
    async fn process_message(
        &self,
        account_id: &AccountId,
        raw: RawMessage,
    ) -> Result<ProcessOutcome> {
        let Some(mut email) = transform(&raw, account_id) else {
            return Ok(ProcessOutcome::Unusable);
        };

        self.gate.acquire().await;
        let category = self
            .classifier
            .classify(&email.subject, &email.body.plain)
            .await;
        email.classification = Some(category);

        self.indexer
            .upsert(&email)
            .await
            .context("indexing failed")?;

        if category.is_high_value() {
            for notifier in &self.notifiers {
                tracing::info!(
                    email_id = %email.id,
                    channel = notifier.channel(),
                    "triggering notification for high-value email"
                );
                notifier.notify(&email).await;
            }
        }

        Ok(ProcessOutcome::Indexed(category))
    }
}

fn is_already_indexed(raw: &RawMessage, existing: &HashSet<EmailId>) -> bool {
    raw.message_id
        .as_deref()
        .is_some_and(|id| existing.contains(&EmailId::from(id)))
}
