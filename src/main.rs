//! onebox - entry point for the ingestion process

use std::sync::Arc;

use anyhow::{Context, Result};

use onebox::config::Settings;
use onebox::providers::ai::GeminiClassifier;
use onebox::providers::email::ImapMailSource;
use onebox::services::{Notifier, SlackNotifier, SyncService, WebhookNotifier};
use onebox::storage::{ElasticIndexer, Indexer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting onebox");

    // Missing configuration is the only fatal error class.
    let settings = Settings::from_env().context("failed to load configuration")?;

    let indexer = Arc::new(
        ElasticIndexer::new(&settings.index).context("failed to configure the index client")?,
    );
    indexer
        .ensure_index()
        .await
        .context("failed to bootstrap the search index")?;
    match indexer.count().await {
        Ok(count) => tracing::info!(count, "search index ready"),
        Err(e) => tracing::warn!("could not read index document count: {}", e),
    }

    let classifier = Arc::new(GeminiClassifier::new(&settings.classifier));

    let notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(SlackNotifier::new(
            settings.notifications.slack_webhook_url.clone(),
        )),
        Arc::new(WebhookNotifier::new(
            settings.notifications.generic_webhook_url.clone(),
        )),
    ];

    let mut sync = SyncService::new(classifier, indexer, notifiers, settings.sync.clone());
    for account in &settings.accounts {
        let source = Arc::new(ImapMailSource::new(account.clone(), settings.mail.clone()));
        sync.register_source(account.clone(), source);
    }
    let sync = Arc::new(sync);

    // Backfill runs to completion before any listener starts, so the dedup
    // snapshot cannot be invalidated by a real-time arrival.
    let report = sync.run_initial_sync().await;
    tracing::info!(
        accounts = report.accounts_synced,
        failed_accounts = report.accounts_failed,
        indexed = report.indexed,
        deduplicated = report.already_indexed,
        "initial sync finished"
    );

    sync.start_all_listeners();

    // Listeners run until the process is terminated.
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    tracing::info!("shutting down");
    Ok(())
}
