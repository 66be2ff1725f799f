//! Elasticsearch indexer implementation.
//!
//! Talks to the Elasticsearch HTTP API directly with reqwest. Documents are
//! keyed by the composite `"{account_id}:{email_id}"`, so identical message
//! ids on different accounts never collide while the canonical `id` field
//! stays the bare message identifier.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{IndexError, IndexResult, Indexer};
use crate::config::IndexSettings;
use crate::domain::{AccountId, Email, EmailId};

/// Batch size for the scroll search used by [`Indexer::existing_ids`].
const SCROLL_PAGE_SIZE: u32 = 1000;
/// How long the server keeps each scroll context alive.
const SCROLL_KEEPALIVE: &str = "1m";

/// Elasticsearch-backed [`Indexer`].
pub struct ElasticIndexer {
    client: reqwest::Client,
    base: Url,
    index: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    #[serde(default)]
    hits: Hits,
}

#[derive(Debug, Default, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Option<DocSource>,
}

#[derive(Debug, Deserialize)]
struct DocSource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl ElasticIndexer {
    /// Creates an indexer for the configured node and index.
    pub fn new(settings: &IndexSettings) -> IndexResult<Self> {
        let base = Url::parse(&settings.url)
            .map_err(|e| IndexError::InvalidUrl(format!("{}: {}", settings.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(IndexError::InvalidUrl(settings.url.clone()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            index: settings.index.clone(),
        })
    }

    /// Creates the index with explicit mappings if it does not exist.
    pub async fn ensure_index(&self) -> IndexResult<()> {
        let url = self.url_for(&[&self.index])?;

        let head = self.client.head(url.clone()).send().await?;
        if head.status().is_success() {
            tracing::debug!(index = %self.index, "index already exists");
            return Ok(());
        }
        if head.status() != StatusCode::NOT_FOUND {
            return Err(response_error(head.status(), String::new()));
        }

        tracing::info!(index = %self.index, "creating index");
        let mappings = json!({
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "account_id": { "type": "keyword" },
                    "thread_id": { "type": "keyword" },
                    "subject": { "type": "text" },
                    "from": {
                        "properties": {
                            "name": { "type": "text" },
                            "address": { "type": "keyword" }
                        }
                    },
                    "to": {
                        "properties": {
                            "name": { "type": "text" },
                            "address": { "type": "keyword" }
                        }
                    },
                    "date": { "type": "date" },
                    "body": {
                        "properties": {
                            "plain": { "type": "text" },
                            "html": { "type": "text", "index": false }
                        }
                    },
                    "classification": { "type": "keyword" }
                }
            }
        });

        let response = self.client.put(url).json(&mappings).send().await?;
        check_success(response).await
    }

    /// Composite storage key scoping a message id to its account.
    fn doc_id(account_id: &AccountId, id: &EmailId) -> String {
        format!("{}:{}", account_id, id)
    }

    fn url_for(&self, segments: &[&str]) -> IndexResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| IndexError::InvalidUrl(self.base.to_string()))?;
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Indexer for ElasticIndexer {
    async fn existing_ids(&self, account_id: &AccountId) -> IndexResult<HashSet<EmailId>> {
        let mut url = self.url_for(&[&self.index, "_search"])?;
        url.query_pairs_mut().append_pair("scroll", SCROLL_KEEPALIVE);

        let query = json!({
            "size": SCROLL_PAGE_SIZE,
            "_source": ["id"],
            "query": { "term": { "account_id": { "value": account_id.0 } } }
        });

        let response = self.client.post(url).json(&query).send().await?;
        // A store that has never indexed anything is an empty set.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(HashSet::new());
        }
        let status = response.status();
        if !status.is_success() {
            return Err(response_error(status, response.text().await.unwrap_or_default()));
        }

        let mut ids = HashSet::new();
        let mut page: SearchResponse = response.json().await?;
        let mut scroll_id = page.scroll_id.take();

        loop {
            if page.hits.hits.is_empty() {
                break;
            }
            for hit in &page.hits.hits {
                if let Some(source) = &hit.source {
                    ids.insert(EmailId::from(source.id.clone()));
                }
            }

            let Some(id) = scroll_id.clone() else { break };
            let scroll_url = self.url_for(&["_search", "scroll"])?;
            let response = self
                .client
                .post(scroll_url)
                .json(&json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": id }))
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(response_error(status, response.text().await.unwrap_or_default()));
            }
            page = response.json().await?;
            if let Some(next) = page.scroll_id.take() {
                scroll_id = Some(next);
            }
        }

        // Best-effort: free the scroll context early.
        if let Some(id) = scroll_id {
            let scroll_url = self.url_for(&["_search", "scroll"])?;
            let _ = self
                .client
                .delete(scroll_url)
                .json(&json!({ "scroll_id": id }))
                .send()
                .await;
        }

        Ok(ids)
    }

    async fn upsert(&self, email: &Email) -> IndexResult<()> {
        let doc_id = Self::doc_id(&email.account_id, &email.id);
        let mut url = self.url_for(&[&self.index, "_doc", &doc_id])?;
        // Refresh so the document is searchable as soon as the call returns.
        url.query_pairs_mut().append_pair("refresh", "true");

        let response = self.client.put(url).json(email).send().await?;
        check_success(response).await
    }

    async fn exists(&self, account_id: &AccountId, id: &EmailId) -> IndexResult<bool> {
        let doc_id = Self::doc_id(account_id, id);
        let url = self.url_for(&[&self.index, "_doc", &doc_id])?;

        let response = self.client.head(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(response_error(status, String::new())),
        }
    }

    async fn count(&self) -> IndexResult<u64> {
        let url = self.url_for(&[&self.index, "_count"])?;

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(response_error(status, response.text().await.unwrap_or_default()));
        }

        let parsed: CountResponse = response.json().await?;
        Ok(parsed.count)
    }
}

fn response_error(status: StatusCode, message: String) -> IndexError {
    IndexError::Response {
        status: status.as_u16(),
        message,
    }
}

async fn check_success(response: reqwest::Response) -> IndexResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(response_error(status, response.text().await.unwrap_or_default()))
    }
}
