use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{timeout_at, Instant};

use crate::canonical::{canonicalize, canonicalize_or_keep};
use crate::config::Config;
use crate::db::ArticleStore;
use crate::error::{AppError, Result};
use crate::extract::{derive_title, Extraction, Extractor};
use crate::fetch::{FetchOrchestrator, FetchedPage};
use crate::models::{Article, NewArticle, UsageRecord};

/// Settings handed to [`ArticleService`] at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Budget for one whole fetch chain (all strategies together)
    pub fetch_budget: Duration,
}

impl ServiceConfig {
    pub fn from_config(config: &Config) -> Self {
        let strategies = config.fetch_strategies.len().max(1) as u32;
        Self {
            fetch_budget: config.fetch_timeout() * strategies,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fetch_budget: Duration::from_secs(90),
        }
    }
}

/// Result of importing one historical record.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(Article),
    AlreadyPresent(Article),
}

enum Located {
    Existing(Article),
    Fetched(NewArticle),
}

/// "Get existing or fetch, extract and insert" for a requested URL.
pub struct ArticleService {
    store: ArticleStore,
    fetcher: Arc<FetchOrchestrator>,
    extractor: Arc<dyn Extractor>,
    config: ServiceConfig,
}

impl ArticleService {
    pub fn new(
        store: ArticleStore,
        fetcher: Arc<FetchOrchestrator>,
        extractor: Arc<dyn Extractor>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    /// Return the stored article for `requested`, fetching and storing it
    /// first if it is not present under the requested, final or canonical
    /// URL. Never marks the article read.
    pub async fn resolve(&self, requested: &str, title_hint: Option<&str>) -> Result<Article> {
        let (article, _) = self.resolve_located(requested, title_hint).await?;
        Ok(article)
    }

    /// Resolve, then record the access if the article was already stored.
    /// A freshly saved article stays unread, and a failed resolve leaves the
    /// store's read state untouched.
    pub async fn read(&self, requested: &str, title_hint: Option<&str>) -> Result<Article> {
        let (mut article, existing) = self.resolve_located(requested, title_hint).await?;
        if existing {
            match self.store.mark_read(&article.url).await {
                Ok(()) => article.unread = false,
                Err(e) => tracing::warn!("Failed to mark {} read: {}", article.url, e),
            }
        }
        Ok(article)
    }

    /// The resolved article and whether it was found already stored.
    async fn resolve_located(
        &self,
        requested: &str,
        title_hint: Option<&str>,
    ) -> Result<(Article, bool)> {
        match self.locate_or_fetch(requested, title_hint).await? {
            Located::Existing(article) => Ok((article, true)),
            Located::Fetched(new_article) => match self.store.insert(&new_article).await {
                Ok(article) => {
                    tracing::info!("Stored article {}", article.url);
                    Ok((article, false))
                }
                Err(AppError::StoreConflict(url)) => {
                    // Another request stored this URL while we were fetching.
                    tracing::warn!("Lost insert race for {}, returning extracted copy", url);
                    Ok((new_article.into_article(Utc::now()), false))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Import one historical record, keeping its original creation time.
    pub async fn import(
        &self,
        requested: &str,
        title_hint: Option<&str>,
        created: DateTime<Utc>,
    ) -> Result<ImportOutcome> {
        match self.locate_or_fetch(requested, title_hint).await? {
            Located::Existing(article) => Ok(ImportOutcome::AlreadyPresent(article)),
            Located::Fetched(new_article) => {
                match self.store.insert_with_timestamp(&new_article, created).await {
                    Ok(article) => Ok(ImportOutcome::Imported(article)),
                    Err(AppError::StoreConflict(url)) => match self.store.get_plain(&url).await? {
                        Some(existing) => Ok(ImportOutcome::AlreadyPresent(existing)),
                        None => Err(AppError::StoreConflict(url)),
                    },
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Look a URL up by its exact and canonical forms without fetching.
    pub async fn probe(&self, requested: &str) -> Result<Option<Article>> {
        let canonical = canonicalize(requested)?;
        self.probe_keys(&[requested, &canonical], &[]).await
    }

    /// Fetch and extract a page, both bounded by `deadline`.
    pub async fn fetch_contents(
        &self,
        url: &str,
        deadline: Instant,
    ) -> Result<(FetchedPage, Extraction)> {
        let page = self.fetcher.fetch(url, deadline).await?;
        let extraction = timeout_at(deadline, self.extractor.extract(&page.body))
            .await
            .map_err(|_| AppError::Timeout(format!("extracting {}", url)))??;
        Ok((page, extraction))
    }

    /// Probe the requested URL and its canonical form; only on a miss is the
    /// page fetched, after which the final URL and its canonical form are
    /// probed before anything is extracted.
    async fn locate_or_fetch(&self, requested: &str, title_hint: Option<&str>) -> Result<Located> {
        let requested = requested.trim();
        let canonical_requested = canonicalize(requested)?;
        let first_keys = [requested, canonical_requested.as_str()];
        if let Some(article) = self.probe_keys(&first_keys, &[]).await? {
            return Ok(Located::Existing(article));
        }

        tracing::info!("Fetching article {}", requested);
        let deadline = Instant::now() + self.config.fetch_budget;
        let page = self.fetcher.fetch(requested, deadline).await?;

        if page.final_url != requested {
            let final_canonical = canonicalize(&page.final_url).ok();
            let mut final_keys = vec![page.final_url.as_str()];
            final_keys.extend(final_canonical.as_deref());
            if let Some(article) = self.probe_keys(&final_keys, &first_keys).await? {
                tracing::info!("{} redirected to stored article {}", requested, article.url);
                return Ok(Located::Existing(article));
            }
        }

        let extraction = self.extractor.extract(&page.body).await?;
        self.record_usage(&page, &extraction).await;

        let title = derive_title(&extraction.text, &page.body, &page.final_url, title_hint);
        Ok(Located::Fetched(NewArticle {
            url: canonicalize_or_keep(&page.final_url),
            title: Some(title),
            contents: Some(extraction.text),
        }))
    }

    /// `get_plain` each key in order, skipping keys already in `probed`
    /// and repeats.
    async fn probe_keys(&self, keys: &[&str], probed: &[&str]) -> Result<Option<Article>> {
        let mut seen: Vec<&str> = probed.to_vec();
        for &key in keys {
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            if let Some(article) = self.store.get_plain(key).await? {
                return Ok(Some(article));
            }
        }
        Ok(None)
    }

    async fn record_usage(&self, page: &FetchedPage, extraction: &Extraction) {
        let usage = extraction.usage.unwrap_or_default();
        let record = UsageRecord {
            url: page.final_url.clone(),
            length_in: page.body.len(),
            length_out: extraction.text.len(),
            tokens_in: usage.input_tokens,
            tokens_out: usage.output_tokens,
        };
        if let Err(e) = self.store.record_usage(record).await {
            tracing::warn!("Error updating usage for {}: {}", page.final_url, e);
        }
    }
}
