#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use readlater::db::ArticleStore;
use readlater::error::{AppError, Result};
use readlater::extract::{Extraction, Extractor};
use readlater::fetch::{FetchOrchestrator, FetchStrategy, FetchedPage};
use readlater::models::NewArticle;
use readlater::services::{ArticleService, ServiceConfig};

/// Serves canned pages. Each route maps a requested URL to the final URL
/// after redirects and the page body; unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: HashMap<String, (String, String)>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.routes
            .insert(url.to_string(), (url.to_string(), body.to_string()));
        self
    }

    pub fn redirect(mut self, from: &str, to: &str, body: &str) -> Self {
        self.routes
            .insert(from.to_string(), (to.to_string(), body.to_string()));
        self
    }
}

#[async_trait]
impl FetchStrategy for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.routes.get(url) {
            Some((final_url, body)) => Ok(FetchedPage {
                body: body.as_bytes().to_vec(),
                final_url: final_url.clone(),
            }),
            None => Err(AppError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Uses the page body as the extracted text; bodies containing `FAIL` are
/// rejected.
#[derive(Default)]
pub struct EchoExtractor {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Extractor for EchoExtractor {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn extract(&self, html: &[u8]) -> Result<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(html).to_string();
        if text.contains("FAIL") {
            return Err(AppError::ExtractFailed("unreadable page".to_string()));
        }
        Ok(Extraction::text(text))
    }
}

/// Stores a competing article under `url` while "extracting", as a second
/// concurrent request would.
pub struct RacingExtractor {
    pub store: ArticleStore,
    pub url: String,
}

#[async_trait]
impl Extractor for RacingExtractor {
    fn name(&self) -> &'static str {
        "racing"
    }

    async fn extract(&self, html: &[u8]) -> Result<Extraction> {
        self.store
            .insert(&NewArticle {
                url: self.url.clone(),
                title: Some("Winner".to_string()),
                contents: Some("stored by the other request".to_string()),
            })
            .await?;
        Ok(Extraction::text(String::from_utf8_lossy(html).to_string()))
    }
}

pub fn service_with(
    store: &ArticleStore,
    fetcher: ScriptedFetcher,
    extractor: Arc<dyn Extractor>,
) -> ArticleService {
    ArticleService::new(
        store.clone(),
        Arc::new(FetchOrchestrator::new(vec![Box::new(fetcher)])),
        extractor,
        ServiceConfig {
            fetch_budget: Duration::from_secs(5),
        },
    )
}

pub async fn seed(store: &ArticleStore, url: &str, contents: &str) {
    store
        .insert(&NewArticle {
            url: url.to_string(),
            title: Some(url.to_string()),
            contents: Some(contents.to_string()),
        })
        .await
        .unwrap();
}
