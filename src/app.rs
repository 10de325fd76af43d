use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::db::ArticleStore;
use crate::error::Result;
use crate::extract::{self, Extractor, HtmlTextExtractor};
use crate::fetch::FetchOrchestrator;
use crate::services::{ArticleService, ServiceConfig};

/// Long-lived collaborators shared by the server and the batch commands.
pub struct App {
    pub config: Config,
    pub store: ArticleStore,
    fetcher: Arc<FetchOrchestrator>,
}

impl App {
    /// Open the store and build the fetch chain. Failing to open the store
    /// is fatal to every command.
    pub async fn new(config: Config) -> Result<Self> {
        let store = ArticleStore::open(&config.db_path).await?;
        let fetcher = FetchOrchestrator::from_kinds(&config.fetch_strategies, config.fetch_timeout())?;
        tracing::info!(
            "Opened {} (fetch strategies: {})",
            config.db_path,
            fetcher.strategy_names().join(", ")
        );
        Ok(Self {
            config,
            store,
            fetcher: Arc::new(fetcher),
        })
    }

    /// Service using the configured extractor.
    pub fn service(&self) -> Result<ArticleService> {
        let extractor = extract::from_config(&self.config)?;
        Ok(self.service_with(extractor))
    }

    /// Service re-extracting with in-process HTML conversion, used to
    /// migrate stored contents.
    pub fn migration_service(&self) -> ArticleService {
        self.service_with(Arc::new(HtmlTextExtractor::default()))
    }

    fn service_with(&self, extractor: Arc<dyn Extractor>) -> ArticleService {
        ArticleService::new(
            self.store.clone(),
            self.fetcher.clone(),
            extractor,
            ServiceConfig::from_config(&self.config),
        )
    }

    pub async fn serve(&self) -> Result<()> {
        let state = AppState {
            service: Arc::new(self.service()?),
        };
        let frontend = self.config.frontend_path.as_ref().map(PathBuf::from);
        let router = build_router(state, frontend.as_deref());

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, router).await?;
        Ok(())
    }
}
