use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use url::Url;

use crate::error::{AppError, Result};

use super::strategy::{FetchStrategy, FetchedPage, StrategyKind};

/// Retrieves a page by trying each strategy in turn until one succeeds.
///
/// Strategies run strictly in sequence; every attempt is bounded by the
/// caller's deadline. Dropping an attempt at the deadline discards whatever
/// it had read.
pub struct FetchOrchestrator {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl FetchOrchestrator {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the chain named by `kinds`, each with its own request timeout.
    pub fn from_kinds(kinds: &[StrategyKind], per_attempt: Duration) -> Result<Self> {
        let strategies = kinds
            .iter()
            .map(|kind| kind.build(per_attempt))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(strategies))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn fetch(&self, url: &str, deadline: Instant) -> Result<FetchedPage> {
        Url::parse(url).map_err(|e| AppError::invalid_url(url, e))?;

        let mut attempts = 0;
        let mut last = None;

        for strategy in &self.strategies {
            attempts += 1;
            match timeout_at(deadline, strategy.fetch(url)).await {
                Ok(Ok(page)) => {
                    tracing::debug!(
                        "Fetched {} via {} ({} bytes, final URL {})",
                        url,
                        strategy.name(),
                        page.body.len(),
                        page.final_url
                    );
                    return Ok(page);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Fetch strategy {} failed for {}: {}", strategy.name(), url, e);
                    last = Some(e);
                }
                Err(_) => {
                    tracing::warn!("Fetch strategy {} hit the deadline for {}", strategy.name(), url);
                    last = Some(AppError::Timeout(format!("{} via {}", url, strategy.name())));
                    break;
                }
            }
        }

        Err(AppError::FetchFailed {
            url: url.to_string(),
            attempts,
            last: Box::new(
                last.unwrap_or_else(|| AppError::Config("no fetch strategies configured".into())),
            ),
        })
    }
}
