//! Re-extract the contents of stored articles with the service's current
//! extractor, replacing the body only when the text actually changed.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::services::ArticleService;

#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub timeout: Duration,
    pub delay: Duration,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            limit: None,
            timeout: Duration::from_secs(30),
            delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateReport {
    pub total: usize,
    pub processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl fmt::Display for MigrateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration summary:")?;
        writeln!(f, "  Total articles with contents: {}", self.total)?;
        writeln!(f, "  Processed: {}", self.processed)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Unchanged: {}", self.skipped)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        write!(f, "  Duration: {:.1}s", self.duration.as_secs_f64())
    }
}

/// Walk every article that already has contents, oldest first. Only loading
/// the article list can fail the run; per-article failures are counted.
pub async fn run_migrate(service: &ArticleService, options: MigrateOptions) -> Result<MigrateReport> {
    let started = Instant::now();
    let store = service.store();

    let mut articles: Vec<_> = store
        .all_by_created()
        .await?
        .into_iter()
        .filter(|a| a.contents.is_some())
        .collect();

    let mut report = MigrateReport {
        total: articles.len(),
        ..Default::default()
    };
    if let Some(limit) = options.limit {
        articles.truncate(limit);
    }
    tracing::info!(
        "Migrating {} of {} articles (dry-run: {})",
        articles.len(),
        report.total,
        options.dry_run
    );

    let count = articles.len();
    for (i, article) in articles.into_iter().enumerate() {
        report.processed += 1;
        tracing::info!("[{}/{}] {}", i + 1, count, article.url);

        let deadline = Instant::now() + options.timeout;
        match service.fetch_contents(&article.url, deadline).await {
            Ok((_, extraction)) => {
                let old = article.contents.as_deref().unwrap_or_default().trim();
                let new = extraction.text.trim();
                if old == new {
                    tracing::debug!("  unchanged");
                    report.skipped += 1;
                } else if options.dry_run {
                    tracing::info!("  would update ({} -> {} bytes)", old.len(), new.len());
                    report.updated += 1;
                } else {
                    match store.update_contents(&article.url, &extraction.text).await {
                        Ok(()) => {
                            tracing::info!("  updated ({} -> {} bytes)", old.len(), new.len());
                            report.updated += 1;
                        }
                        Err(e) => {
                            tracing::warn!("  failed to save: {}", e);
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("  failed: {}", e);
                report.failed += 1;
            }
        }

        if !options.delay.is_zero() && i + 1 < count {
            tokio::time::sleep(options.delay).await;
        }
    }

    report.duration = started.elapsed();
    Ok(report)
}
