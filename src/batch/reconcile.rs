//! Offline repair of historical duplicates: every article is moved to its
//! canonical URL, and when several articles share one canonical URL a single
//! survivor is kept.

use std::collections::HashMap;
use std::fmt;

use crate::canonical::canonicalize;
use crate::db::ArticleStore;
use crate::error::Result;
use crate::models::Article;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub total: usize,
    /// Articles actually moved to their canonical URL (survivors and singletons only)
    pub canonicalized: usize,
    pub duplicates_found: usize,
    pub duplicates_removed: usize,
    pub errors: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Canonicalization summary:")?;
        writeln!(f, "  Total articles processed: {}", self.total)?;
        writeln!(f, "  URLs canonicalized: {}", self.canonicalized)?;
        writeln!(f, "  Duplicate articles found: {}", self.duplicates_found)?;
        writeln!(f, "  Duplicate articles removed: {}", self.duplicates_removed)?;
        write!(f, "  Errors: {}", self.errors)
    }
}

struct Group {
    canonical: String,
    members: Vec<Article>,
}

pub struct Reconciler {
    store: ArticleStore,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(store: ArticleStore, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    /// Scan the whole store. Only the initial load can fail; per-article
    /// failures are counted in the report and the scan continues.
    pub async fn run(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        if !self.dry_run {
            let indexed = self.store.rebuild_index().await?;
            tracing::info!("Search index rebuilt with {} articles", indexed);
        }

        let articles = self.store.all_by_created().await?;
        report.total = articles.len();
        tracing::info!(
            "Found {} articles to process (dry-run: {})",
            report.total,
            self.dry_run
        );

        for group in group_by_canonical(articles, &mut report) {
            if group.members.len() == 1 {
                self.canonicalize_single(&group, &mut report).await;
            } else {
                self.merge_duplicates(group, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn canonicalize_single(&self, group: &Group, report: &mut ReconcileReport) {
        let article = &group.members[0];
        if article.url == group.canonical {
            return;
        }
        tracing::info!("Canonicalizing: {} -> {}", article.url, group.canonical);
        if self.rename(&article.url, &group.canonical, report).await {
            report.canonicalized += 1;
        }
    }

    async fn merge_duplicates(&self, group: Group, report: &mut ReconcileReport) {
        let Group { canonical, members } = group;
        report.duplicates_found += members.len() - 1;

        tracing::info!(
            "Found {} duplicate articles for canonical URL: {}",
            members.len(),
            canonical
        );
        for (i, article) in members.iter().enumerate() {
            tracing::info!(
                "  [{}] {} (created: {}, archived: {})",
                i + 1,
                article.url,
                article.created,
                article.archived
            );
        }

        let keep = select_survivor(&members);
        tracing::info!("  -> Keeping article: {}", members[keep].url);

        // Remove the others first so the survivor can take the canonical
        // URL even when a duplicate already holds it.
        for (i, article) in members.iter().enumerate() {
            if i == keep {
                continue;
            }
            tracing::info!("  -> Removing duplicate: {}", article.url);
            if self.dry_run {
                report.duplicates_removed += 1;
                continue;
            }
            match self.store.delete(&article.url).await {
                Ok(()) => report.duplicates_removed += 1,
                Err(e) => {
                    tracing::error!("Failed to delete duplicate article {}: {}", article.url, e);
                    report.errors += 1;
                }
            }
        }

        let survivor = &members[keep];
        if survivor.url != canonical {
            tracing::info!("  -> Canonicalizing kept article: {} -> {}", survivor.url, canonical);
            if self.rename(&survivor.url, &canonical, report).await {
                report.canonicalized += 1;
            }
        }
    }

    async fn rename(&self, from: &str, to: &str, report: &mut ReconcileReport) -> bool {
        if self.dry_run {
            return true;
        }
        match self.store.rename(from, to).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to update URL for {}: {}", from, e);
                report.errors += 1;
                false
            }
        }
    }
}

/// Group articles by canonical URL, keeping groups and their members in
/// first-seen order. Unparseable URLs are counted as errors and left alone.
fn group_by_canonical(articles: Vec<Article>, report: &mut ReconcileReport) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for article in articles {
        let canonical = match canonicalize(&article.url) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::error!("Failed to canonicalize URL {}: {}", article.url, e);
                report.errors += 1;
                continue;
            }
        };
        match index.get(&canonical) {
            Some(&i) => groups[i].members.push(article),
            None => {
                index.insert(canonical.clone(), groups.len());
                groups.push(Group {
                    canonical,
                    members: vec![article],
                });
            }
        }
    }

    groups
}

/// Index of the article to keep: not archived beats archived, then
/// non-empty contents beats empty, then the newest `created` wins. Ties go
/// to the earliest member.
pub fn select_survivor(members: &[Article]) -> usize {
    let rank = |a: &Article| (!a.archived, a.has_contents(), a.created);
    let mut best = 0;
    for (i, article) in members.iter().enumerate().skip(1) {
        if rank(article) > rank(&members[best]) {
            best = i;
        }
    }
    best
}
