use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Article, ArticleSummary, NewArticle, UsageRecord};

use super::schema::{LEGACY_CLEANUP, METADATA, REBUILD_INDEX, SCHEMA, SCHEMA_VERSION};

const ARTICLE_COLUMNS: &str = "url, title, contents, unread, archived, created, lastAccess";
const SUMMARY_COLUMNS: &str = "a.title, a.url, (a.contents IS NOT NULL), a.unread, a.archived";

/// Durable article collection with a synchronized full-text index.
///
/// Every write that changes an article's url, title or contents updates its
/// `search_index` row inside the same transaction, so the set of indexed
/// urls always equals the set of stored urls.
#[derive(Clone)]
pub struct ArticleStore {
    conn: Connection,
}

impl ArticleStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(METADATA)?;
            let version: i64 = conn.query_row(
                "SELECT COALESCE(MAX(schemaVersion), 0) FROM metadata",
                [],
                |row| row.get(0),
            )?;
            if version < SCHEMA_VERSION {
                let tx = conn.transaction()?;
                tx.execute_batch(LEGACY_CLEANUP)?;
                tx.execute_batch(SCHEMA)?;
                tx.execute_batch(REBUILD_INDEX)?;
                tx.execute(
                    "INSERT OR REPLACE INTO metadata (id, schemaVersion) VALUES (1, ?1)",
                    params![SCHEMA_VERSION],
                )?;
                tx.commit()?;
                tracing::info!("Store schema upgraded from version {} to {}", version, SCHEMA_VERSION);
            }
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Reads

    /// Read an article without side effects.
    pub async fn get_plain(&self, url: &str) -> Result<Option<Article>> {
        let url = url.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"),
                        params![url],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Read an article and record the access: clears `unread` and refreshes
    /// `lastAccess`.
    pub async fn get_touch(&self, url: &str) -> Result<Option<Article>> {
        let url = url.to_string();
        let now = format_timestamp(Utc::now());
        let article = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE articles SET unread = 0, lastAccess = ?1 WHERE url = ?2",
                    params![now, url],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let article = tx.query_row(
                    &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"),
                    params![url],
                    article_from_row,
                )?;
                tx.commit()?;
                Ok(Some(article))
            })
            .await?;
        Ok(article)
    }

    /// Every article, oldest `created` first.
    pub async fn all_by_created(&self) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created ASC, rowid ASC"
                ))?;
                let articles = stmt
                    .query_map([], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Unarchived articles, most recently accessed first.
    pub async fn list_recent(&self, count: usize) -> Result<Vec<ArticleSummary>> {
        self.list_summaries(
            "WHERE NOT a.archived ORDER BY a.lastAccess DESC, a.rowid DESC LIMIT ?1",
            count,
        )
        .await
    }

    /// All articles, archived or not, newest `created` first.
    pub async fn list_archive_feed(&self, count: usize) -> Result<Vec<ArticleSummary>> {
        self.list_summaries("ORDER BY a.created DESC, a.rowid DESC LIMIT ?1", count)
            .await
    }

    async fn list_summaries(&self, tail: &'static str, count: usize) -> Result<Vec<ArticleSummary>> {
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let list = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {SUMMARY_COLUMNS} FROM articles a {tail}"))?;
                let list = stmt
                    .query_map(params![limit], summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(list)
            })
            .await?;
        Ok(list)
    }

    /// Full-text search over title and contents, best match first.
    ///
    /// A trailing word is matched as a prefix unless the query ends in a
    /// quoted phrase. An empty query returns no results.
    pub async fn search(&self, query: &str) -> Result<Vec<ArticleSummary>> {
        let Some(pattern) = build_match_query(query)? else {
            return Ok(Vec::new());
        };
        let query = query.to_string();
        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUMMARY_COLUMNS} FROM search_index
                     INNER JOIN articles a ON search_index.url = a.url
                     WHERE search_index MATCH ?1 ORDER BY rank"
                ))?;
                let list = stmt
                    .query_map(params![pattern], summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(list)
            })
            .await;

        result.map_err(|e| match fts_syntax_error(&e) {
            Some(reason) => AppError::SearchQueryInvalid { query, reason },
            None => e.into(),
        })
    }

    /// Number of stored articles and of search index rows.
    pub async fn index_counts(&self) -> Result<(usize, usize)> {
        let counts = self
            .conn
            .call(|conn| {
                let articles: i64 =
                    conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                let indexed: i64 =
                    conn.query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))?;
                Ok((articles as usize, indexed as usize))
            })
            .await?;
        Ok(counts)
    }

    // Writes

    /// Insert a new article; fails with `StoreConflict` if the url exists.
    pub async fn insert(&self, article: &NewArticle) -> Result<Article> {
        self.insert_with_timestamp(article, Utc::now()).await
    }

    /// Insert with a caller-supplied `created` time (bulk import). The
    /// article's `lastAccess` starts at the same instant.
    pub async fn insert_with_timestamp(
        &self,
        article: &NewArticle,
        created: DateTime<Utc>,
    ) -> Result<Article> {
        let row = article.clone();
        let stamp = format_timestamp(created);
        let url = article.url.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO articles (url, title, contents, unread, archived, created, lastAccess)
                     VALUES (?1, ?2, ?3, 1, 0, ?4, ?4)",
                    params![row.url, row.title, row.contents, stamp],
                )?;
                reindex(&tx, None, &row.url)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| conflict_or(e, &url))?;

        Ok(article.clone().into_article(truncate_millis(created)))
    }

    pub async fn set_archived(&self, url: &str, archived: bool) -> Result<()> {
        let key = url.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE articles SET archived = ?1 WHERE url = ?2",
                    params![archived, key],
                )?)
            })
            .await?;
        found_or(changed, url)
    }

    /// Clear `unread` and refresh `lastAccess` without reading the row.
    pub async fn mark_read(&self, url: &str) -> Result<()> {
        let key = url.to_string();
        let now = format_timestamp(Utc::now());
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE articles SET unread = 0, lastAccess = ?1 WHERE url = ?2",
                    params![now, key],
                )?)
            })
            .await?;
        found_or(changed, url)
    }

    /// Replace an article's extracted contents.
    pub async fn update_contents(&self, url: &str, contents: &str) -> Result<()> {
        let key = url.to_string();
        let contents = contents.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE articles SET contents = ?1 WHERE url = ?2",
                    params![contents, key],
                )?;
                if changed > 0 {
                    reindex(&tx, Some(&key), &key)?;
                    tx.commit()?;
                }
                Ok(changed)
            })
            .await?;
        found_or(changed, url)
    }

    /// Change an article's primary key. Fails with `StoreConflict` when
    /// `new_url` is already taken.
    pub async fn rename(&self, old_url: &str, new_url: &str) -> Result<()> {
        let old = old_url.to_string();
        let new = new_url.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE articles SET url = ?1 WHERE url = ?2",
                    params![new, old],
                )?;
                if changed > 0 {
                    reindex(&tx, Some(&old), &new)?;
                    tx.commit()?;
                }
                Ok(changed)
            })
            .await
            .map_err(|e| conflict_or(e, new_url))?;
        found_or(changed, old_url)
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        let key = url.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute("DELETE FROM articles WHERE url = ?1", params![key])?;
                if changed > 0 {
                    tx.execute("DELETE FROM search_index WHERE url = ?1", params![key])?;
                    tx.commit()?;
                }
                Ok(changed)
            })
            .await?;
        found_or(changed, url)
    }

    /// Repopulate the whole search index from the articles table. Returns
    /// the number of indexed articles.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let tx = conn.transaction()?;
                tx.execute_batch(REBUILD_INDEX)?;
                let count: i64 =
                    tx.query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))?;
                tx.commit()?;
                Ok(count as usize)
            })
            .await?;
        Ok(count)
    }

    pub async fn record_usage(&self, usage: UsageRecord) -> Result<()> {
        let stamp = format_timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO usage (timestamp, url, lengthIn, lengthOut, tokensIn, tokensOut)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        stamp,
                        usage.url,
                        usage.length_in as i64,
                        usage.length_out as i64,
                        usage.tokens_in as i64,
                        usage.tokens_out as i64,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Drop the index row for `old_url` (if any) and index the current row
/// stored under `new_url`.
fn reindex(tx: &Transaction, old_url: Option<&str>, new_url: &str) -> rusqlite::Result<()> {
    if let Some(old) = old_url {
        tx.execute("DELETE FROM search_index WHERE url = ?1", params![old])?;
    }
    tx.execute(
        "INSERT INTO search_index (url, title, contents)
         SELECT url, title, contents FROM articles WHERE url = ?1",
        params![new_url],
    )?;
    Ok(())
}

fn found_or(changed: usize, url: &str) -> Result<()> {
    if changed == 0 {
        Err(AppError::NotFound(url.to_string()))
    } else {
        Ok(())
    }
}

fn conflict_or(err: tokio_rusqlite::Error, url: &str) -> AppError {
    let err = AppError::from(err);
    if err.is_constraint_violation() {
        AppError::StoreConflict(url.to_string())
    } else {
        err
    }
}

/// Rewrite a user query into an FTS5 MATCH expression. `None` means the
/// query is blank.
pub(crate) fn build_match_query(query: &str) -> Result<Option<String>> {
    let pattern = query.trim();
    if pattern.is_empty() {
        return Ok(None);
    }
    if pattern.chars().filter(|&c| c == '"').count() % 2 != 0 {
        return Err(AppError::SearchQueryInvalid {
            query: query.to_string(),
            reason: "unbalanced quotes".to_string(),
        });
    }
    let mut pattern = pattern.to_string();
    if pattern.chars().last().is_some_and(char::is_alphabetic) {
        pattern.push('*');
    }
    Ok(Some(pattern))
}

fn fts_syntax_error(err: &tokio_rusqlite::Error) -> Option<String> {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(_, Some(msg)))
            if msg.starts_with("fts5:") || msg.starts_with("no such column") =>
        {
            Some(msg.clone())
        }
        _ => None,
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    parse_datetime(&format_timestamp(dt)).unwrap_or(dt)
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format, with or without fractional seconds
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized timestamp {raw:?}").into(),
        )
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        url: row.get(0)?,
        title: row.get(1)?,
        contents: row.get(2)?,
        unread: row.get(3)?,
        archived: row.get(4)?,
        created: timestamp_column(row, 5)?,
        last_access: timestamp_column(row, 6)?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<ArticleSummary> {
    Ok(ArticleSummary {
        title: row.get(0)?,
        url: row.get(1)?,
        has_body: row.get(2)?,
        unread: row.get(3)?,
        archived: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn setup() -> ArticleStore {
        ArticleStore::open_in_memory().await.unwrap()
    }

    fn new_article(url: &str, title: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: Some(title.to_string()),
            contents: None,
        }
    }

    async fn indexed(store: &ArticleStore) -> Vec<(String, Option<String>, Option<String>)> {
        store
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT url, title, contents FROM search_index ORDER BY url")?;
                let rows: Vec<(String, Option<String>, Option<String>)> = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap()
    }

    async fn set_last_access(store: &ArticleStore, url: &'static str, stamp: &'static str) {
        store
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET lastAccess = ?1 WHERE url = ?2",
                    params![stamp, url],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn insert_then_get_plain_round_trips() {
        let store = setup().await;
        let article = NewArticle {
            url: "http://example.com/".to_string(),
            title: Some("article".to_string()),
            contents: Some("# article\nbody".to_string()),
        };
        let inserted = store.insert(&article).await.unwrap();

        let got = store.get_plain("http://example.com/").await.unwrap().unwrap();
        assert_eq!(got, inserted);
        assert_eq!(got.title.as_deref(), Some("article"));
        assert_eq!(got.contents.as_deref(), Some("# article\nbody"));
        assert!(got.unread);
        assert!(!got.archived);
        assert_eq!(got.created, got.last_access);

        assert!(store.get_plain("http://foo.com/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = setup().await;
        assert_ok!(store.insert(&new_article("http://example.com/", "article")).await);
        let err = assert_err!(store.insert(&new_article("http://example.com/", "again")).await);
        assert!(matches!(err, AppError::StoreConflict(ref url) if url == "http://example.com/"));
        assert_eq!(store.index_counts().await.unwrap(), (1, 1));
    }

    #[tokio::test]
    async fn get_plain_has_no_side_effects() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/", "a")).await.unwrap();
        set_last_access(&store, "http://a.com/", "2016-03-29 00:00:00").await;

        let got = store.get_plain("http://a.com/").await.unwrap().unwrap();
        assert!(got.unread);
        let again = store.get_plain("http://a.com/").await.unwrap().unwrap();
        assert_eq!(got.last_access, again.last_access);
    }

    #[tokio::test]
    async fn get_touch_updates_last_access() {
        let store = setup().await;
        store.insert(&new_article("http://example.com/", "article")).await.unwrap();
        store.insert(&new_article("http://example2.com/", "article2")).await.unwrap();
        set_last_access(&store, "http://example.com/", "2016-03-29 00:00:00").await;
        set_last_access(&store, "http://example2.com/", "2016-03-30 00:00:00").await;

        let recents = store.list_recent(1).await.unwrap();
        assert_eq!(recents[0].url, "http://example2.com/");

        let touched = store.get_touch("http://example.com/").await.unwrap().unwrap();
        assert!(!touched.unread);

        let recents = store.list_recent(1).await.unwrap();
        assert_eq!(recents.len(), 1);
        assert_eq!(recents[0].url, "http://example.com/");
        assert_eq!(recents[0].title.as_deref(), Some("article"));

        assert!(store.get_touch("http://missing.com/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_puts_article_first_in_recents() {
        let store = setup().await;
        store.insert(&new_article("http://example2.com/", "article2")).await.unwrap();
        set_last_access(&store, "http://example2.com/", "2016-03-30 00:00:00").await;

        store.insert(&new_article("http://example.com/", "article")).await.unwrap();
        let recents = store.list_recent(1).await.unwrap();
        assert_eq!(recents[0].url, "http://example.com/");
    }

    #[tokio::test]
    async fn recents_skip_archived_but_archive_feed_keeps_them() {
        let store = setup().await;
        for (url, title) in [
            ("http://example.com/", "article"),
            ("http://example2.com/", "article2"),
            ("http://example3.com/", "article3"),
            ("http://example4.com/", "article4"),
        ] {
            store.insert(&new_article(url, title)).await.unwrap();
        }
        store.set_archived("http://example4.com/", true).await.unwrap();

        let recents = store.list_recent(5).await.unwrap();
        assert_eq!(recents.len(), 3);
        assert!(recents.iter().all(|a| !a.archived));
        assert!(recents.iter().all(|a| a.url != "http://example4.com/"));

        let feed = store.list_archive_feed(5).await.unwrap();
        assert_eq!(feed.len(), 4);
        assert_eq!(feed[0].url, "http://example4.com/");
        assert!(feed[0].archived);

        assert_eq!(store.list_archive_feed(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recents_are_ordered_by_last_access() {
        let store = setup().await;
        for url in ["http://a.com/", "http://b.com/", "http://c.com/"] {
            store.insert(&new_article(url, "x")).await.unwrap();
        }
        set_last_access(&store, "http://a.com/", "2020-01-03 00:00:00").await;
        set_last_access(&store, "http://b.com/", "2020-01-01 00:00:00").await;
        set_last_access(&store, "http://c.com/", "2020-01-02 00:00:00").await;

        let urls: Vec<_> = store
            .list_recent(5)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.url)
            .collect();
        assert_eq!(urls, ["http://a.com/", "http://c.com/", "http://b.com/"]);
    }

    #[tokio::test]
    async fn writes_to_missing_articles_are_not_found() {
        let store = setup().await;
        let err = assert_err!(store.set_archived("http://nope.com/", true).await);
        assert_eq!(err.kind(), "NotFound");
        let err = assert_err!(store.mark_read("http://nope.com/").await);
        assert_eq!(err.kind(), "NotFound");
        let err = assert_err!(store.delete("http://nope.com/").await);
        assert_eq!(err.kind(), "NotFound");
        let err = assert_err!(store.rename("http://nope.com/", "http://x.com/").await);
        assert_eq!(err.kind(), "NotFound");
        let err = assert_err!(store.update_contents("http://nope.com/", "body").await);
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn mark_read_clears_unread() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/", "a")).await.unwrap();
        store.mark_read("http://a.com/").await.unwrap();
        assert!(!store.get_plain("http://a.com/").await.unwrap().unwrap().unread);
    }

    #[tokio::test]
    async fn search_matches_words_prefixes_and_phrases() {
        let store = setup().await;
        store.insert(&new_article("http://example.com/", "one two")).await.unwrap();
        store.insert(&new_article("http://example2.com/", "one three")).await.unwrap();

        assert_eq!(store.search("one").await.unwrap().len(), 2);
        assert_eq!(store.search("one two").await.unwrap().len(), 1);
        assert_eq!(store.search("one two three").await.unwrap().len(), 0);
        // auto prefix on the final token
        assert_eq!(store.search("one thr").await.unwrap().len(), 1);
        assert_eq!(store.search("\"one three\"").await.unwrap().len(), 1);
        // phrases are passed through without a prefix
        assert_eq!(store.search("\"one thr\"").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn search_covers_contents_and_ranks() {
        let store = setup().await;
        store
            .insert(&NewArticle {
                url: "http://a.com/".to_string(),
                title: Some("biscuits".to_string()),
                contents: Some("buttermilk buttermilk buttermilk biscuits".to_string()),
            })
            .await
            .unwrap();
        store
            .insert(&NewArticle {
                url: "http://b.com/".to_string(),
                title: Some("bread".to_string()),
                contents: Some("banana bread with a little buttermilk and a lot of words".to_string()),
            })
            .await
            .unwrap();

        let results = store.search("buttermil").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "http://a.com/");
        assert!(results[0].has_body);
        assert!(store.search("foo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_search_is_empty_not_an_error() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/", "a")).await.unwrap();
        assert!(store.search("").await.unwrap().is_empty());
        assert!(store.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_search_is_rejected() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/", "a")).await.unwrap();
        let err = assert_err!(store.search("\"one two").await);
        assert_eq!(err.kind(), "SearchQueryInvalid");
        let err = assert_err!(store.search("(one two").await);
        assert_eq!(err.kind(), "SearchQueryInvalid");
    }

    #[test]
    fn match_query_rewriting() {
        assert_eq!(build_match_query("one thr").unwrap().as_deref(), Some("one thr*"));
        assert_eq!(build_match_query("\"one thr\"").unwrap().as_deref(), Some("\"one thr\""));
        assert_eq!(build_match_query("2024").unwrap().as_deref(), Some("2024"));
        assert_eq!(build_match_query("café").unwrap().as_deref(), Some("café*"));
        assert_eq!(build_match_query(" ").unwrap(), None);
    }

    #[tokio::test]
    async fn index_tracks_every_write() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/x?y=1", "first title")).await.unwrap();
        store.insert(&new_article("http://b.com/", "second")).await.unwrap();

        store.update_contents("http://b.com/", "fresh body").await.unwrap();
        store.rename("http://a.com/x?y=1", "http://a.com/x").await.unwrap();
        assert_eq!(
            indexed(&store).await,
            vec![
                ("http://a.com/x".to_string(), Some("first title".to_string()), None),
                (
                    "http://b.com/".to_string(),
                    Some("second".to_string()),
                    Some("fresh body".to_string())
                ),
            ]
        );
        assert_eq!(store.search("fresh").await.unwrap()[0].url, "http://b.com/");

        store.delete("http://b.com/").await.unwrap();
        assert_eq!(store.index_counts().await.unwrap(), (1, 1));
        assert!(store.search("fresh").await.unwrap().is_empty());
        // archive and touch leave the index alone
        store.set_archived("http://a.com/x", true).await.unwrap();
        store.get_touch("http://a.com/x").await.unwrap();
        assert_eq!(store.search("first").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_onto_existing_url_conflicts_and_leaves_index() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/x?y=1", "one")).await.unwrap();
        store.insert(&new_article("http://a.com/x", "two")).await.unwrap();
        let err = assert_err!(store.rename("http://a.com/x?y=1", "http://a.com/x").await);
        assert_eq!(err.kind(), "StoreConflict");
        assert_eq!(indexed(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn insert_with_timestamp_preserves_history() {
        let store = setup().await;
        let created = parse_datetime("2019-05-01 12:00:00").unwrap();
        store
            .insert_with_timestamp(&new_article("http://old.com/", "old"), created)
            .await
            .unwrap();
        store.insert(&new_article("http://new.com/", "new")).await.unwrap();

        let got = store.get_plain("http://old.com/").await.unwrap().unwrap();
        assert_eq!(got.created, created);
        let feed = store.list_archive_feed(5).await.unwrap();
        assert_eq!(feed[0].url, "http://new.com/");
        assert_eq!(feed[1].url, "http://old.com/");
    }

    #[tokio::test]
    async fn rebuild_restores_a_damaged_index() {
        let store = setup().await;
        store.insert(&new_article("http://a.com/", "alpha")).await.unwrap();
        store.insert(&new_article("http://b.com/", "beta")).await.unwrap();
        store
            .conn
            .call(|conn| {
                conn.execute("DELETE FROM search_index", [])?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(store.search("alpha").await.unwrap().is_empty());

        assert_eq!(store.rebuild_index().await.unwrap(), 2);
        assert_eq!(store.search("alpha").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn usage_rows_are_appended() {
        let store = setup().await;
        store
            .record_usage(UsageRecord {
                url: "http://a.com/".to_string(),
                length_in: 1000,
                length_out: 200,
                tokens_in: 300,
                tokens_out: 50,
            })
            .await
            .unwrap();
        let rows: i64 = store
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM usage", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn reopening_a_store_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readlater.db");
        let path = path.to_str().unwrap();
        {
            let store = ArticleStore::open(path).await.unwrap();
            store.insert(&new_article("http://a.com/", "persisted")).await.unwrap();
        }
        let store = ArticleStore::open(path).await.unwrap();
        assert_eq!(store.search("persisted").await.unwrap().len(), 1);
        assert_eq!(store.index_counts().await.unwrap(), (1, 1));
    }

    #[tokio::test]
    async fn version_one_store_is_upgraded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
CREATE TABLE metadata (id INTEGER PRIMARY KEY, schemaVersion INTEGER NOT NULL);
INSERT INTO metadata (id, schemaVersion) VALUES (1, 1);
CREATE TABLE articles (
    url TEXT PRIMARY KEY,
    title TEXT,
    contents TEXT,
    unread BOOLEAN NOT NULL DEFAULT 1,
    archived BOOLEAN NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    lastAccess TEXT NOT NULL
);
CREATE VIRTUAL TABLE fts USING fts5(title, contents, content='articles');
CREATE TRIGGER articles_ai AFTER INSERT ON articles BEGIN
    INSERT INTO fts (rowid, title, contents) VALUES (new.rowid, new.title, new.contents);
END;
CREATE TRIGGER articles_ad AFTER DELETE ON articles BEGIN
    INSERT INTO fts (fts, rowid, title, contents) VALUES ('delete', old.rowid, old.title, old.contents);
END;
CREATE TRIGGER articles_au AFTER UPDATE ON articles BEGIN
    INSERT INTO fts (fts, rowid, title, contents) VALUES ('delete', old.rowid, old.title, old.contents);
    INSERT INTO fts (rowid, title, contents) VALUES (new.rowid, new.title, new.contents);
END;
INSERT INTO articles (url, title, contents, created, lastAccess)
    VALUES ('http://a.com/', 'Granola', 'oats and honey', '2021-04-01 08:00:00', '2021-04-01 08:00:00');
INSERT INTO articles (url, title, contents, created, lastAccess)
    VALUES ('http://b.com/', 'Risotto', NULL, '2021-05-01', '2021-05-01');
"#,
            )
            .unwrap();
        }

        let store = ArticleStore::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(store.index_counts().await.unwrap(), (2, 2));
        assert_eq!(store.search("granola").await.unwrap()[0].url, "http://a.com/");
        assert_eq!(store.search("risotto").await.unwrap()[0].url, "http://b.com/");

        let leftovers: i64 = store
            .conn
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'fts' OR type = 'trigger'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(leftovers, 0);

        // Writes no longer go through the dropped triggers
        assert_ok!(store.delete("http://b.com/").await);
        assert_ok!(store.insert(&new_article("http://c.com/", "Polenta")).await);
        assert_eq!(store.index_counts().await.unwrap(), (2, 2));
    }

    #[test]
    fn parses_legacy_and_current_timestamps() {
        assert!(parse_datetime("2016-03-29").is_some());
        assert!(parse_datetime("2016-03-29 10:11:12").is_some());
        assert!(parse_datetime("2016-03-29 10:11:12.345").is_some());
        assert!(parse_datetime("2016-03-29T10:11:12+00:00").is_some());
        assert!(parse_datetime("yesterday").is_none());
        let now = Utc::now();
        assert_eq!(parse_datetime(&format_timestamp(now)), Some(truncate_millis(now)));
    }
}
