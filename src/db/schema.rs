pub const SCHEMA_VERSION: i64 = 2;

pub const METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY,
    schemaVersion INTEGER NOT NULL
);
"#;

/// Index triggers and the external-content index from version 1 stores.
/// The index is now maintained inside each write transaction.
pub const LEGACY_CLEANUP: &str = r#"
DROP TRIGGER IF EXISTS articles_ai;
DROP TRIGGER IF EXISTS articles_ad;
DROP TRIGGER IF EXISTS articles_au;
DROP TABLE IF EXISTS fts;
"#;

pub const SCHEMA: &str = r#"
-- articles table, keyed by canonical URL
CREATE TABLE IF NOT EXISTS articles (
    url TEXT PRIMARY KEY,
    title TEXT,
    contents TEXT,
    unread BOOLEAN NOT NULL DEFAULT 1,
    archived BOOLEAN NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    lastAccess TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_last_access ON articles(lastAccess DESC);
CREATE INDEX IF NOT EXISTS idx_articles_created ON articles(created DESC);

-- usage table (append-only extraction accounting)
CREATE TABLE IF NOT EXISTS usage (
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    url TEXT NOT NULL,
    lengthIn INTEGER NOT NULL,
    lengthOut INTEGER NOT NULL,
    tokensIn INTEGER NOT NULL,
    tokensOut INTEGER NOT NULL
);

-- full-text index, one row per article
CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
    url UNINDEXED,
    title,
    contents,
    prefix='1 2 3',
    tokenize='porter unicode61'
);
"#;

pub const REBUILD_INDEX: &str = r#"
DELETE FROM search_index;
INSERT INTO search_index (url, title, contents)
    SELECT url, title, contents FROM articles;
"#;
