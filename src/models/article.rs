use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored article. `url` is always the canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub url: String,
    pub title: Option<String>,
    pub contents: Option<String>,
    pub unread: bool,
    pub archived: bool,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl Article {
    pub fn has_contents(&self) -> bool {
        self.contents
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// Fields supplied by the caller when inserting; the store fills in the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub url: String,
    pub title: Option<String>,
    pub contents: Option<String>,
}

impl NewArticle {
    /// The in-memory article a caller sees when this insert lost a race.
    pub fn into_article(self, created: DateTime<Utc>) -> Article {
        Article {
            url: self.url,
            title: self.title,
            contents: self.contents,
            unread: true,
            archived: false,
            created,
            last_access: created,
        }
    }
}

/// Listing row returned by recents, archive feed and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub title: Option<String>,
    pub url: String,
    pub has_body: bool,
    pub unread: bool,
    pub archived: bool,
}
