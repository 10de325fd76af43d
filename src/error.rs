use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to retrieve {url} after {attempts} attempt(s): {last}")]
    FetchFailed {
        url: String,
        attempts: usize,
        #[source]
        last: Box<AppError>,
    },

    #[error("content extraction failed: {0}")]
    ExtractFailed(String),

    #[error("article already stored under {0}")]
    StoreConflict(String),

    #[error("article not found: {0}")]
    NotFound(String),

    #[error("invalid search query {query:?}: {reason}")]
    SearchQueryInvalid { query: String, reason: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable, machine-readable name of the error kind, used by the HTTP
    /// layer and in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidUrl { .. } => "InvalidURL",
            AppError::FetchFailed { .. } => "FetchFailed",
            AppError::ExtractFailed(_) => "ExtractFailed",
            AppError::StoreConflict(_) => "StoreConflict",
            AppError::NotFound(_) => "NotFound",
            AppError::SearchQueryInvalid { .. } => "SearchQueryInvalid",
            AppError::HttpStatus { .. }
            | AppError::Timeout(_)
            | AppError::Subprocess(_)
            | AppError::Http(_) => "Retrieval",
            AppError::Database(_) | AppError::Connection(_) => "Store",
            AppError::Io(_) => "Io",
            AppError::Json(_) | AppError::Csv(_) => "Decode",
            AppError::ConfigParse(_) | AppError::Config(_) => "Config",
        }
    }

    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        AppError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the error is a unique-key violation reported by SQLite.
    pub(crate) fn is_constraint_violation(&self) -> bool {
        let sqlite_error = match self {
            AppError::Database(e) => Some(e),
            AppError::Connection(tokio_rusqlite::Error::Rusqlite(e)) => Some(e),
            _ => None,
        };
        matches!(
            sqlite_error,
            Some(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failed_keeps_last_cause() {
        let err = AppError::FetchFailed {
            url: "https://example.com/a".to_string(),
            attempts: 3,
            last: Box::new(AppError::HttpStatus {
                url: "https://example.com/a".to_string(),
                status: 403,
            }),
        };
        assert_eq!(err.kind(), "FetchFailed");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("HTTP 403 from https://example.com/a"));
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AppError::invalid_url("x", "bad").kind(), "InvalidURL");
        assert_eq!(AppError::NotFound("u".into()).kind(), "NotFound");
        assert_eq!(AppError::StoreConflict("u".into()).kind(), "StoreConflict");
    }
}
