use url::Url;

use crate::error::{AppError, Result};

/// Normalize a URL to the store's key form: parsed, query string and
/// fragment removed, re-serialized.
///
/// Every write path and the reconciler compare articles through this
/// function only.
pub fn canonicalize(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| AppError::invalid_url(raw, e))?;
    if url.cannot_be_a_base() {
        return Err(AppError::invalid_url(raw, "not a hierarchical URL"));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.into())
}

/// Like [`canonicalize`], but keeps the input when it cannot be parsed.
pub fn canonicalize_or_keep(raw: &str) -> String {
    match canonicalize(raw) {
        Ok(canonical) => canonical,
        Err(e) => {
            tracing::warn!("Keeping non-canonical URL {}: {}", raw, e);
            raw.to_string()
        }
    }
}
