//! Content extraction: turning fetched HTML into markdown-like text.

mod html_text;
mod llm;
mod pandoc;
mod title;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::TokenUsage;

pub use html_text::HtmlTextExtractor;
pub use llm::LlmExtractor;
pub use pandoc::PandocExtractor;
pub use title::{derive_title, html_title};

/// Extracted text plus whatever usage the extractor wants accounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Extraction {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, html: &[u8]) -> Result<Extraction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Pandoc,
    Html2text,
    Llm,
}

/// Build the extractor selected by the configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn Extractor>> {
    Ok(match config.extractor {
        ExtractorKind::Pandoc => Arc::new(PandocExtractor::new(config.extract_workers)),
        ExtractorKind::Html2text => Arc::new(HtmlTextExtractor::default()),
        ExtractorKind::Llm => {
            let api_key = config.llm.api_key.clone().ok_or_else(|| {
                AppError::Config("extractor = \"llm\" requires llm.api_key".to_string())
            })?;
            Arc::new(LlmExtractor::new(api_key, config.llm.clone())?)
        }
    })
}
