use async_trait::async_trait;

use crate::error::{AppError, Result};

use super::{Extraction, Extractor};

/// In-process HTML to text conversion with `html2text`.
pub struct HtmlTextExtractor {
    width: usize,
}

impl HtmlTextExtractor {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    fn convert(&self, html: &[u8]) -> Result<String> {
        let text = html2text::from_read(html, self.width)
            .map_err(|e| AppError::ExtractFailed(format!("failed to convert HTML to text: {}", e)))?;

        // Drop trailing spaces and collapse runs of blank lines
        let mut cleaned = String::with_capacity(text.len());
        let mut blank_run = 0;
        for line in text.lines().map(str::trim_end) {
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            cleaned.push_str(line);
            cleaned.push('\n');
        }
        Ok(cleaned.trim().to_string())
    }
}

impl Default for HtmlTextExtractor {
    fn default() -> Self {
        Self::new(80)
    }
}

#[async_trait]
impl Extractor for HtmlTextExtractor {
    fn name(&self) -> &'static str {
        "html2text"
    }

    async fn extract(&self, html: &[u8]) -> Result<Extraction> {
        let text = self.convert(html)?;
        if text.is_empty() {
            return Err(AppError::ExtractFailed("no text content in page".to_string()));
        }
        Ok(Extraction::text(text))
    }
}
