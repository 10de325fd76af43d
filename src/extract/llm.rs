use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::models::TokenUsage;

use super::{Extraction, Extractor};

const MESSAGES_API_URL: &str = "https://api.anthropic.com/v1/messages";
const PREFILL: &str = "# ";
const PROMPT: &str = r#"Task:
Take the attached article in HTML format and extract the article headings and text, formatting the output as Markdown.
The output should be a single Markdown document with the article title as the first heading, followed by the headings and text of the article.
The output should not contain any HTML tags, and should be formatted as follows:
# Article Title
## Heading 1
### Subheading 1.1
## Heading 2
### Subheading 2.1
The output should not contain any additional text or explanations, only the Markdown formatted article.
The input will be a single HTML document, and the output should be a single Markdown document."#;

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Extraction by asking an LLM to rewrite the page as markdown.
pub struct LlmExtractor {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl LlmExtractor {
    pub fn new(api_key: String, config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn build_request(&self, html: &[u8]) -> MessageRequest {
        let document = String::from_utf8_lossy(html);
        MessageRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![
                Message {
                    role: "user",
                    content: format!("{}\n\n<article>\n{}\n</article>", PROMPT, document),
                },
                Message {
                    role: "assistant",
                    content: PREFILL.to_string(),
                },
            ],
        }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(&self, html: &[u8]) -> Result<Extraction> {
        let request = self.build_request(html);

        let response = self
            .client
            .post(MESSAGES_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExtractFailed(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExtractFailed(format!(
                "LLM API error {}: {}",
                status, error_text
            )));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExtractFailed(format!("malformed LLM response: {}", e)))?;
        into_extraction(message)
    }
}

fn into_extraction(message: MessageResponse) -> Result<Extraction> {
    if message.stop_reason.as_deref() != Some("end_turn") {
        return Err(AppError::ExtractFailed(format!(
            "unexpected LLM stop reason: {}",
            message.stop_reason.as_deref().unwrap_or("none")
        )));
    }

    let output = message
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Extraction {
        text: format!("{}{}", PREFILL, output),
        usage: message.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> MessageResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn prefill_is_prepended_and_usage_reported() {
        let extraction = into_extraction(response(
            r#"{"content":[{"type":"text","text":"Banana Bread\n\nMash."}],
                "stop_reason":"end_turn",
                "usage":{"input_tokens":1200,"output_tokens":40}}"#,
        ))
        .unwrap();
        assert_eq!(extraction.text, "# Banana Bread\n\nMash.");
        assert_eq!(
            extraction.usage,
            Some(TokenUsage {
                input_tokens: 1200,
                output_tokens: 40
            })
        );
    }

    #[test]
    fn truncated_output_is_rejected() {
        let err = into_extraction(response(
            r#"{"content":[{"type":"text","text":"Banana"}],"stop_reason":"max_tokens"}"#,
        ))
        .unwrap_err();
        assert_eq!(err.kind(), "ExtractFailed");
    }

    #[test]
    fn request_ends_with_assistant_prefill() {
        let extractor = LlmExtractor::new("key".to_string(), LlmConfig::default()).unwrap();
        let request = extractor.build_request(b"<p>hi</p>");
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("<p>hi</p>"));
        assert_eq!(request.messages[1].role, "assistant");
        assert_eq!(request.messages[1].content, PREFILL);
    }
}
