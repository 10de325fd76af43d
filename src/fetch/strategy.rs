use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{AppError, Result};

const PLAIN_USER_AGENT: &str = concat!("readlater/", env!("CARGO_PKG_VERSION"));
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; CrOS x86_64 14541.0.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

/// Raw page bytes and the URL reached after following redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub final_url: String,
}

/// One way of retrieving a page. Strategies are tried in order by
/// [`FetchOrchestrator`](super::FetchOrchestrator).
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Plain request identifying as this program
    Plain,
    /// Request with a desktop browser identity, for sites with basic bot filters
    Spoof,
    /// External `curl` process
    Curl,
}

impl StrategyKind {
    pub fn build(self, timeout: Duration) -> Result<Box<dyn FetchStrategy>> {
        Ok(match self {
            StrategyKind::Plain => Box::new(HttpStrategy::plain(timeout)?),
            StrategyKind::Spoof => Box::new(HttpStrategy::spoofed(timeout)?),
            StrategyKind::Curl => Box::new(CurlStrategy::new(timeout)),
        })
    }
}

pub struct HttpStrategy {
    name: &'static str,
    client: Client,
}

impl HttpStrategy {
    pub fn plain(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(PLAIN_USER_AGENT)
            .build()?;
        Ok(Self {
            name: "plain",
            client,
        })
    }

    pub fn spoofed(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            name: "spoof",
            client,
        })
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            for (name, value) in response.headers() {
                tracing::debug!("    {}: {:?}", name, value);
            }
            return Err(AppError::HttpStatus {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?.to_vec();
        Ok(FetchedPage { body, final_url })
    }
}

/// Retrieval through an external `curl` process, which gets past some
/// TLS fingerprinting that blocks the built-in client.
pub struct CurlStrategy {
    program: String,
    timeout: Duration,
}

impl CurlStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "curl".to_string(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl FetchStrategy for CurlStrategy {
    fn name(&self) -> &'static str {
        "curl"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let output = Command::new(&self.program)
            .args(["--fail", "--location", "--silent", "--show-error", "--compressed"])
            .arg("--max-time")
            .arg(self.timeout.as_secs().max(1).to_string())
            .args(["--write-out", "\n%{url_effective}"])
            .arg("--")
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Subprocess(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(split_write_out(output.stdout, url))
    }
}

/// Separate the body from the effective URL that `--write-out` appends
/// after a final newline.
fn split_write_out(mut stdout: Vec<u8>, requested: &str) -> FetchedPage {
    match stdout.iter().rposition(|&b| b == b'\n') {
        Some(pos) => {
            let final_url = String::from_utf8_lossy(&stdout[pos + 1..]).trim().to_string();
            stdout.truncate(pos);
            FetchedPage {
                body: stdout,
                final_url: if final_url.is_empty() {
                    requested.to_string()
                } else {
                    final_url
                },
            }
        }
        None => FetchedPage {
            body: stdout,
            final_url: requested.to_string(),
        },
    }
}
