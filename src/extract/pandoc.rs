use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};

use super::{Extraction, Extractor};

/// Converts HTML to CommonMark with an external `pandoc` process.
///
/// At most `workers` conversions run at once; further requests wait for a
/// free slot.
pub struct PandocExtractor {
    program: String,
    slots: Arc<Semaphore>,
}

impl PandocExtractor {
    pub fn new(workers: usize) -> Self {
        Self {
            program: "pandoc".to_string(),
            slots: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Extractor for PandocExtractor {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    async fn extract(&self, html: &[u8]) -> Result<Extraction> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|e| AppError::ExtractFailed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(["-f", "html", "-t", "commonmark", "--strip-comments"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ExtractFailed(format!("failed to start {}: {}", self.program, e)))?;

        // Feed stdin from a separate task so a large document cannot
        // deadlock against a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::ExtractFailed("pandoc stdin unavailable".to_string()))?;
        let input = html.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AppError::ExtractFailed(format!("failed to read pandoc output: {}", e)))?;

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AppError::ExtractFailed(format!("failed to write to pandoc stdin: {}", e)))
            }
            Err(e) => return Err(AppError::ExtractFailed(e.to_string())),
        }

        if !output.status.success() {
            return Err(AppError::ExtractFailed(format!(
                "pandoc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(Extraction::text(String::from_utf8_lossy(&output.stdout)))
    }
}
