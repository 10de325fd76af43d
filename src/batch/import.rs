//! Bulk import of saved-article history from a CSV export with the columns
//! `title,url,time_added,tags,status` (`time_added` in Unix seconds).

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::services::{ArticleService, ImportOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    pub title: String,
    pub url: String,
    pub time_added: DateTime<Utc>,
    pub tags: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Import summary:")?;
        writeln!(f, "  Total records: {}", self.total)?;
        writeln!(f, "  Successfully imported: {}", self.imported)?;
        writeln!(f, "  Skipped (already exist): {}", self.skipped)?;
        write!(f, "  Failed: {}", self.failed)
    }
}

pub fn read_csv_file(path: &Path) -> Result<Vec<CsvRecord>> {
    let file = std::fs::File::open(path)?;
    read_csv(file)
}

/// Parse export rows, skipping (with a warning) rows that are short or
/// carry an unusable timestamp.
pub fn read_csv<R: Read>(input: R) -> Result<Vec<CsvRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        // +2: one for the header, one for 1-based numbering
        let line = i + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping row {}: {}", line, e);
                continue;
            }
        };
        if row.len() < 5 {
            tracing::warn!("Skipping row {}: insufficient columns ({})", line, row.len());
            continue;
        }
        let time_added = row[2]
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        let Some(time_added) = time_added else {
            tracing::warn!("Skipping row {}: invalid timestamp {:?}", line, &row[2]);
            continue;
        };
        records.push(CsvRecord {
            title: row[0].to_string(),
            url: row[1].trim().to_string(),
            time_added,
            tags: row[3].to_string(),
            status: row[4].to_string(),
        });
    }

    Ok(records)
}

/// Import every record in order. A failing record is counted and the run
/// continues. In dry-run mode records are only probed, never fetched.
pub async fn run_import(
    service: &ArticleService,
    records: &[CsvRecord],
    options: ImportOptions,
) -> ImportReport {
    let mut report = ImportReport {
        total: records.len(),
        ..Default::default()
    };

    for (i, record) in records.iter().enumerate() {
        tracing::info!("[{}/{}] Processing: {}", i + 1, report.total, record.url);

        let hint = Some(record.title.as_str()).filter(|t| !t.trim().is_empty());
        let outcome = if options.dry_run {
            service.probe(&record.url).await.map(|found| match found {
                Some(article) => ImportOutcome::AlreadyPresent(article),
                None => ImportOutcome::Imported(
                    crate::models::NewArticle {
                        url: record.url.clone(),
                        title: hint.map(str::to_string),
                        contents: None,
                    }
                    .into_article(record.time_added),
                ),
            })
        } else {
            service.import(&record.url, hint, record.time_added).await
        };

        match outcome {
            Ok(ImportOutcome::Imported(article)) => {
                tracing::info!("  Imported {}", article.url);
                report.imported += 1;
            }
            Ok(ImportOutcome::AlreadyPresent(article)) => {
                tracing::info!("  Already exists as {}, skipping", article.url);
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!("  Failed: {}", e);
                report.failed += 1;
            }
        }

        if !options.delay.is_zero() && i + 1 < records.len() {
            tokio::time::sleep(options.delay).await;
        }
    }

    report
}
