//! Batch import driver.
//!
//! Feeds validated records to a [`BatchImporter`] in fixed-size chunks, one
//! chunk at a time, with a pause between chunks. The first failing or
//! rejected chunk stops the import. Chunks committed before it stay
//! committed; the error reports how many records that covers.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollbook::import::{import_in_batches, HttpImporter, ImportOptions};
//!
//! let mut importer = HttpImporter::new("https://sis.example.com/api/students/bulk");
//! let summary = import_in_batches(records, &mut importer, &ImportOptions::default(), |p| {
//!     println!("{}%", p.percent());
//! })
//! .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::api::logs::{log_error, log_info, log_progress, log_success};
use crate::error::{ImportBatchError, ImportError, ImportResult};
use crate::models::CandidateRecord;

/// Default number of records per chunk
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between chunks in milliseconds
pub const DEFAULT_BATCH_DELAY_MS: u64 = 250;

/// Persists one chunk of records.
///
/// `Ok(true)` commits the chunk, `Ok(false)` rejects it, `Err` is a failure.
/// Either of the last two stops the import.
pub trait BatchImporter {
    fn import_batch(
        &mut self,
        records: Vec<CandidateRecord>,
    ) -> impl Future<Output = Result<bool, ImportBatchError>> + Send;
}

/// Options for the import driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Records per chunk (must be at least 1)
    pub batch_size: usize,

    /// Pause between chunks, not applied after the last one
    pub delay: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
        }
    }
}

/// Progress after a committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub completed_chunks: usize,
    pub total_chunks: usize,
    pub imported_records: usize,
}

impl ImportProgress {
    /// Completed share in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        self.completed_chunks as f64 / self.total_chunks as f64
    }

    /// Completed share in percent, rounded to the nearest integer.
    pub fn percent(&self) -> u8 {
        if self.total_chunks == 0 {
            return 100;
        }
        let rounded = (self.completed_chunks * 100 + self.total_chunks / 2) / self.total_chunks;
        rounded.min(100) as u8
    }
}

/// Outcome of a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_records: usize,
    pub imported_records: usize,
    pub batches: usize,
}

/// Import `records` chunk by chunk, strictly sequentially.
///
/// `on_progress` is called after every committed chunk. With no records
/// the importer is never called.
pub async fn import_in_batches<I, F>(
    records: Vec<CandidateRecord>,
    importer: &mut I,
    options: &ImportOptions,
    mut on_progress: F,
) -> ImportResult<ImportSummary>
where
    I: BatchImporter,
    F: FnMut(ImportProgress),
{
    if options.batch_size == 0 {
        return Err(ImportError::InvalidBatchSize);
    }

    let total_records = records.len();
    if total_records == 0 {
        log_info("📦 Nothing to import");
        return Ok(ImportSummary::default());
    }

    let total_chunks = total_records.div_ceil(options.batch_size);
    log_info(format!(
        "📦 Importing {} records in {} batches of up to {}...",
        total_records, total_chunks, options.batch_size
    ));

    let mut imported = 0;
    let mut remaining = records.into_iter();

    for index in 0..total_chunks {
        let batch = index + 1;
        let chunk: Vec<CandidateRecord> = remaining.by_ref().take(options.batch_size).collect();
        let size = chunk.len();

        match importer.import_batch(chunk).await {
            Ok(true) => {}
            Ok(false) => {
                log_error(format!("Batch {}/{} rejected by the importer", batch, total_chunks));
                return Err(ImportError::Rejected {
                    batch,
                    total_batches: total_chunks,
                    imported,
                });
            }
            Err(source) => {
                log_error(format!("Batch {}/{} failed: {}", batch, total_chunks, source));
                return Err(ImportError::Batch {
                    batch,
                    total_batches: total_chunks,
                    imported,
                    source,
                });
            }
        }

        imported += size;
        let progress = ImportProgress {
            completed_chunks: batch,
            total_chunks,
            imported_records: imported,
        };
        log_progress(
            format!("Batch {}/{} imported ({} records)", batch, total_chunks, imported),
            progress.percent(),
        );
        on_progress(progress);

        if batch < total_chunks && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
    }

    log_success(format!("Imported {} records", imported));
    Ok(ImportSummary {
        total_records,
        imported_records: imported,
        batches: total_chunks,
    })
}

// =============================================================================
// HTTP importer
// =============================================================================

#[derive(Serialize)]
struct ImportRequest<'a> {
    records: &'a [CandidateRecord],
}

#[derive(Deserialize)]
struct ImportResponse {
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

/// Posts each chunk as `{ "records": [...] }` to an HTTP endpoint.
///
/// A 2xx answer commits the chunk unless its body is `{ "success": false }`.
#[derive(Clone)]
pub struct HttpImporter {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImporter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl BatchImporter for HttpImporter {
    async fn import_batch(&mut self, records: Vec<CandidateRecord>) -> Result<bool, ImportBatchError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&ImportRequest { records: &records });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ImportBatchError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ImportBatchError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ImportBatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(parse_success(&body))
    }
}

/// Empty or non-JSON bodies count as success.
fn parse_success(body: &str) -> bool {
    if body.trim().is_empty() {
        return true;
    }
    serde_json::from_str::<ImportResponse>(body)
        .map(|r| r.success)
        .unwrap_or(true)
}
