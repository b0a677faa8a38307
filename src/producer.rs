//! The content run: harvest, transform, assemble, persist.
//!
//! Sources are harvested concurrently and fail independently. A failing
//! source is logged and left out (best effort); the run only aborts when
//! every source failed, when nothing survived the transform step (unless
//! `allow_empty` is set), or when the final write fails. In every abort case
//! the previously persisted file is left exactly as it was.

use crate::config::ProducerConfig;
use crate::error::ProduceError;
use crate::models::{BatchMetadata, ContentBatch};
use crate::outputs::json;
use crate::sources::Source;
use crate::transform::assemble_items;
use chrono::{Local, Utc};
use futures::future::join_all;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Summary of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub output: PathBuf,
    pub items: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed_sources: Vec<String>,
}

/// Produce a fresh batch from `sources` and persist it to `config.output`.
#[instrument(level = "info", skip_all, fields(output = %config.output.display(), sources = sources.len()))]
pub async fn produce_batch(
    config: &ProducerConfig,
    sources: &[Box<dyn Source>],
) -> Result<RunReport, ProduceError> {
    if sources.is_empty() {
        error!("No sources configured");
        return Err(ProduceError::NoSources);
    }

    let results = join_all(sources.iter().map(|source| async move {
        (source.name().to_string(), source.harvest().await)
    }))
    .await;

    let mut title = None;
    let mut reference = None;
    let mut succeeded = Vec::new();
    let mut failed_sources = Vec::new();
    let mut records = Vec::new();

    for (name, result) in results {
        match result {
            Ok(harvest) => {
                info!(source = %name, records = harvest.records.len(), "Source harvested");
                if title.is_none() {
                    title = harvest.title;
                }
                if reference.is_none() {
                    reference = harvest.reference;
                }
                records.extend(harvest.records);
                succeeded.push(name);
            }
            Err(e) => {
                error!(source = %name, error = %e, "Source failed; continuing without it");
                failed_sources.push(name);
            }
        }
    }

    if succeeded.is_empty() {
        return Err(ProduceError::AllSourcesFailed(failed_sources.len()));
    }

    let generated_at = Utc::now();
    let date_scraped = Local::now().date_naive();
    let assembly = assemble_items(records, date_scraped, generated_at);

    if assembly.items.is_empty() {
        if config.allow_empty {
            warn!("No items survived; persisting an empty batch as configured");
        } else {
            error!("No items survived; keeping the previous batch");
            return Err(ProduceError::EmptyBatch);
        }
    }

    let batch = ContentBatch::new(
        BatchMetadata {
            title,
            source: reference,
            date_scraped,
            generated_at,
            sources: succeeded,
        },
        assembly.items,
    );
    json::write_batch(&batch, &config.output).await?;

    Ok(RunReport {
        output: config.output.clone(),
        items: batch.items.len(),
        skipped: assembly.skipped,
        duplicates: assembly.duplicates,
        failed_sources,
    })
}
