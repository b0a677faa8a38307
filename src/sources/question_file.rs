//! Curated questions from a local JSON file.
//!
//! The file holds either a bare array of records or an object with a
//! `questions` array. Individual records are not checked here; malformed
//! ones are dropped later at the transform boundary.
//!
//! ```json
//! [
//!   { "q": "2+2=?", "a": "4" },
//!   { "question": "Pick the odd one out", "options": ["a", "b", "7"], "correct_index": 2 }
//! ]
//! ```

use crate::error::SourceError;
use crate::sources::{Harvest, Source};
use crate::transform::RawRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

pub const SOURCE_NAME: &str = "question_file";

#[derive(Debug)]
pub struct QuestionFileSource {
    path: PathBuf,
}

impl QuestionFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

/// Pull the record list out of a question file document.
fn records_of(document: Value) -> Result<Vec<Value>, SourceError> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(SourceError::Malformed(
                "expected an array or an object with a `questions` array".to_string(),
            )),
        },
        _ => Err(SourceError::Malformed(
            "expected an array or an object with a `questions` array".to_string(),
        )),
    }
}

#[async_trait(?Send)]
impl Source for QuestionFileSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn harvest(&self) -> Result<Harvest, SourceError> {
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let document: Value =
            serde_json::from_str(&text).map_err(|e| SourceError::Malformed(e.to_string()))?;
        let reference = self.path.display().to_string();

        let records: Vec<RawRecord> = records_of(document)?
            .into_iter()
            .map(|payload| RawRecord {
                reference: Some(reference.clone()),
                ..RawRecord::new(SOURCE_NAME, payload)
            })
            .collect();

        info!(count = records.len(), "Read question file");
        Ok(Harvest {
            title: None,
            reference: None,
            records,
        })
    }
}
