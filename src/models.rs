//! Data models for the persisted content batch.
//!
//! This module defines the structures the static page reads:
//! - [`ContentBatch`]: everything one run produced, the unit of persistence
//! - [`BatchMetadata`]: where the batch came from and when
//! - [`ContentItem`]: one self-contained question record
//! - [`Answer`]: a multiple-choice key or a free-text answer
//!
//! Every item carries its own passage and metadata, so the page can render
//! any item without looking at its neighbours.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Version written into every batch produced by this crate.
///
/// Version 1 is the passage-grouped layout of the old scraper script; it is
/// still accepted by [`crate::outputs::json::read_batch`].
pub const SCHEMA_VERSION: u32 = 2;

/// The full ordered set of items produced by one run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentBatch {
    pub schema_version: u32,
    pub metadata: BatchMetadata,
    pub items: Vec<ContentItem>,
}

impl ContentBatch {
    pub fn new(metadata: BatchMetadata, items: Vec<ContentItem>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            metadata,
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Batch-level provenance, shown in the page header.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchMetadata {
    /// Title of the essay the passages were taken from, if any.
    pub title: Option<String>,
    /// URL of that essay.
    pub source: Option<String>,
    /// Local date of the run in `YYYY-MM-DD` format.
    pub date_scraped: NaiveDate,
    /// Exact time the batch was assembled.
    pub generated_at: DateTime<Utc>,
    /// Names of the sources that contributed to this run.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// One independently renderable question record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentItem {
    /// Unique within the batch; assigned fresh on every run.
    pub id: String,
    /// The question text.
    pub prompt: String,
    pub answer: Answer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Reading passage the question refers to, embedded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
    pub metadata: ItemMetadata,
}

impl ContentItem {
    /// The answer as display text: the correct option or the free-text answer.
    pub fn answer_text(&self) -> &str {
        match &self.answer {
            Answer::MultipleChoice {
                options,
                correct_index,
            } => options
                .get(*correct_index)
                .map(String::as_str)
                .unwrap_or_default(),
            Answer::FreeText { text } => text,
        }
    }
}

/// Answer key of a [`ContentItem`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    MultipleChoice {
        options: Vec<String>,
        correct_index: usize,
    },
    FreeText {
        text: String,
    },
}

/// Per-item provenance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ItemMetadata {
    /// Question type, e.g. "Inference" or "Main Idea".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// URL or file the raw material came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Name of the source that produced the record.
    pub origin: String,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(answer: Answer) -> ContentItem {
        ContentItem {
            id: "2025-05-06-001".to_string(),
            prompt: "What is the author's tone?".to_string(),
            answer,
            explanation: None,
            passage: Some("A passage.".to_string()),
            metadata: ItemMetadata {
                category: Some("Tone".to_string()),
                source: Some("https://aeon.co/essays/example".to_string()),
                origin: "aeon".to_string(),
                generated_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_answer_text_multiple_choice() {
        let item = sample_item(Answer::MultipleChoice {
            options: vec!["Wry".to_string(), "Earnest".to_string()],
            correct_index: 1,
        });
        assert_eq!(item.answer_text(), "Earnest");
    }

    #[test]
    fn test_answer_text_free_text() {
        let item = sample_item(Answer::FreeText {
            text: "4".to_string(),
        });
        assert_eq!(item.answer_text(), "4");
    }

    #[test]
    fn test_answer_serialization_is_tagged() {
        let answer = Answer::MultipleChoice {
            options: vec!["A".to_string(), "B".to_string()],
            correct_index: 0,
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["kind"], "multiple_choice");
        assert_eq!(json["correct_index"], 0);

        let free = serde_json::to_value(Answer::FreeText {
            text: "4".to_string(),
        })
        .unwrap();
        assert_eq!(free["kind"], "free_text");
        assert_eq!(free["text"], "4");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let mut item = sample_item(Answer::FreeText {
            text: "4".to_string(),
        });
        item.passage = None;
        item.metadata.category = None;
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("passage"));
        assert!(!json.contains("category"));
        assert!(!json.contains("explanation"));
    }

    #[test]
    fn test_batch_new_stamps_schema_version() {
        let batch = ContentBatch::new(
            BatchMetadata {
                title: None,
                source: None,
                date_scraped: NaiveDate::from_ymd_opt(2025, 5, 6).unwrap(),
                generated_at: Utc::now(),
                sources: vec![],
            },
            vec![],
        );
        assert_eq!(batch.schema_version, SCHEMA_VERSION);
        assert!(batch.is_empty());
    }
}
