//! Conversion of raw source records into [`ContentItem`]s.
//!
//! Sources hand over untyped JSON payloads. Each payload is classified into
//! one of the known shapes ([`RawShape`]), validated, and only then turned
//! into a content item. Anything that does not fit is a [`TransformError`];
//! the record is dropped and the rest of the batch carries on.

use crate::error::TransformError;
use crate::models::{Answer, ContentItem, ItemMetadata};
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// One untyped record as handed over by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Name of the source that produced the record.
    pub origin: String,
    /// URL or file the record was taken from.
    pub reference: Option<String>,
    /// Passage the record refers to, if any.
    pub passage: Option<String>,
    /// Category to use when the payload does not name one.
    pub category: Option<String>,
    pub payload: Value,
}

impl RawRecord {
    pub fn new(origin: impl Into<String>, payload: Value) -> Self {
        Self {
            origin: origin.into(),
            reference: None,
            passage: None,
            category: None,
            payload,
        }
    }
}

/// The record shapes sources are known to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum RawShape {
    /// Generator output: question, options and the index of the right one.
    MultipleChoice(GeneratedQuestion),
    /// Curated `{q, a}` pair with a free-text answer.
    QuestionAnswer(SimpleQa),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(alias = "correctIndex")]
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, alias = "questionType", alias = "type")]
    pub question_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimpleQa {
    #[serde(alias = "question")]
    pub q: String,
    #[serde(alias = "answer")]
    pub a: AnswerValue,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Free-text answers are often written as bare numbers or booleans.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl AnswerValue {
    fn into_text(self) -> String {
        match self {
            AnswerValue::Text(s) => s,
            AnswerValue::Number(n) => n.to_string(),
            AnswerValue::Bool(b) => b.to_string(),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decide which known shape a payload has.
pub fn classify(payload: &Value) -> Result<RawShape, TransformError> {
    let Value::Object(map) = payload else {
        return Err(TransformError::UnknownShape(format!(
            "expected an object, got {}",
            value_kind(payload)
        )));
    };

    let has = |keys: &[&str]| keys.iter().any(|k| map.contains_key(*k));

    if has(&["options"]) {
        serde_json::from_value(payload.clone())
            .map(RawShape::MultipleChoice)
            .map_err(|e| TransformError::UnknownShape(format!("multiple choice: {e}")))
    } else if has(&["q", "question"]) && has(&["a", "answer"]) {
        serde_json::from_value(payload.clone())
            .map(RawShape::QuestionAnswer)
            .map_err(|e| TransformError::UnknownShape(format!("question/answer: {e}")))
    } else {
        let keys = map.keys().join(", ");
        Err(TransformError::UnknownShape(format!("unrecognized fields [{keys}]")))
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Validate a classified record and convert it into a content item.
pub fn to_item(
    record: &RawRecord,
    id: String,
    generated_at: DateTime<Utc>,
) -> Result<ContentItem, TransformError> {
    let (prompt, answer, explanation, category) = match classify(&record.payload)? {
        RawShape::MultipleChoice(g) => {
            let options: Vec<String> = g.options.iter().map(|o| o.trim().to_string()).collect();
            if options.len() < 2 {
                return Err(TransformError::TooFewOptions(options.len()));
            }
            if options.iter().any(String::is_empty) {
                return Err(TransformError::EmptyAnswer);
            }
            if g.correct_index >= options.len() {
                return Err(TransformError::AnswerOutOfRange {
                    index: g.correct_index,
                    len: options.len(),
                });
            }
            (
                g.question,
                Answer::MultipleChoice {
                    options,
                    correct_index: g.correct_index,
                },
                g.explanation,
                g.question_type,
            )
        }
        RawShape::QuestionAnswer(qa) => {
            let text = qa.a.into_text().trim().to_string();
            if text.is_empty() {
                return Err(TransformError::EmptyAnswer);
            }
            (qa.q, Answer::FreeText { text }, qa.explanation, qa.category)
        }
    };

    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(TransformError::EmptyPrompt);
    }

    Ok(ContentItem {
        id,
        prompt,
        answer,
        explanation: non_empty(explanation),
        passage: non_empty(record.passage.clone()),
        metadata: ItemMetadata {
            category: non_empty(category).or_else(|| record.category.clone()),
            source: record.reference.clone(),
            origin: record.origin.clone(),
            generated_at,
        },
    })
}

/// Result of turning a run's raw records into items.
#[derive(Debug, Default)]
pub struct Assembly {
    pub items: Vec<ContentItem>,
    /// Records dropped because they failed validation.
    pub skipped: usize,
    /// Records dropped because an earlier item asked the same question about
    /// the same passage.
    pub duplicates: usize,
}

/// Convert raw records in order, dropping malformed records and duplicates,
/// and number the survivors `<date>-001`, `<date>-002`, ...
///
/// Two items are duplicates when their prompts match case-insensitively and
/// they refer to the same passage (or both to none). The same question text
/// asked about different passages is kept.
pub fn assemble_items<I>(records: I, date: NaiveDate, generated_at: DateTime<Utc>) -> Assembly
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut skipped = 0;
    let valid: Vec<ContentItem> = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match to_item(&record, String::new(), generated_at) {
            Ok(item) => Some(item),
            Err(e) => {
                skipped += 1;
                warn!(
                    index = i,
                    origin = %record.origin,
                    error = %e,
                    "Skipping malformed record"
                );
                None
            }
        })
        .collect();

    let before_dedupe = valid.len();
    let mut items: Vec<ContentItem> = valid
        .into_iter()
        .unique_by(|item| (item.prompt.to_lowercase(), item.passage.clone()))
        .collect();
    let duplicates = before_dedupe - items.len();
    if duplicates > 0 {
        debug!(duplicates, "Dropped duplicate questions");
    }

    for (n, item) in items.iter_mut().enumerate() {
        item.id = format!("{}-{:03}", date, n + 1);
    }

    info!(
        items = items.len(),
        skipped,
        duplicates,
        "Assembled content items"
    );
    Assembly {
        items,
        skipped,
        duplicates,
    }
}
