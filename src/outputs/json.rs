//! JSON data file consumed by the static page.
//!
//! # Atomic replace
//!
//! The batch is serialized in memory, written to a temporary file in the
//! target directory, flushed to disk and then renamed over the previous
//! file. A failure at any step leaves the previous file untouched; the
//! temporary file is removed when dropped.
//!
//! # Schema versions
//!
//! [`read_batch`] accepts the current layout (`schema_version` 2) and the
//! passage-grouped layout written by earlier versions of the pipeline:
//!
//! ```text
//! { "metadata": { "title", "source", "date_scraped" },
//!   "passages": [ { "id", "text", "questions": [...] } ] }
//! ```

use crate::error::{LoadError, PersistError};
use crate::models::{BatchMetadata, ContentBatch, SCHEMA_VERSION};
use crate::sources::aeon;
use crate::transform::{RawRecord, assemble_items};
use crate::utils::ensure_dir;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{error, info, instrument};

/// A serialized batch waiting in a temporary file next to its target.
#[derive(Debug)]
pub struct StagedBatch {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedBatch {
    /// Rename the staged file over the target.
    pub fn commit(self) -> Result<(), PersistError> {
        let target = self.target;
        self.file
            .persist(&target)
            .map(|_| ())
            .map_err(|e| PersistError::Write {
                path: target.clone(),
                source: e.error,
            })
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Write `bytes` into a synced temporary file beside `target`.
pub fn stage_bytes(bytes: &[u8], target: &Path) -> Result<StagedBatch, PersistError> {
    let dir = parent_dir(target);
    let write_err = |source: std::io::Error| PersistError::Write {
        path: target.to_path_buf(),
        source,
    };

    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    // Temp files are created 0600; the page is served by another user.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(write_err)?;
    }
    file.write_all(bytes).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;

    Ok(StagedBatch {
        file,
        target: target.to_path_buf(),
    })
}

/// Persist a [`ContentBatch`], atomically replacing the file at `path`.
///
/// Creates the parent directory if needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), items = batch.items.len()))]
pub async fn write_batch(batch: &ContentBatch, path: &Path) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(batch)?;

    let dir = parent_dir(path).to_path_buf();
    if let Err(source) = ensure_dir(&dir).await {
        error!(dir = %dir.display(), error = %source, "Failed to create output directory");
        return Err(PersistError::Directory { path: dir, source });
    }

    let target = path.to_path_buf();
    let bytes = json.len();
    tokio::task::spawn_blocking(move || stage_bytes(&json, &target)?.commit()).await??;

    info!(bytes, "Wrote data file");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    metadata: LegacyMetadata,
    #[serde(default)]
    passages: Vec<LegacyPassage>,
}

#[derive(Debug, Deserialize)]
struct LegacyMetadata {
    title: Option<String>,
    source: Option<String>,
    date_scraped: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct LegacyPassage {
    text: String,
    #[serde(default)]
    questions: Vec<Value>,
}

impl LegacyDocument {
    fn into_batch(self) -> ContentBatch {
        let date = self.metadata.date_scraped;
        let generated_at = date.and_time(NaiveTime::MIN).and_utc();
        let source = self.metadata.source.clone();

        let records = self.passages.into_iter().flat_map(|passage| {
            let source = source.clone();
            passage.questions.into_iter().map(move |payload| RawRecord {
                reference: source.clone(),
                passage: Some(passage.text.clone()),
                category: Some(aeon::DEFAULT_CATEGORY.to_string()),
                ..RawRecord::new(aeon::SOURCE_NAME, payload)
            })
        });
        let assembly = assemble_items(records, date, generated_at);

        ContentBatch::new(
            BatchMetadata {
                title: self.metadata.title,
                source: self.metadata.source,
                date_scraped: date,
                generated_at,
                sources: vec![aeon::SOURCE_NAME.to_string()],
            },
            assembly.items,
        )
    }
}

/// Parse a data file in any supported schema version.
pub fn parse_batch(text: &str) -> Result<ContentBatch, LoadError> {
    let value: Value = serde_json::from_str(text)?;

    match value.get("schema_version").map(Value::as_u64) {
        Some(Some(v)) if v == u64::from(SCHEMA_VERSION) => Ok(serde_json::from_value(value)?),
        Some(Some(v)) => Err(LoadError::UnsupportedVersion(v)),
        Some(None) => Err(LoadError::UnknownLayout),
        None if value.get("passages").is_some() => {
            let legacy: LegacyDocument = serde_json::from_value(value)?;
            Ok(legacy.into_batch())
        }
        None => Err(LoadError::UnknownLayout),
    }
}

/// Read and parse the data file at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_batch(path: &Path) -> Result<ContentBatch, LoadError> {
    let text = fs::read_to_string(path).await.map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_batch(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, ContentItem, ItemMetadata};
    use chrono::Utc;

    fn batch() -> ContentBatch {
        let generated_at = Utc::now();
        ContentBatch::new(
            BatchMetadata {
                title: Some("How to be a Stoic".to_string()),
                source: Some("https://aeon.co/essays/stoic".to_string()),
                date_scraped: NaiveDate::from_ymd_opt(2025, 5, 6).unwrap(),
                generated_at,
                sources: vec!["aeon".to_string(), "question_file".to_string()],
            },
            vec![
                ContentItem {
                    id: "2025-05-06-001".to_string(),
                    prompt: "What is the main idea?".to_string(),
                    answer: Answer::MultipleChoice {
                        options: vec!["A".to_string(), "B".to_string()],
                        correct_index: 1,
                    },
                    explanation: Some("B sums it up.".to_string()),
                    passage: Some("Passage text.".to_string()),
                    metadata: ItemMetadata {
                        category: Some("Main Idea".to_string()),
                        source: Some("https://aeon.co/essays/stoic".to_string()),
                        origin: "aeon".to_string(),
                        generated_at,
                    },
                },
                ContentItem {
                    id: "2025-05-06-002".to_string(),
                    prompt: "2+2=?".to_string(),
                    answer: Answer::FreeText {
                        text: "4".to_string(),
                    },
                    explanation: None,
                    passage: None,
                    metadata: ItemMetadata {
                        category: None,
                        source: None,
                        origin: "question_file".to_string(),
                        generated_at,
                    },
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public/data.json");
        let original = batch();

        write_batch(&original, &path).await.unwrap();
        let loaded = read_batch(&path).await.unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_write_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "old contents").unwrap();

        write_batch(&batch(), &path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"schema_version\": 2"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_uncommitted_stage_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"previous batch").unwrap();

        let staged = stage_bytes(b"new batch", &path).unwrap();
        drop(staged);

        assert_eq!(std::fs::read(&path).unwrap(), b"previous batch");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file rename.
        let path = dir.path().join("data.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep.txt"), b"keep").unwrap();

        let err = write_batch(&batch(), &path).await.unwrap_err();
        assert!(matches!(err, PersistError::Write { .. }));
        assert_eq!(std::fs::read(path.join("keep.txt")).unwrap(), b"keep");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_parent_is_directory_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = write_batch(&batch(), &blocker.join("data.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Directory { .. }));
        assert_eq!(std::fs::read(&blocker).unwrap(), b"file");
    }

    #[test]
    fn test_parse_legacy_layout() {
        let legacy = r#"{
            "metadata": {
                "title": "How to be a Stoic",
                "source": "https://aeon.co/essays/stoic",
                "date_scraped": "2024-11-02"
            },
            "passages": [
                {
                    "id": 1,
                    "text": "First passage.",
                    "questions": [
                        {"question": "Q1?", "options": ["a", "b", "c", "d"], "correct_index": 3, "explanation": "d"},
                        {"question": "broken"}
                    ]
                },
                { "id": 2, "text": "Second passage.", "questions": [] }
            ]
        }"#;

        let batch = parse_batch(legacy).unwrap();
        assert_eq!(batch.schema_version, SCHEMA_VERSION);
        assert_eq!(batch.metadata.title.as_deref(), Some("How to be a Stoic"));
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].id, "2024-11-02-001");
        assert_eq!(batch.items[0].passage.as_deref(), Some("First passage."));
        assert_eq!(batch.items[0].answer_text(), "d");
        assert_eq!(
            batch.items[0].metadata.category.as_deref(),
            Some("Reading Comprehension")
        );
    }

    #[test]
    fn test_parse_legacy_keeps_shared_question_per_passage() {
        let legacy = r#"{
            "metadata": { "title": "T", "source": null, "date_scraped": "2024-11-02" },
            "passages": [
                {
                    "text": "First passage.",
                    "questions": [
                        {"question": "What is the main idea of the passage?", "options": ["a", "b"], "correct_index": 0}
                    ]
                },
                {
                    "text": "Second passage.",
                    "questions": [
                        {"question": "What is the main idea of the passage?", "options": ["c", "d"], "correct_index": 1}
                    ]
                }
            ]
        }"#;

        let batch = parse_batch(legacy).unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.items[0].passage.as_deref(), Some("First passage."));
        assert_eq!(batch.items[1].passage.as_deref(), Some("Second passage."));
        assert_eq!(batch.items[1].answer_text(), "d");
        assert_eq!(batch.items[1].id, "2024-11-02-002");
    }

    #[test]
    fn test_parse_rejects_unknown_versions_and_layouts() {
        assert!(matches!(
            parse_batch(r#"{"schema_version": 99, "items": []}"#),
            Err(LoadError::UnsupportedVersion(99))
        ));
        assert!(matches!(
            parse_batch(r#"{"items": []}"#),
            Err(LoadError::UnknownLayout)
        ));
        assert!(matches!(parse_batch("{"), Err(LoadError::Parse(_))));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_batch(Path::new("/no/such/data.json")).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
