//! Content sources feeding a run.
//!
//! Every source implements [`Source`]: it is harvested once per run and hands
//! back untyped [`RawRecord`]s plus optional batch-level provenance. Sources
//! fail independently; the producer logs a failing source and carries on
//! with the others.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Aeon essays | [`aeon`] | RSS + HTML scraping, Gemini generation | Needs `GEMINI_API_KEY` |
//! | Question files | [`question_file`] | Local JSON | Curated `{q, a}` or multiple-choice records |

pub mod aeon;
pub mod question_file;

use crate::api::{GeminiClient, ThrottledAsk};
use crate::config::ProducerConfig;
use crate::error::SourceError;
use crate::transform::RawRecord;
use async_trait::async_trait;
use tracing::{info, warn};

/// Raw material returned by one source.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Title of the work the records are about (e.g. the essay title).
    pub title: Option<String>,
    /// URL of that work.
    pub reference: Option<String>,
    pub records: Vec<RawRecord>,
}

/// An external data source harvested once per run.
#[async_trait(?Send)]
pub trait Source {
    /// Short name used in logs and item metadata.
    fn name(&self) -> &str;

    /// Fetch everything this source has to offer for today's run.
    async fn harvest(&self) -> Result<Harvest, SourceError>;
}

/// Shared HTTP client for scraping and generation.
pub fn http_client(config: &ProducerConfig) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(config.http.user_agent.clone())
        .timeout(config.http.timeout())
        .build()?)
}

/// Build the sources enabled by `config`, in harvest order.
pub fn build_sources(config: &ProducerConfig) -> Result<Vec<Box<dyn Source>>, SourceError> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();

    if config.aeon.enabled {
        match config.gemini.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let http = http_client(config)?;
                let gemini =
                    GeminiClient::new(http.clone(), &config.gemini.api_base, &config.gemini.model, key);
                let asker = ThrottledAsk::new(gemini, config.gemini.request_interval());
                sources.push(Box::new(aeon::AeonSource::new(
                    http,
                    config.aeon.clone(),
                    config.gemini.questions_per_passage,
                    asker,
                )));
            }
            None => warn!("No Gemini API key found; the Aeon essay source is disabled"),
        }
    }

    for path in &config.question_files {
        sources.push(Box::new(question_file::QuestionFileSource::new(path.clone())));
    }

    info!(
        count = sources.len(),
        names = ?sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "Configured sources"
    );
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_no_api_key_disables_aeon() {
        let mut config = ProducerConfig::default();
        config.gemini.api_key = None;
        config.question_files = vec![PathBuf::from("curated.json")];

        let sources = build_sources(&config).unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["question_file"]);
    }

    #[test]
    fn test_sources_in_harvest_order() {
        let mut config = ProducerConfig::default();
        config.gemini.api_key = Some("key".to_string());
        config.question_files = vec![PathBuf::from("a.json"), PathBuf::from("b.json")];

        let sources = build_sources(&config).unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["aeon", "question_file", "question_file"]);
    }

    #[test]
    fn test_aeon_can_be_disabled() {
        let mut config = ProducerConfig::default();
        config.gemini.api_key = Some("key".to_string());
        config.aeon.enabled = false;
        assert!(build_sources(&config).unwrap().is_empty());
    }
}
