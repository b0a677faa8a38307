//! Run configuration.
//!
//! A [`ProducerConfig`] is resolved once in `main` from built-in defaults, an
//! optional YAML file and CLI flags (in increasing precedence), then passed
//! by reference into every stage of the run.
//!
//! ```yaml
//! output: public/data.json
//! aeon:
//!   max_passages: 4
//! gemini:
//!   model: gemini-1.5-flash
//!   request_interval_ms: 4000
//! question_files:
//!   - curated/warmups.json
//! ```

use crate::cli::ProduceArgs;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OUTPUT: &str = "data.json";
pub const AEON_FEED_URL: &str = "https://aeon.co/feed.rss";
pub const AEON_ESSAYS_URL: &str = "https://aeon.co/essays";
pub const AEON_FALLBACK_ESSAY_URL: &str =
    "https://aeon.co/essays/how-to-be-a-stoic-when-you-don-t-know-how";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProducerConfig {
    /// Where the batch is persisted.
    pub output: PathBuf,
    /// Persist a batch even when no item survived.
    pub allow_empty: bool,
    pub http: HttpConfig,
    pub aeon: AeonConfig,
    pub gemini: GeminiConfig,
    /// Curated local question files, harvested after the essay source.
    pub question_files: Vec<PathBuf>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            allow_empty: false,
            http: HttpConfig::default(),
            aeon: AeonConfig::default(),
            gemini: GeminiConfig::default(),
            question_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AeonConfig {
    pub enabled: bool,
    /// Skip discovery and scrape this essay.
    pub essay_url: Option<String>,
    pub feed_url: String,
    pub index_url: String,
    pub fallback_url: String,
    /// Paragraphs with this many words or fewer are dropped.
    pub min_paragraph_words: usize,
    /// Soft upper bound on words per passage.
    pub chunk_words: usize,
    /// A passage is only closed once it holds more than this many words.
    pub min_chunk_words: usize,
    pub max_passages: Option<usize>,
}

impl Default for AeonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            essay_url: None,
            feed_url: AEON_FEED_URL.to_string(),
            index_url: AEON_ESSAYS_URL.to_string(),
            fallback_url: AEON_FALLBACK_ESSAY_URL.to_string(),
            min_paragraph_words: 25,
            chunk_words: 600,
            min_chunk_words: 350,
            max_passages: None,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub questions_per_passage: usize,
    /// Minimum spacing between two generator calls.
    pub request_interval_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: GEMINI_API_BASE.to_string(),
            model: GEMINI_MODEL.to_string(),
            questions_per_passage: 3,
            request_interval_ms: 4000,
        }
    }
}

impl GeminiConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("questions_per_passage", &self.questions_per_passage)
            .field("request_interval_ms", &self.request_interval_ms)
            .finish()
    }
}

impl ProducerConfig {
    /// Parse a YAML config document. Missing fields keep their defaults.
    pub fn from_yaml(text: &str, path: &std::path::Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the run configuration from CLI arguments, reading the config
    /// file they point at, if any.
    pub fn resolve(args: &ProduceArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                Self::from_yaml(&text, path)?
            }
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &ProduceArgs) {
        if let Some(output) = &args.output {
            self.output = output.clone();
        }
        if args.allow_empty {
            self.allow_empty = true;
        }
        if args.no_aeon {
            self.aeon.enabled = false;
        }
        if let Some(url) = &args.essay_url {
            self.aeon.essay_url = Some(url.clone());
        }
        if let Some(max) = args.max_passages {
            self.aeon.max_passages = Some(max);
        }
        if let Some(key) = &args.gemini_api_key {
            self.gemini.api_key = Some(key.clone());
        }
        if let Some(model) = &args.model {
            self.gemini.model = model.clone();
        }
        if let Some(ms) = args.request_interval_ms {
            self.gemini.request_interval_ms = ms;
        }
        self.question_files.extend(args.questions_file.iter().cloned());
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini.questions_per_passage == 0 {
            return Err(ConfigError::Invalid(
                "gemini.questions_per_passage must be at least 1".to_string(),
            ));
        }
        if self.aeon.chunk_words == 0 {
            return Err(ConfigError::Invalid(
                "aeon.chunk_words must be at least 1".to_string(),
            ));
        }
        if self.aeon.min_chunk_words >= self.aeon.chunk_words {
            return Err(ConfigError::Invalid(format!(
                "aeon.min_chunk_words ({}) must be below aeon.chunk_words ({})",
                self.aeon.min_chunk_words, self.aeon.chunk_words
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output path is empty".to_string()));
        }
        Ok(())
    }
}
