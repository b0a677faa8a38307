//! Question generation through a generative LLM API.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait defining async LLM interaction
//! - [`GeminiClient`]: calls the Google Gemini `generateContent` endpoint
//! - [`ThrottledAsk`]: decorator that spaces calls out to stay under the
//!   provider's rate limit
//! - [`generate_questions`]: builds the prompt for one passage and parses the
//!   JSON array the model returns
//!
//! Calls are never retried within a run; a failed passage is skipped and the
//! next scheduled run starts over.

use crate::error::SourceError;
use crate::utils::{looks_truncated, strip_code_fences, truncate_for_log};
use rand::{Rng, rng};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors send text to an LLM and return its response. This
/// abstraction allows for different backends, decorators (like
/// [`ThrottledAsk`]) and scripted fakes in tests.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, SourceError>;
}

/// Wrapper that enforces a minimum interval between calls to any
/// [`AskAsync`] implementation.
///
/// The wait before a call is measured from the end of the previous call:
/// ```text
/// next_start >= prev_end + interval + random_jitter(0..=250ms)
/// ```
/// The first call goes out immediately. A zero interval disables the wait.
pub struct ThrottledAsk<T> {
    inner: T,
    interval: Duration,
    last_finished: Mutex<Option<Instant>>,
}

impl<T> ThrottledAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_finished: Mutex::new(None),
        }
    }
}

impl<T> fmt::Debug for ThrottledAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledAsk")
            .field("interval", &self.interval)
            .finish()
    }
}

impl<T> AskAsync for ThrottledAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, SourceError> {
        let mut last = self.last_finished.lock().await;

        if let Some(prev) = *last {
            if !self.interval.is_zero() {
                let jitter_ms: u64 = rng().random_range(0..=250);
                let deadline = prev + self.interval + Duration::from_millis(jitter_ms);
                if deadline > Instant::now() {
                    debug!(wait = ?(deadline - Instant::now()), "Throttling generator call");
                    sleep_until(deadline).await;
                }
            }
        }

        let res = self.inner.ask(text).await;
        *last = Some(Instant::now());
        res
    }
}

/// Client for the Gemini `models/{model}:generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_base: &str, model: &str, api_key: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateContentResponse) -> Result<String, SourceError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(SourceError::EmptyResponse)
    } else {
        Ok(text)
    }
}

impl AskAsync for GeminiClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, SourceError> {
        let t0 = std::time::Instant::now();
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                status = status.as_u16(),
                "Gemini call failed"
            );
            return Err(SourceError::Status {
                service: "gemini",
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Gemini call succeeded");
        response_text(parsed)
    }
}

/// Prompt asking for CAT VARC style questions about one passage.
pub fn build_question_prompt(passage: &str, count: usize) -> String {
    format!(
        r#"You are a CAT (Common Admission Test) exam setter.
Read the following passage and generate {count} high-quality multiple-choice questions based on it.

Passage:
{passage}

The questions must cover these types:
1. Inference based (indirect conclusion)
2. Main Idea / Theme
3. Tone of the author OR Structure of argument

Return the output strictly as a JSON array with this format (no markdown, just raw JSON):
[
    {{
        "question": "Question text here...",
        "options": ["Option A", "Option B", "Option C", "Option D"],
        "correct_index": 0,
        "explanation": "Why A is correct...",
        "question_type": "Inference"
    }}
]"#
    )
}

/// Parse generator output into raw JSON records.
///
/// Accepts a bare array or an object wrapping the array under `questions`,
/// optionally inside Markdown code fences.
pub fn parse_generated_records(text: &str) -> Result<Vec<Value>, SourceError> {
    let cleaned = strip_code_fences(text);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        if looks_truncated(&e) {
            warn!(error = %e, "Generator output looks truncated");
        }
        SourceError::Malformed(format!(
            "{e}; response: {}",
            truncate_for_log(&cleaned, 200)
        ))
    })?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(SourceError::Malformed(
                "expected a JSON array of questions".to_string(),
            )),
        },
        _ => Err(SourceError::Malformed(
            "expected a JSON array of questions".to_string(),
        )),
    }
}

/// Ask the generator for `count` questions about `passage`.
///
/// Returns the raw records; validation happens at the transform boundary.
#[instrument(level = "info", skip_all, fields(passage_words = passage.split_whitespace().count()))]
pub async fn generate_questions<A>(
    asker: &A,
    passage: &str,
    count: usize,
) -> Result<Vec<Value>, SourceError>
where
    A: AskAsync<Response = String>,
{
    let t0 = std::time::Instant::now();
    let prompt = build_question_prompt(passage, count);
    let res = match asker.ask(&prompt).await {
        Ok(text) => parse_generated_records(&text),
        Err(e) => Err(e),
    };
    let dt = t0.elapsed();

    match &res {
        Ok(records) => info!(
            elapsed_ms_total = dt.as_millis() as u64,
            count = records.len(),
            "generate_questions succeeded"
        ),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis() as u64, error = %e, "generate_questions failed")
        }
    }
    res
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Generator fake that replays scripted responses in order.
    #[derive(Default)]
    pub(crate) struct ScriptedAsk {
        responses: StdMutex<VecDeque<Result<String, SourceError>>>,
        pub(crate) prompts: StdMutex<Vec<String>>,
    }

    impl ScriptedAsk {
        pub(crate) fn new(responses: Vec<Result<String, SourceError>>) -> Self {
            Self {
                responses: StdMutex::new(responses.into()),
                prompts: StdMutex::new(Vec::new()),
            }
        }
    }

    impl AskAsync for ScriptedAsk {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, SourceError> {
            self.prompts.lock().unwrap().push(text.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SourceError::EmptyResponse))
        }
    }

    #[test]
    fn test_prompt_mentions_count_and_passage() {
        let prompt = build_question_prompt("The stoics were calm.", 3);
        assert!(prompt.contains("generate 3 high-quality"));
        assert!(prompt.contains("The stoics were calm."));
        assert!(prompt.contains("\"correct_index\": 0"));
    }

    #[test]
    fn test_parse_plain_array() {
        let records = parse_generated_records(r#"[{"question": "Q?"}, {"question": "R?"}]"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_fenced_array() {
        let text = "```json\n[{\"question\": \"Q?\"}]\n```";
        assert_eq!(parse_generated_records(text).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_wrapped_object() {
        let text = r#"{"questions": [{"question": "Q?"}]}"#;
        assert_eq!(parse_generated_records(text).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(
            parse_generated_records(r#""just a string""#),
            Err(SourceError::Malformed(_))
        ));
        assert!(matches!(
            parse_generated_records("[{\"question\": "),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "[1," }, { "text": "2]" }] } }]
        }))
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "[1,2]");
    }

    #[test]
    fn test_response_text_empty() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(matches!(response_text(response), Err(SourceError::EmptyResponse)));
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new(
            reqwest::Client::new(),
            "https://example.test/v1beta/",
            "gemini-1.5-flash",
            "key",
        );
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(!format!("{client:?}").contains("key\""));
    }

    #[tokio::test]
    async fn test_generate_questions_parses_response() {
        let asker = ScriptedAsk::new(vec![Ok(
            r#"[{"question": "Q?", "options": ["a", "b"], "correct_index": 1}]"#.to_string(),
        )]);
        let records = generate_questions(&asker, "Some passage.", 3).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(asker.prompts.lock().unwrap()[0].contains("Some passage."));
    }

    #[tokio::test]
    async fn test_generate_questions_propagates_failure() {
        let asker = ScriptedAsk::new(vec![Err(SourceError::Status {
            service: "gemini",
            status: 429,
            body: "rate limited".to_string(),
        })]);
        let err = generate_questions(&asker, "p", 3).await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_throttle_spaces_calls() {
        let asker = ThrottledAsk::new(
            ScriptedAsk::new(vec![Ok("a".to_string()), Ok("b".to_string())]),
            Duration::from_millis(50),
        );
        let t0 = std::time::Instant::now();
        assert_eq!(asker.ask("1").await.unwrap(), "a");
        assert_eq!(asker.ask("2").await.unwrap(), "b");
        assert!(t0.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_throttle_first_call_is_immediate() {
        let asker = ThrottledAsk::new(
            ScriptedAsk::new(vec![Ok("a".to_string())]),
            Duration::from_secs(60),
        );
        let t0 = std::time::Instant::now();
        asker.ask("1").await.unwrap();
        assert!(t0.elapsed() < Duration::from_secs(5));
    }
}
