//! Aeon essay source.
//!
//! Picks the latest essay from [Aeon](https://aeon.co), splits its body into
//! reading passages and asks the question generator for CAT VARC style
//! multiple-choice questions about each passage.
//!
//! # Essay discovery
//!
//! 1. A configured `essay_url`, if set
//! 2. The first `/essays/` item of the RSS feed
//! 3. The first `/essays/<slug>` link on the essays index page
//! 4. A fixed fallback essay
//!
//! Discovery never fails the source; only fetching the chosen essay can.

use crate::api::{AskAsync, generate_questions};
use crate::config::AeonConfig;
use crate::error::SourceError;
use crate::sources::{Harvest, Source};
use crate::transform::RawRecord;
use crate::utils::{chunk_paragraphs, normalize_whitespace, word_count};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const SOURCE_NAME: &str = "aeon";
pub const DEFAULT_CATEGORY: &str = "Reading Comprehension";
const UNKNOWN_TITLE: &str = "Unknown Title";

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static ARTICLE_BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("div.article__body").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Title and body paragraphs of a scraped essay.
#[derive(Debug, Clone, PartialEq)]
pub struct Essay {
    pub title: String,
    pub paragraphs: Vec<String>,
}

/// Link of the first essay item in an RSS feed.
pub fn latest_essay_from_feed(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut in_item = false;
    let mut in_link = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" => in_item = true,
                b"link" if in_item => in_link = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" => in_item = false,
                b"link" => in_link = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_link => {
                let link = std::str::from_utf8(&t).ok()?.trim().to_string();
                if is_essay_url(&link) {
                    return Some(link);
                }
            }
            Ok(Event::CData(t)) if in_link => {
                let link = std::str::from_utf8(&t).ok()?.trim().to_string();
                if is_essay_url(&link) {
                    return Some(link);
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to parse essay feed");
                return None;
            }
            _ => {}
        }
    }
}

/// `https://host/essays/<slug>` with nothing after the slug.
fn is_essay_url(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let Some(segments) = url.path_segments() else {
        return false;
    };
    let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
    segments.len() == 2 && segments[0] == "essays"
}

/// First link on an index page that points at a single essay.
pub fn find_essay_link(html: &str, base_url: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let document = Html::parse_document(html);

    document
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| url.host_str() == base.host_str())
        .map(|url| url.to_string())
        .find(|url| is_essay_url(url))
}

/// Extract the title and the substantial paragraphs of an essay page.
///
/// Paragraphs come from `div.article__body` when present and from every `p`
/// on the page otherwise. Paragraphs of `min_paragraph_words` words or fewer
/// (captions, bylines, newsletter blurbs) are dropped.
pub fn parse_essay(html: &str, min_paragraph_words: usize) -> Essay {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|h| normalize_whitespace(&h.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let raw: Vec<String> = match document.select(&ARTICLE_BODY).next() {
        Some(body) => body
            .select(&PARAGRAPH)
            .map(|p| p.text().collect::<String>())
            .collect(),
        None => {
            debug!("No article body found; falling back to all paragraphs");
            document
                .select(&PARAGRAPH)
                .map(|p| p.text().collect::<String>())
                .collect()
        }
    };

    let paragraphs = raw
        .iter()
        .map(|p| normalize_whitespace(p))
        .filter(|p| word_count(p) > min_paragraph_words)
        .collect();

    Essay { title, paragraphs }
}

/// Scrapes one Aeon essay and generates questions for its passages.
pub struct AeonSource<A> {
    http: reqwest::Client,
    config: AeonConfig,
    questions_per_passage: usize,
    asker: A,
}

impl<A> AeonSource<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(
        http: reqwest::Client,
        config: AeonConfig,
        questions_per_passage: usize,
        asker: A,
    ) -> Self {
        Self {
            http,
            config,
            questions_per_passage,
            asker,
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        Ok(self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    #[instrument(level = "info", skip_all)]
    async fn discover_essay_url(&self) -> String {
        if let Some(url) = &self.config.essay_url {
            info!(%url, "Using configured essay");
            return url.clone();
        }

        match self.fetch_text(&self.config.feed_url).await {
            Ok(xml) => match latest_essay_from_feed(&xml) {
                Some(url) => {
                    info!(%url, "Found latest essay in feed");
                    return url;
                }
                None => warn!(feed = %self.config.feed_url, "Feed has no essay items"),
            },
            Err(e) => warn!(feed = %self.config.feed_url, error = %e, "Failed to fetch essay feed"),
        }

        match self.fetch_text(&self.config.index_url).await {
            Ok(html) => match find_essay_link(&html, &self.config.index_url) {
                Some(url) => {
                    info!(%url, "Found latest essay on index page");
                    return url;
                }
                None => warn!(index = %self.config.index_url, "Index page has no essay links"),
            },
            Err(e) => warn!(index = %self.config.index_url, error = %e, "Failed to fetch essay index"),
        }

        warn!(url = %self.config.fallback_url, "Falling back to default essay");
        self.config.fallback_url.clone()
    }

    /// Chunk a fetched essay and generate questions for every passage.
    ///
    /// A passage whose generation fails is skipped. The source only fails
    /// when every passage failed.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn harvest_essay(&self, url: &str, html: &str) -> Result<Harvest, SourceError> {
        let essay = parse_essay(html, self.config.min_paragraph_words);
        let mut passages = chunk_paragraphs(
            &essay.paragraphs,
            self.config.chunk_words,
            self.config.min_chunk_words,
        );
        if let Some(max) = self.config.max_passages {
            passages.truncate(max);
        }
        info!(
            title = %essay.title,
            paragraphs = essay.paragraphs.len(),
            passages = passages.len(),
            "Scraped essay"
        );

        let mut harvest = Harvest {
            title: Some(essay.title),
            reference: Some(url.to_string()),
            records: Vec::new(),
        };
        if passages.is_empty() {
            warn!("Essay produced no passages");
            return Ok(harvest);
        }

        let mut failures = 0;
        for (i, passage) in passages.iter().enumerate() {
            match generate_questions(&self.asker, passage, self.questions_per_passage).await {
                Ok(payloads) => {
                    debug!(passage = i + 1, count = payloads.len(), "Generated questions");
                    harvest
                        .records
                        .extend(payloads.into_iter().map(|payload| RawRecord {
                            origin: SOURCE_NAME.to_string(),
                            reference: Some(url.to_string()),
                            passage: Some(passage.clone()),
                            category: Some(DEFAULT_CATEGORY.to_string()),
                            payload,
                        }));
                }
                Err(e) => {
                    failures += 1;
                    warn!(passage = i + 1, error = %e, "Question generation failed; skipping passage");
                }
            }
        }

        if failures == passages.len() {
            return Err(SourceError::Unavailable(format!(
                "question generation failed for all {failures} passages"
            )));
        }
        Ok(harvest)
    }
}

#[async_trait(?Send)]
impl<A> Source for AeonSource<A>
where
    A: AskAsync<Response = String>,
{
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn harvest(&self) -> Result<Harvest, SourceError> {
        let url = self.discover_essay_url().await;
        let html = self.fetch_text(&url).await?;
        self.harvest_essay(&url, &html).await
    }
}
