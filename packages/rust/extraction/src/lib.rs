//! Grant extraction through a search-grounded generation provider.
//!
//! GrantScout asks the provider (Gemini `generateContent` with the Google
//! Search tool enabled) for a JSON array of opportunities, then hands the
//! free-form answer to [`parser::parse_response`] to recover the records.

pub mod parser;
pub mod prompt;
pub mod scoring;

use std::time::Duration;

use async_trait::async_trait;
use grantscout_shared::{
    ExtractionConfig, GrantScoutError, GroundingSource, Result, SearchConfig, read_secret,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

pub use parser::{ParsedBatch, parse_response, recover_json_array};
pub use prompt::build_prompt;
pub use scoring::{ConfidenceScorer, FixedScorer, RandomScorer};

/// Sampling temperature for every extraction call. Kept low to favour
/// factual recall over variation.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("GrantScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Raw provider answer for one run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Concatenated text parts of the first candidate.
    pub raw_text: String,
    /// Sources the provider grounded its answer on, in the order given.
    pub grounding_sources: Vec<GroundingSource>,
}

/// Anything that can turn a search config into raw provider text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Run one extraction call.
    async fn extract(&self, search: &SearchConfig) -> Result<ExtractionOutput>;
}

/// Settings for [`ExtractionClient`]. Credentials are passed in explicitly.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Provider API key. `None` makes every call fail with a config error.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ExtractionSettings {
    /// Resolve settings from the config file section, reading the key from
    /// the env var it names.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            api_key: read_secret(&config.api_key_env),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    tools: Vec<RequestTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the extraction provider.
pub struct ExtractionClient {
    settings: ExtractionSettings,
    http: Client,
}

impl ExtractionClient {
    pub fn new(settings: ExtractionSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                GrantScoutError::Extraction(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { settings, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl Extractor for ExtractionClient {
    fn model(&self) -> &str {
        &self.settings.model
    }

    #[instrument(skip_all, fields(model = %self.settings.model, year = search.year))]
    async fn extract(&self, search: &SearchConfig) -> Result<ExtractionOutput> {
        // Credentials are checked before anything touches the network.
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| GrantScoutError::config("extraction provider API key is not set"))?;

        let prompt = build_prompt(search);
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: &prompt }],
            }],
            tools: vec![RequestTool {
                google_search: GoogleSearch {},
            }],
            generation_config: GenerationConfig {
                temperature: EXTRACTION_TEMPERATURE,
            },
        };

        let url = self.endpoint();
        debug!(%url, prompt_len = prompt.len(), "sending extraction request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GrantScoutError::Extraction(format!("provider unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GrantScoutError::Extraction(format!(
                "provider returned HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            GrantScoutError::Extraction(format!("unreadable provider response: {e}"))
        })?;

        let output = into_output(body)?;
        info!(
            chars = output.raw_text.len(),
            sources = output.grounding_sources.len(),
            "extraction response received"
        );

        Ok(output)
    }
}

/// Flatten the first candidate into text plus grounding sources.
fn into_output(body: GenerateResponse) -> Result<ExtractionOutput> {
    let candidate = body.candidates.into_iter().next();

    let raw_text = candidate
        .as_ref()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default();

    if raw_text.trim().is_empty() {
        return Err(GrantScoutError::Extraction(
            "provider returned no text payload".into(),
        ));
    }

    let grounding_sources = candidate
        .and_then(|c| c.grounding_metadata)
        .map(|meta| {
            meta.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter_map(|web| {
                    let uri = web.uri?;
                    Some(GroundingSource {
                        title: web.title.unwrap_or_else(|| uri.clone()),
                        uri,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ExtractionOutput {
        raw_text,
        grounding_sources,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One-line description of a grounding source: `title (host)`.
///
/// Falls back to the raw URI when it does not parse.
pub fn describe_source(source: &GroundingSource) -> String {
    let host = Url::parse(&source.uri)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| source.uri.clone());
    format!("{} ({host})", source.title)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
