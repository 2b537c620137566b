//! OpenAI-compatible HTTP providers
//!
//! [`OpenAiProvider`] covers text and image generation; [`OpenAiScorer`]
//! asks a vision model for JSON scores and degrades to unavailable scores
//! on any failure.

use crate::error::ProviderError;
use crate::provider::{
    CharacterDna, EnvironmentDna, GenerationProvider, QualityScorer, SceneImageParams,
    StoryParams,
};
use crate::validation::score::{CoherenceReport, ConsistencyScore, Score};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `[provider]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Inline key; prefer `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            image_model: default_image_model(),
            image_size: default_image_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OpenAiConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!("Invalid base_url: {}", self.base_url));
        }
        for (field, value) in [
            ("text_model", &self.text_model),
            ("vision_model", &self.vision_model),
            ("image_model", &self.image_model),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} cannot be empty", field));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Inline key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, ProviderError> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(&self.api_key_env).map_err(|_| {
            ProviderError::authentication(format!(
                "No API key configured (set {} or provider.api_key)",
                self.api_key_env
            ))
        })
    }
}

fn map_http_error(error: reqwest::Error) -> ProviderError {
    if let Some(status) = error.status() {
        map_status(status, &error.to_string())
    } else if error.is_timeout() {
        ProviderError::timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ProviderError::connection(format!("Connection error: {}", error))
    } else {
        ProviderError::unknown(format!("HTTP error: {}", error))
    }
}

fn map_status(status: StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::authentication(format!("Authentication failed: {}", body)),
        429 => ProviderError::rate_limit(format!("Rate limit exceeded: {}", body)),
        400 | 422 => ProviderError::validation(format!("Request rejected: {}", body)),
        408 | 504 => ProviderError::timeout(format!("Upstream timeout: {}", body)),
        502 | 503 => ProviderError::connection(format!("Upstream unavailable: {}", body)),
        _ => ProviderError::unknown(format!("Request failed with status {}: {}", status, body)),
    }
}

fn build_http_client(config: &OpenAiConfig) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| ProviderError::unknown(format!("Failed to create HTTP client: {}", e)))
}

/// Shared request plumbing for both the generator and the scorer
#[derive(Clone)]
struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key()?,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::unknown(format!("Failed to parse response: {}", e)))
    }

    async fn chat(
        &self,
        model: &str,
        messages: Value,
        json_mode: bool,
    ) -> Result<String, ProviderError> {
        let mut body = json!({ "model": model, "messages": messages });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        let response: ChatCompletionResponse = serde_json::from_value(
            self.post("chat/completions", &body).await?,
        )
        .map_err(|e| ProviderError::unknown(format!("Unexpected completion shape: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::unknown("No choices in response"))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Text and image generation over an OpenAI-compatible API
pub struct OpenAiProvider {
    api: ApiClient,
    text_model: String,
    vision_model: String,
    image_model: String,
    image_size: String,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(config)?,
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            image_model: config.image_model.clone(),
            image_size: config.image_size.clone(),
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    async fn describe_character(&self, image_url: &str) -> Result<String, ProviderError> {
        let messages = json!([
            {
                "role": "system",
                "content": "You describe characters for illustrators. Be concrete about \
                            species, build, hair, clothing, colors and distinguishing marks."
            },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": "Describe the main character in this image in one paragraph." },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }
        ]);
        self.api.chat(&self.vision_model, messages, false).await
    }

    async fn generate_story(&self, params: &StoryParams) -> Result<String, ProviderError> {
        let hero = params
            .character_name
            .clone()
            .unwrap_or_else(|| "the hero".to_string());
        let audience = params.audience.as_deref().unwrap_or("young children");
        let prompt = format!(
            "Write a {}-page picture book story for {} about {} ({}). Theme: {}. \
             Separate pages with a blank line and do not number them.",
            params.page_count, audience, hero, params.character_description, params.theme
        );
        let messages = json!([
            { "role": "system", "content": "You are a children's book author." },
            { "role": "user", "content": prompt }
        ]);
        self.api.chat(&self.text_model, messages, false).await
    }

    async fn generate_scene_image(
        &self,
        params: &SceneImageParams,
    ) -> Result<String, ProviderError> {
        let mut prompt = format!("{} style. {}", params.style, params.prompt);
        if let Some(reference) = &params.continuity_reference {
            prompt.push_str(&format!(
                " Continue directly from the previous panel ({}): same character design, setting and colors.",
                reference
            ));
        }
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "size": self.image_size,
            "n": 1,
        });
        let response: ImageResponse = serde_json::from_value(
            self.api.post("images/generations", &body).await?,
        )
        .map_err(|e| ProviderError::unknown(format!("Unexpected image response: {}", e)))?;

        debug!(model = %self.image_model, "Scene image generated");
        response
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| ProviderError::unknown("Image response contained no URL"))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Vision-model scorer. Every failure becomes an unavailable score.
pub struct OpenAiScorer {
    api: ApiClient,
    model: String,
}

impl OpenAiScorer {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(config)?,
            model: config.vision_model.clone(),
        })
    }

    async fn ask(
        &self,
        instructions: String,
        image_urls: &[String],
    ) -> Result<RawScore, ProviderError> {
        let mut content = vec![json!({ "type": "text", "text": instructions })];
        content.extend(
            image_urls
                .iter()
                .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
        );
        let messages = json!([
            {
                "role": "system",
                "content": "You are a strict illustration continuity reviewer. Reply with JSON only."
            },
            { "role": "user", "content": content }
        ]);
        let text = self.api.chat(&self.model, messages, true).await?;
        parse_raw_score(&text)
    }
}

/// Scorer reply as requested from the model
#[derive(Debug, Deserialize)]
struct RawScore {
    overall: f64,
    #[serde(default)]
    dimensions: BTreeMap<String, f64>,
    #[serde(default)]
    panel_scores: Vec<f64>,
    #[serde(default)]
    cross_panel: Option<f64>,
    #[serde(default)]
    failure_reasons: Vec<String>,
}

fn parse_raw_score(text: &str) -> Result<RawScore, ProviderError> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::validation(format!("Scorer reply is not valid JSON: {}", e)))
}

/// Model scores may be fractional; they round down and clamp to 100.
/// Negative values keep their sentinel meaning.
fn model_score(value: f64) -> Score {
    if !value.is_finite() || value < 0.0 {
        Score::Unavailable
    } else {
        Score::Scored(value.floor().min(100.0) as u8)
    }
}

fn to_scores(raw: BTreeMap<String, f64>) -> BTreeMap<String, Score> {
    raw.into_iter().map(|(k, v)| (k, model_score(v))).collect()
}

#[async_trait]
impl QualityScorer for OpenAiScorer {
    async fn score_panel_consistency(
        &self,
        image_url: &str,
        reference: &CharacterDna,
        threshold: u8,
    ) -> ConsistencyScore {
        let instructions = format!(
            "Rate 0-100 how faithfully this image depicts the reference character: {}. \
             Return {{\"overall\": int, \"dimensions\": {{\"face\": int, \"outfit\": int, \
             \"proportions\": int, \"colors\": int}}, \"failure_reasons\": [string]}}.",
            reference.summary()
        );
        match self.ask(instructions, &[image_url.to_string()]).await {
            Ok(raw) => match model_score(raw.overall) {
                Score::Scored(overall) => ConsistencyScore::scored(
                    overall,
                    threshold,
                    to_scores(raw.dimensions),
                    raw.failure_reasons,
                ),
                Score::Unavailable => ConsistencyScore::unavailable("scorer returned no score"),
            },
            Err(err) => {
                warn!(error = %err, "Consistency scoring unavailable");
                ConsistencyScore::unavailable(err.to_string())
            }
        }
    }

    async fn score_page_coherence(
        &self,
        image_urls: &[String],
        environment: &EnvironmentDna,
        threshold: u8,
    ) -> CoherenceReport {
        let instructions = format!(
            "These {} panels belong to one page set in: {}. Rate 0-100 how consistently they \
             share that environment. Return {{\"overall\": int, \"dimensions\": {{\"location\": int, \
             \"lighting\": int, \"palette\": int, \"architecture\": int}}, \"panel_scores\": [int], \
             \"cross_panel\": int, \"failure_reasons\": [string]}}.",
            image_urls.len(),
            environment.summary()
        );
        match self.ask(instructions, image_urls).await {
            Ok(raw) => match model_score(raw.overall) {
                Score::Scored(overall) => CoherenceReport::scored(
                    overall,
                    threshold,
                    raw.panel_scores.into_iter().map(model_score).collect(),
                    raw.cross_panel.map(model_score).unwrap_or(Score::Scored(overall)),
                    raw.failure_reasons,
                )
                .with_dimensions(to_scores(raw.dimensions)),
                Score::Unavailable => CoherenceReport::unavailable("scorer returned no score"),
            },
            Err(err) => {
                warn!(error = %err, "Coherence scoring unavailable");
                CoherenceReport::unavailable(err.to_string())
            }
        }
    }
}
