use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::config::OllamaConfig;
use crate::summarizer::{MAX_SUMMARY_CHARS, SummarizeError, trim_to_sentence_boundary};

/// Sampling profile for pipeline summaries: near-greedy decoding and a token
/// cap that lands close to the character limit.
pub const SUMMARY_OPTIONS: GenerateOptions = GenerateOptions {
    temperature: 0.1,
    top_p: 0.9,
    num_predict: 400,
    num_ctx: 4096,
    repeat_penalty: 1.1,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub num_predict: u32,
    pub num_ctx: u32,
    pub repeat_penalty: f64,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// One entry of `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, SummarizeError> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.read_timeout + config.write_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()
            .map_err(|e| SummarizeError::ClientInit(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Sends the request built by `build`, retrying timeouts up to
    /// `max_retries` times with a `retry_base_delay * 2^attempt` wait.
    async fn request<T, F>(&self, build: F) -> Result<T, SummarizeError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(build()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_timeout() && attempt < self.config.max_retries => {
                    let delay = self
                        .config
                        .retry_base_delay
                        .saturating_mul(2_u32.saturating_pow(attempt));
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Ollama request timed out, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_timeout() => {
                    return Err(SummarizeError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SummarizeError> {
        let response = request
            .send()
            .await
            .map_err(SummarizeError::from_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Status { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(SummarizeError::from_reqwest_error)
    }

    /// Raw non-streaming completion.
    #[instrument(skip_all, fields(model = %model, prompt_chars = prompt.len()))]
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: Option<&str>,
        options: Option<GenerateOptions>,
    ) -> Result<String, SummarizeError> {
        let url = self.endpoint("/api/generate");
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            system,
            options,
        };

        let response: GenerateResponse = self
            .request(|| self.client.post(&url).json(&body))
            .await?;

        debug!(response_chars = response.response.len(), "Generation finished");
        Ok(response.response)
    }

    /// Pipeline summary: fixed sampling profile, factual plain-text prompt,
    /// result trimmed to [`MAX_SUMMARY_CHARS`] at a sentence boundary.
    pub async fn summarize(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<String, SummarizeError> {
        let system = summary_system_prompt(language_hint);
        let prompt = user_prompt(text);

        let summary = self
            .generate(&self.config.model, &prompt, Some(&system), Some(SUMMARY_OPTIONS))
            .await?;

        Ok(trim_to_sentence_boundary(summary.trim(), MAX_SUMMARY_CHARS).to_string())
    }

    /// Ad-hoc summary with caller-chosen model, language and optional length cap.
    pub async fn summarize_text(
        &self,
        text: &str,
        model: Option<&str>,
        max_length: Option<usize>,
        language: &str,
    ) -> Result<String, SummarizeError> {
        let model = model.unwrap_or(&self.config.model);
        let mut system = format!(
            "You are a helpful AI assistant that creates concise summaries.\n\
             Create a summary in {} that captures the key points and main ideas.",
            language
        );
        if let Some(max) = max_length {
            system.push_str(&format!(" Keep the summary under {} characters.", max));
        }

        self.generate(model, &user_prompt(text), Some(&system), None)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, SummarizeError> {
        let url = self.endpoint("/api/tags");
        let tags: TagsResponse = self.request(|| self.client.get(&url)).await?;
        Ok(tags.models)
    }

    pub async fn check_health(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }
}

fn summary_system_prompt(language_hint: Option<&str>) -> String {
    let language = language_hint.unwrap_or("the source language");
    format!(
        "You are a precise summarization assistant. Create a summary that:\n\
         - Captures the key facts and main ideas from the text\n\
         - Is written in {} (unless the source is in English, then use English)\n\
         - Is deterministic and factual\n\
         - Does not use markdown formatting\n\
         - Is concise and well-structured\n\
         - Preserves essential information while being brief",
        language
    )
}

fn user_prompt(text: &str) -> String {
    format!("Please summarize the following text:\n\n{}", text)
}
