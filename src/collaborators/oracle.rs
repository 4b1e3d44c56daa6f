//! Chat-completions backed text oracle.
//!
//! All generation the core needs rides on one `/chat/completions` call
//! with a retry loop; the structured variants ask the model for JSON and
//! decode it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use super::{
    BloomLevel, DialogueTurn, DifficultyBand, Item, Objective, OracleError, TextOracle, Tone,
    TranscriptEntry,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Clone)]
pub struct HttpOracle {
    config: OracleConfig,
    client: reqwest::Client,
}

impl HttpOracle {
    pub fn from_env() -> Self {
        let api_key = env_string("ORACLE_API_KEY");
        let model = env_string("ORACLE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("ORACLE_API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout =
            Duration::from_millis(env_u64("ORACLE_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config: OracleConfig { api_key, model, api_endpoint, timeout },
            client,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse, OracleError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(OracleError::NotConfigured("ORACLE_API_KEY"))?;

        let url = format!(
            "{}/chat/completions",
            self.config.api_endpoint.trim_end_matches('/')
        );
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false
        });

        self.post_with_retry(&url, api_key, &payload).await
    }

    pub async fn complete_with_system(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, OracleError> {
        let messages = [
            ChatMessage { role: "system".into(), content: system.into() },
            ChatMessage { role: "user".into(), content: user.into() },
        ];
        let response = self.chat(&messages).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or(OracleError::EmptyResponse)
    }

    async fn complete_json<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, OracleError> {
        let raw = self.complete_with_system(system, user).await?;
        Ok(serde_json::from_str(strip_code_fence(&raw))?)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, OracleError> {
        let mut last_error: Option<OracleError> = None;

        for retry in 0..=MAX_RETRIES {
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        match serde_json::from_slice(&bytes) {
                            Ok(v) => return Ok(v),
                            Err(e) => {
                                let body_str = String::from_utf8_lossy(&bytes);
                                tracing::error!(
                                    "Failed to parse oracle response JSON: {}. Body: {}",
                                    e,
                                    body_str
                                );
                                return Err(OracleError::Json(e));
                            }
                        }
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = OracleError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, ?status, "oracle request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = OracleError::Request(e);
                    if retry < MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, "oracle request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(OracleError::NotConfigured("unknown")))
    }
}

impl TextOracle for HttpOracle {
    async fn generate_item(
        &self,
        objective: &Objective,
        band: DifficultyBand,
    ) -> Result<Item, OracleError> {
        let system = "You write certification exam questions. Respond with a single JSON object \
                      matching the schema: {\"id\": string, \"objective_id\": string, \
                      \"difficulty\": number, \"stem\": string, \"options\": [{\"key\": string, \
                      \"text\": string, \"is_correct\": bool}], \"explanation\": string}. \
                      Exactly one option is correct. No prose outside the JSON.";
        let user = format!(
            "Objective {id} ({name}): {desc}\nTarget difficulty between {low:.2} and {high:.2} on \
             a 0-1 scale. Write one multiple-choice question with four options.",
            id = objective.id,
            name = objective.name,
            desc = objective.description,
            low = band.low,
            high = band.high,
        );
        let mut item: Item = self.complete_json(system, &user).await?;
        if !has_single_answer_key(&item) {
            return Err(OracleError::Malformed("item must have exactly one correct option"));
        }
        item.objective_id = objective.id.clone();
        if !band.contains(item.difficulty) {
            item.difficulty = band.midpoint();
        }
        Ok(item)
    }

    async fn generate_dialogue_turn(
        &self,
        concept_name: &str,
        bloom: BloomLevel,
        history: &[TranscriptEntry],
    ) -> Result<DialogueTurn, OracleError> {
        let system = "You are a Socratic tutor. Respond with a single JSON object: \
                      {\"message\": string, \"bloom_level\": string, \"mastery_delta\": number, \
                      \"reference_url\": string|null, \"concluded\": bool}. Guide with questions, \
                      never lecture.";
        let mut user = format!(
            "Concept: {concept_name}\nCurrent cognitive level: {}\nDialogue so far:\n",
            bloom.as_str()
        );
        for entry in history {
            user.push_str(&format!("{}: {}\n", entry.role, entry.content));
        }
        user.push_str("Produce the next tutor turn.");
        self.complete_json(system, &user).await
    }

    async fn generate_message(&self, tone: Tone, context: &str) -> Result<String, OracleError> {
        let system = format!(
            "You write short study-companion messages in a {} tone. Two sentences max, plain text.",
            tone.as_str()
        );
        self.complete_with_system(&system, context).await
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

/// A gradable item carries exactly one correct option; anything else is
/// a malformed completion.
fn has_single_answer_key(item: &Item) -> bool {
    item.options.iter().filter(|o| o.is_correct).count() == 1
}

pub(crate) fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Models often wrap JSON answers in ``` fences; peel them before decoding.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}
