use anyhow::{anyhow, Context, Result};
use models::LlmSettings;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod advisor;
pub mod extract;

pub use advisor::{GoalRequest, SavingsAdvisor};

pub const API_KEY_ENV: &str = "LLM_API_KEY";

/// Configuration for an OpenAI-compatible chat completions endpoint.
///
/// The API key only ever lives in the server process; it is read from the
/// environment and never serialized back out.
#[derive(Clone)]
pub struct LlmClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClientConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmClientConfig {
    /// Builds the config from loaded settings plus `LLM_API_KEY`.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Minimal chat completions client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    base_url: Url,
    model: String,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        let base_url = validate_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .context("LLM_API_KEY contains characters not allowed in a header")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generic helper for a single-turn chat call. Returns the trimmed text
    /// of the first choice.
    pub async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let endpoint = self
            .base_url
            .join("chat/completions")
            .context("Failed to build /chat/completions URL")?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: Some(0.2),
        };

        let response: ChatResponse = self
            .http
            .post(endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {endpoint} returned non-success status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("LLM response had no choices"))?;

        Ok(content.trim().to_string())
    }
}

/// Plain http is only accepted for loopback hosts, so an API key is never
/// sent unencrypted over the network.
fn validate_base_url(base_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(base_url).with_context(|| format!("Invalid LLM base URL: {base_url}"))?;

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("LLM base URL is missing a host"))?
        .to_string();
    let is_local = host.eq_ignore_ascii_case("localhost")
        || host == "127.0.0.1"
        || host == "::1"
        || host == "[::1]";

    match url.scheme() {
        "https" => {}
        "http" if is_local => {}
        "http" => {
            return Err(anyhow!(
                "Refusing plain http for non-local LLM host '{host}'; use https"
            ))
        }
        other => return Err(anyhow!("Unsupported scheme '{other}' for LLM base URL")),
    }

    // Url::join drops the last segment unless the path ends with '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}
