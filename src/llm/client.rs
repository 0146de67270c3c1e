//! LLM client for digest generation.
//!
//! Supports Ollama API for local LLM inference.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default prompt for generating a source digest.
pub const DEFAULT_DIGEST_PROMPT: &str = r#"You are a local news digest writer. Today is {date}.

Create a concise morning news digest from the {source} articles provided below.

FORMAT YOUR RESPONSE EXACTLY LIKE THIS EXAMPLE:

**[Headline focused on the most important story]**

Good morning!

[1-2 paragraphs summarizing the most important stories]

QUICK NOTES:

* [Brief bullet point about another news item]
* [Brief bullet point about another news item]
* [Brief bullet point about another news item]

IMPORTANT INSTRUCTIONS:
1. Focus EXCLUSIVELY on the provided articles. DO NOT invent news stories.
2. DO NOT mention article sources or specific media outlets.
3. Use a friendly, informative tone throughout.
4. Format the QUICK NOTES as bullet points with asterisks (*).
5. NEVER include URLs or references to where information came from.
6. Make the headline bold and place it in square brackets.

ARTICLES:

{articles}"#;

/// Configuration for LLM client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether digest generation is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ollama API endpoint (default: http://localhost:11434)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model to use for digest generation
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Custom digest prompt (uses {date}, {source} and {articles} placeholders)
    #[serde(default)]
    pub digest_prompt: Option<String>,
    /// Maximum characters of formatted article text to send to the LLM
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_enabled() -> bool {
    true
}
fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_content_chars() -> usize {
    24000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            digest_prompt: None,
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl LlmConfig {
    /// Get the digest prompt, using custom or default.
    pub fn get_digest_prompt(&self) -> &str {
        self.digest_prompt.as_deref().unwrap_or(DEFAULT_DIGEST_PROMPT)
    }
}

/// LLM client for digest generation.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // 5 min timeout for slow models
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Get the config.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service is available.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Generate a digest from pre-formatted article text.
    pub async fn generate_digest(
        &self,
        source_name: &str,
        articles_text: &str,
    ) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let prompt = self.build_prompt(source_name, articles_text);
        debug!("Generating digest for source: {}", source_name);
        let response = self.call_ollama(&prompt).await?;

        let digest = response.trim().to_string();
        if digest.is_empty() {
            return Err(LlmError::Parse("Empty digest response".to_string()));
        }

        Ok(digest)
    }

    fn build_prompt(&self, source_name: &str, articles_text: &str) -> String {
        let date = chrono::Utc::now().format("%A, %B %d, %Y").to_string();
        self.config
            .get_digest_prompt()
            .replace("{date}", &date)
            .replace("{source}", source_name)
            .replace("{articles}", self.truncate_content(articles_text))
    }

    /// Truncate content to configured maximum (UTF-8 safe).
    fn truncate_content<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.config.max_content_chars {
            return text;
        }
        // Find a valid UTF-8 boundary at or before max_content_chars
        let mut end = self.config.max_content_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    /// Call Ollama API with a prompt.
    async fn call_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug)]
pub enum LlmError {
    /// Failed to connect to LLM service
    Connection(String),
    /// API returned an error
    Api(String),
    /// Failed to parse response
    Parse(String),
    /// LLM is disabled
    Disabled,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            LlmError::Api(msg) => write!(f, "API error: {}", msg),
            LlmError::Parse(msg) => write!(f, "Parse error: {}", msg),
            LlmError::Disabled => write!(f, "LLM is disabled"),
        }
    }
}

impl std::error::Error for LlmError {}
