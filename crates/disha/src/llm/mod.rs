//! Text-generation collaborator.
//!
//! Generation is delegated to an external OpenAI-compatible endpoint (a
//! local Ollama instance by default). Its output is untrusted: the RAG
//! strategy always parses it into a structured record and falls back to
//! extractive answers when parsing fails.

pub mod record;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate raw text from system instructions plus a user prompt.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpGenerator {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client for generation")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl AnswerGenerator for HttpGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "max_tokens": 400,
            "temperature": 0.2,
            "stream": false
        });

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!("Generation request to {} timed out", self.endpoint)
            } else if e.is_connect() {
                anyhow!("Failed to connect to generation endpoint {}: {}", self.endpoint, e)
            } else {
                anyhow!("Generation request to {} failed: {}", self.endpoint, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Generation API error ({}): {}", status, body));
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", self.endpoint))?;
        // Some reverse proxies answer HTML on upstream failure; surface that
        // clearly instead of a confusing JSON error.
        if body.trim_start().starts_with('<') {
            let preview: String = body.trim_start().chars().take(200).collect();
            return Err(anyhow!(
                "Generation endpoint {} returned HTML instead of JSON: {}",
                self.endpoint,
                preview
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse generation response from {}", self.endpoint))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("Generation response contained no choices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_shape() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"{\"title\":\"Fees\"}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, r#"{"title":"Fees"}"#);
    }
}
