//! Chat backend for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Works with OpenAI, DeepSeek, Ollama's OpenAI-compatible route, and any
//! custom provider that speaks the same protocol.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::http::JsonClient;
use crate::providers::ModelProviderConfig;
use vigil_core::llm::ChatBackend;

pub struct OpenAiChat {
    model: String,
    temperature: f32,
    url: String,
    http: JsonClient,
}

impl OpenAiChat {
    pub fn new(
        provider: &ModelProviderConfig,
        api_key: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        Ok(Self {
            model: provider.model_name.clone(),
            temperature: provider.temperature,
            url: provider.chat_url(),
            http: JsonClient::new(&provider.display_name, api_key, timeout_secs, max_retries)?,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let json = self.http.post(&self.url, &self.request_body(prompt)).await?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))
}
