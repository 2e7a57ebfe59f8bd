//! Embedding backends.
//!
//! [`HttpEmbedder`] implements [`EmbeddingBackend`] over OpenAI-compatible
//! `POST /embeddings` or Ollama `POST /api/embed`, depending on the
//! provider kind. [`create_embedder`] returns `None` for providers without
//! an embedding model, which routes retrieval through keyword fallback.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::http::JsonClient;
use crate::providers::{ModelProviderConfig, ProviderKind};
use vigil_core::embedding::EmbeddingBackend;

pub struct HttpEmbedder {
    model: String,
    kind: ProviderKind,
    url: String,
    http: JsonClient,
}

impl HttpEmbedder {
    pub fn new(
        provider: &ModelProviderConfig,
        model: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        Ok(Self {
            model: model.to_string(),
            kind: provider.kind,
            url: provider.embeddings_url(),
            http: JsonClient::new(&provider.display_name, api_key, timeout_secs, max_retries)?,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    // Dimensionality is whatever the model returns.
    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.http.post(&self.url, &body).await?;
        match self.kind {
            ProviderKind::OpenaiCompatible => parse_openai_response(&json),
            ProviderKind::Ollama => parse_ollama_response(&json),
        }
    }
}

/// Pick the embedding backend for `provider`.
///
/// `None` when the provider has no enabled embedding model.
pub fn create_embedder(
    provider: &ModelProviderConfig,
    api_key: Option<String>,
    timeout_secs: u64,
    max_retries: u32,
) -> Result<Option<Arc<dyn EmbeddingBackend>>> {
    let Some(model) = provider.embedding_model() else {
        return Ok(None);
    };
    let embedder = HttpEmbedder::new(provider, model, api_key, timeout_secs, max_retries)?;
    Ok(Some(Arc::new(embedder)))
}

/// Parse `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_vector(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_vector(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_vector(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}
