//! JSON-over-HTTP with retry, shared by the chat and embedding backends.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

/// HTTP client settings for one provider.
#[derive(Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    api_key: Option<String>,
    max_retries: u32,
    label: String,
}

impl JsonClient {
    pub fn new(
        label: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            max_retries,
            label: label.to_string(),
        })
    }

    /// POST `body` to `url` and return the parsed JSON response.
    pub async fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                log::debug!(
                    "{} retry {}/{} in {:?}",
                    self.label,
                    attempt,
                    self.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // 429 and 5xx are retryable
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            self.label,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("{} API error {}: {}", self.label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "{} connection error ({}): {}",
                        self.label,
                        url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", self.label)))
    }
}
