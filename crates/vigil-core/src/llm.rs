//! Chat backend trait.
//!
//! The core only assembles prompts and parses replies. Transport lives in
//! the `vigil` app crate (an OpenAI-compatible `/chat/completions` client).

use anyhow::Result;
use async_trait::async_trait;

/// A language model that answers a single prompt.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier, used in log lines.
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the model's text reply.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}
