//! LLM session state.
//!
//! The [`Session`] owns the current provider id and the lifecycle of the
//! LLM subsystem:
//!
//! ```text
//! Uninitialized ──initialize()──▶ Initializing ──▶ Ready { embeddings }
//!       ▲                                               │
//!       └──────────────── switch_provider() ◀───────────┘
//! ```
//!
//! Embeddings are a soft dependency: if the provider has none, or the
//! index build fails, the session is still `Ready { embeddings: false }`
//! and retrieval uses the knowledge base's keyword fallback.
//!
//! LLM operations outside `Ready` fail with
//! [`AssistError::NotInitialized`]. Rule-based detection never goes
//! through the session.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::Result;

use crate::chat::OpenAiChat;
use crate::config::Config;
use crate::debounce::CompletionDebouncer;
use crate::embedding::create_embedder;
use crate::providers::{ModelProviderConfig, ProviderRegistry};
use vigil_core::assist::{AssistSettings, Assistant};
use vigil_core::embedding::EmbeddingBackend;
use vigil_core::error::AssistError;
use vigil_core::knowledge::{KnowledgeBase, Retriever};
use vigil_core::llm::ChatBackend;
use vigil_core::models::{CompletionCandidate, SecurityFinding};
use vigil_core::rules::RuleEngine;
use vigil_core::text::{Position, Range, TextDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready { embeddings: bool },
}

/// Builds backends for a provider. The HTTP implementation is
/// [`HttpBackends`]; tests substitute in-process fakes.
pub trait BackendFactory: Send + Sync {
    fn chat(
        &self,
        provider: &ModelProviderConfig,
        api_key: Option<String>,
    ) -> Result<Arc<dyn ChatBackend>>;

    fn embedder(
        &self,
        provider: &ModelProviderConfig,
        api_key: Option<String>,
    ) -> Result<Option<Arc<dyn EmbeddingBackend>>>;
}

pub struct HttpBackends {
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpBackends {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        Self {
            timeout_secs,
            max_retries,
        }
    }
}

impl BackendFactory for HttpBackends {
    fn chat(
        &self,
        provider: &ModelProviderConfig,
        api_key: Option<String>,
    ) -> Result<Arc<dyn ChatBackend>> {
        Ok(Arc::new(OpenAiChat::new(
            provider,
            api_key,
            self.timeout_secs,
            self.max_retries,
        )?))
    }

    fn embedder(
        &self,
        provider: &ModelProviderConfig,
        api_key: Option<String>,
    ) -> Result<Option<Arc<dyn EmbeddingBackend>>> {
        create_embedder(provider, api_key, self.timeout_secs, self.max_retries)
    }
}

struct Inner {
    provider_id: String,
    state: SessionState,
    assistant: Option<Arc<Assistant>>,
    generation: u64,
}

pub struct Session {
    registry: ProviderRegistry,
    factory: Box<dyn BackendFactory>,
    settings: AssistSettings,
    debounce: Duration,
    knowledge: Arc<KnowledgeBase>,
    rules: Arc<RuleEngine>,
    debouncer: CompletionDebouncer,
    inner: RwLock<Inner>,
}

impl Session {
    /// A session over HTTP backends configured from `config`.
    pub fn new(config: &Config, knowledge: Arc<KnowledgeBase>, rules: Arc<RuleEngine>) -> Self {
        let factory = HttpBackends::new(config.llm.timeout_secs, config.llm.max_retries);
        Self::with_factory(config, knowledge, rules, Box::new(factory))
    }

    pub fn with_factory(
        config: &Config,
        knowledge: Arc<KnowledgeBase>,
        rules: Arc<RuleEngine>,
        factory: Box<dyn BackendFactory>,
    ) -> Self {
        Self {
            registry: ProviderRegistry::from_config(&config.llm),
            factory,
            settings: config.assist_settings(),
            debounce: Duration::from_millis(config.completion.debounce_ms),
            knowledge,
            rules,
            debouncer: CompletionDebouncer::new(),
            inner: RwLock::new(Inner {
                provider_id: config.llm.provider.clone(),
                state: SessionState::Uninitialized,
                assistant: None,
                generation: 0,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.read().state
    }

    pub fn provider_id(&self) -> String {
        self.read().provider_id.clone()
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn rules(&self) -> &Arc<RuleEngine> {
        &self.rules
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Select another provider. The session returns to `Uninitialized`;
    /// requests already running keep the assistant they started with.
    pub fn switch_provider(&self, id: &str) -> Result<(), AssistError> {
        let provider = self.registry.resolve(id)?;
        let mut inner = self.write();
        inner.provider_id = provider.id.clone();
        inner.state = SessionState::Uninitialized;
        inner.assistant = None;
        inner.generation += 1;
        drop(inner);
        self.knowledge.drop_index();
        log::debug!("switched provider to '{}'", provider.id);
        Ok(())
    }

    /// Bring the LLM subsystem up for the current provider.
    ///
    /// Fails (leaving the session `Uninitialized`) if the provider is
    /// unknown, its API key is missing, or the chat backend cannot be
    /// built. Embedding problems only downgrade to `Ready { embeddings:
    /// false }`. If the provider is switched while this runs, the result
    /// is discarded.
    pub async fn initialize(&self) -> Result<SessionState> {
        let (provider_id, generation) = {
            let mut inner = self.write();
            inner.state = SessionState::Initializing;
            inner.assistant = None;
            inner.generation += 1;
            (inner.provider_id.clone(), inner.generation)
        };

        let chat = match self.prepare_chat(&provider_id) {
            Ok(chat) => chat,
            Err(e) => {
                let mut inner = self.write();
                if inner.generation == generation {
                    inner.state = SessionState::Uninitialized;
                }
                return Err(e);
            }
        };

        let embeddings = self.prepare_index(&provider_id).await;

        let mut inner = self.write();
        if inner.generation != generation {
            log::warn!(
                "provider changed during initialization of '{}'; result discarded",
                provider_id
            );
            return Ok(inner.state);
        }

        let retriever: Arc<dyn Retriever> = self.knowledge.clone();
        let assistant = Assistant::new(chat, retriever, self.rules.clone())
            .with_settings(self.settings.clone());
        inner.assistant = Some(Arc::new(assistant));
        inner.state = SessionState::Ready { embeddings };
        log::debug!(
            "session ready with '{}' (embeddings: {})",
            provider_id,
            embeddings
        );
        Ok(inner.state)
    }

    fn prepare_chat(&self, provider_id: &str) -> Result<Arc<dyn ChatBackend>> {
        let provider = self.registry.resolve(provider_id)?;
        let api_key = provider.api_key()?;
        self.factory.chat(provider, api_key)
    }

    async fn prepare_index(&self, provider_id: &str) -> bool {
        self.knowledge.drop_index();
        let Some(provider) = self.registry.get(provider_id) else {
            return false;
        };
        let api_key = provider.api_key().ok().flatten();
        let embedder = match self.factory.embedder(provider, api_key) {
            Ok(Some(embedder)) => embedder,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("embedding backend for '{}' unavailable: {:#}", provider_id, e);
                return false;
            }
        };
        self.knowledge.build_index(embedder).await
    }

    /// The ready assistant, or [`AssistError::NotInitialized`].
    pub fn assistant(&self) -> Result<Arc<Assistant>, AssistError> {
        let inner = self.read();
        match (&inner.state, &inner.assistant) {
            (SessionState::Ready { .. }, Some(assistant)) => Ok(assistant.clone()),
            _ => Err(AssistError::NotInitialized),
        }
    }

    pub async fn get_advice(&self, code: &str, context: &str) -> Result<String, AssistError> {
        let assistant = self.assistant()?;
        Ok(assistant.get_advice(code, context).await)
    }

    pub async fn complete(
        &self,
        doc: &dyn TextDocument,
        position: Position,
    ) -> Result<Vec<CompletionCandidate>, AssistError> {
        let assistant = self.assistant()?;
        Ok(assistant.complete(doc, position).await)
    }

    /// Debounced completion for editor keystrokes.
    ///
    /// Waits out the debounce interval, then completes unless a newer
    /// request for the same document arrived or the cursor moved.
    /// `Ok(None)` means the result was superseded, either before the model
    /// call or while it ran.
    pub async fn complete_debounced(
        &self,
        doc: &dyn TextDocument,
        position: Position,
    ) -> Result<Option<Vec<CompletionCandidate>>, AssistError> {
        let ticket = self.debouncer.begin(doc.uri(), position);
        tokio::time::sleep(self.debounce).await;
        if !self.debouncer.is_current(&ticket) {
            return Ok(None);
        }

        let assistant = self.assistant()?;
        let candidates = assistant.complete(doc, position).await;
        if !self.debouncer.is_current(&ticket) {
            log::debug!("dropping stale completion for {}", ticket.uri());
            return Ok(None);
        }
        Ok(Some(candidates))
    }

    /// Record an editor cursor move; pending completions elsewhere go stale.
    pub fn cursor_moved(&self, uri: &str, position: Position) {
        self.debouncer.cursor_moved(uri, position);
    }

    pub async fn analyze_region(
        &self,
        doc: &dyn TextDocument,
        range: Range,
    ) -> Result<String, AssistError> {
        let assistant = self.assistant()?;
        Ok(assistant.analyze_region(doc, range).await)
    }

    pub async fn classify_region(
        &self,
        doc: &dyn TextDocument,
        range: Range,
    ) -> Result<Vec<SecurityFinding>, AssistError> {
        let assistant = self.assistant()?;
        Ok(assistant.classify_region(doc, range).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use async_trait::async_trait;
    use vigil_core::text::SourceDocument;

    struct FixedChat(String);

    #[async_trait]
    impl ChatBackend for FixedChat {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn invoke(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingBackend for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    struct FakeBackends {
        reply: String,
    }

    impl BackendFactory for FakeBackends {
        fn chat(
            &self,
            _provider: &ModelProviderConfig,
            _api_key: Option<String>,
        ) -> Result<Arc<dyn ChatBackend>> {
            Ok(Arc::new(FixedChat(self.reply.clone())))
        }

        fn embedder(
            &self,
            provider: &ModelProviderConfig,
            _api_key: Option<String>,
        ) -> Result<Option<Arc<dyn EmbeddingBackend>>> {
            Ok(provider
                .embedding_model()
                .map(|_| Arc::new(LengthEmbedder) as Arc<dyn EmbeddingBackend>))
        }
    }

    fn provider(id: &str, embeddings: bool, api_key_env: Option<&str>) -> ModelProviderConfig {
        ModelProviderConfig {
            id: id.to_string(),
            display_name: id.to_string(),
            base_url: "http://localhost:9/v1".to_string(),
            model_name: "m".to_string(),
            temperature: 0.0,
            embedding_model_name: embeddings.then(|| "e".to_string()),
            embeddings_enabled: embeddings,
            api_key_env: api_key_env.map(str::to_string),
            kind: ProviderKind::OpenaiCompatible,
        }
    }

    fn session(current: &str, reply: &str) -> Session {
        let mut config = Config::default();
        config.llm.provider = current.to_string();
        config.llm.custom_providers = vec![
            provider("plain", false, None),
            provider("embedded", true, None),
            provider("keyed", false, Some("VIGIL_SESSION_TEST_UNSET_KEY")),
        ];
        config.completion.debounce_ms = 20;
        Session::with_factory(
            &config,
            Arc::new(KnowledgeBase::with_documents_or_default(Vec::new())),
            Arc::new(RuleEngine::with_builtin_rules().unwrap()),
            Box::new(FakeBackends {
                reply: reply.to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let s = session("plain", "advice");
        assert_eq!(s.state(), SessionState::Uninitialized);
        let err = s.get_advice("x", "").await.unwrap_err();
        assert!(matches!(err, AssistError::NotInitialized));
        assert_eq!(err.to_string(), "service not initialized");
    }

    #[tokio::test]
    async fn test_ready_without_embeddings() {
        let s = session("plain", "advice");
        let state = s.initialize().await.unwrap();
        assert_eq!(state, SessionState::Ready { embeddings: false });
        assert!(!s.knowledge().is_indexed());
        assert_eq!(s.get_advice("x = 1", "").await.unwrap(), "advice");
    }

    #[tokio::test]
    async fn test_ready_with_embeddings_builds_index() {
        let s = session("embedded", "advice");
        let state = s.initialize().await.unwrap();
        assert_eq!(state, SessionState::Ready { embeddings: true });
        assert!(s.knowledge().is_indexed());
    }

    #[tokio::test]
    async fn test_missing_key_stays_uninitialized() {
        let s = session("keyed", "advice");
        let err = s.initialize().await.unwrap_err();
        assert!(err.to_string().contains("VIGIL_SESSION_TEST_UNSET_KEY"));
        assert_eq!(s.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_switch_provider_resets_state() {
        let s = session("plain", "advice");
        s.initialize().await.unwrap();

        s.switch_provider("embedded").unwrap();
        assert_eq!(s.provider_id(), "embedded");
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert!(s.assistant().is_err());

        let err = s.switch_provider("nope").unwrap_err();
        assert!(matches!(err, AssistError::UnknownProvider(ref id) if id == "nope"));
        assert_eq!(s.provider_id(), "embedded");
    }

    #[tokio::test]
    async fn test_switch_to_provider_without_embeddings_drops_index() {
        let s = session("embedded", "advice");
        s.initialize().await.unwrap();
        assert!(s.knowledge().is_indexed());

        s.switch_provider("plain").unwrap();
        assert!(!s.knowledge().is_indexed());

        let state = s.initialize().await.unwrap();
        assert_eq!(state, SessionState::Ready { embeddings: false });
        assert!(!s.knowledge().is_indexed());
    }

    #[tokio::test]
    async fn test_debounced_completion_superseded() {
        let s = session("plain", "db.query(sql, [id]);");
        s.initialize().await.unwrap();
        let doc = SourceDocument::new("a.js", "const id = 1;\ndb.qu");
        let pos = Position::new(1, 5);

        let (first, second) = tokio::join!(s.complete_debounced(&doc, pos), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            s.complete_debounced(&doc, pos).await
        });
        assert!(first.unwrap().is_none());
        let candidates = second.unwrap().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].detail, "sql-injection");
    }

    #[tokio::test]
    async fn test_cursor_move_drops_completion() {
        let s = session("plain", "db.query(sql, [id]);");
        s.initialize().await.unwrap();
        let doc = SourceDocument::new("a.js", "const id = 1;\ndb.qu");

        let (result, _) = tokio::join!(s.complete_debounced(&doc, Position::new(1, 5)), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            s.cursor_moved("a.js", Position::new(0, 3));
        });
        assert!(result.unwrap().is_none());
    }
}
