//! Retrieval-augmented assistant operations.
//!
//! An [`Assistant`] is a ready-to-use bundle of chat backend, retriever,
//! and rule engine. Holding one means the LLM subsystem is initialized;
//! the app's session hands them out only in the `Ready` state.
//!
//! | Operation | Retrieval | On model error |
//! |-----------|-----------|----------------|
//! | [`get_advice`](Assistant::get_advice) | top `advice_k` for the code | [`ADVICE_FALLBACK`] |
//! | [`complete`](Assistant::complete) | top `completion_k` for the prefix | empty list |
//! | [`analyze_region`](Assistant::analyze_region) | top `analysis_k` for the region | [`ANALYSIS_FALLBACK`] |
//! | [`classify_region`](Assistant::classify_region) | top `analysis_k` for the region | empty list |
//!
//! Retrieval failures never surface: they are logged and the prompt is
//! built with an empty knowledge section.

use std::sync::Arc;

use crate::aggregate::findings_from_model_json;
use crate::knowledge::Retriever;
use crate::llm::ChatBackend;
use crate::models::{CompletionCandidate, KnowledgeDocument, SecurityFinding};
use crate::prompt::{
    self, detect_language, CompletionContext, ADVICE_FALLBACK, ANALYSIS_FALLBACK,
};
use crate::rules::RuleEngine;
use crate::text::{Position, Range, SourceDocument, TextDocument};

/// Retrieval and context sizes used when assembling prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistSettings {
    pub advice_k: usize,
    pub analysis_k: usize,
    pub completion_k: usize,
    pub context_lines: u32,
    pub min_prefix_chars: usize,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            advice_k: 2,
            analysis_k: 3,
            completion_k: 2,
            context_lines: 10,
            min_prefix_chars: 3,
        }
    }
}

pub struct Assistant {
    chat: Arc<dyn ChatBackend>,
    retriever: Arc<dyn Retriever>,
    rules: Arc<RuleEngine>,
    settings: AssistSettings,
}

impl Assistant {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        retriever: Arc<dyn Retriever>,
        rules: Arc<RuleEngine>,
    ) -> Self {
        Self {
            chat,
            retriever,
            rules,
            settings: AssistSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AssistSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AssistSettings {
        &self.settings
    }

    async fn knowledge_for(&self, query: &str, k: usize) -> Vec<KnowledgeDocument> {
        match self.retriever.retrieve(query, k).await {
            Ok(docs) => docs,
            Err(e) => {
                log::warn!("knowledge retrieval failed, continuing without it: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Free-text security advice for a code snippet.
    pub async fn get_advice(&self, code: &str, context: &str) -> String {
        let knowledge = self.knowledge_for(code, self.settings.advice_k).await;
        let findings = self.rules.run_rules(code);
        let prompt = prompt::advice_prompt(code, context, &knowledge, &findings);

        match self.chat.invoke(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("advice request to '{}' failed: {:#}", self.chat.model_name(), e);
                ADVICE_FALLBACK.to_string()
            }
        }
    }

    /// Up to three ranked completions for the line at `position`.
    ///
    /// Returns an empty list without calling the model when the trimmed
    /// line prefix is too short.
    pub async fn complete(
        &self,
        doc: &dyn TextDocument,
        position: Position,
    ) -> Vec<CompletionCandidate> {
        let ctx = CompletionContext::extract(doc, position, self.settings.context_lines);
        if !ctx.is_actionable(self.settings.min_prefix_chars) {
            return Vec::new();
        }

        let knowledge = self
            .knowledge_for(ctx.prefix.trim(), self.settings.completion_k)
            .await;
        let prompt = prompt::completion_prompt(&ctx, &knowledge);

        match self.chat.invoke(&prompt).await {
            Ok(text) => prompt::parse_completions(&text),
            Err(e) => {
                log::warn!("completion request for {} failed: {:#}", doc.uri(), e);
                Vec::new()
            }
        }
    }

    /// Structured security report for the text in `range`.
    pub async fn analyze_region(&self, doc: &dyn TextDocument, range: Range) -> String {
        let code = doc.text_in(range);
        let language = detect_language(doc.uri());
        let knowledge = self.knowledge_for(&code, self.settings.analysis_k).await;
        let findings = self.rules.run_on(&SourceDocument::new(doc.uri(), code.as_str()));
        let prompt = prompt::analysis_prompt(&code, language, &knowledge, &findings);

        match self.chat.invoke(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("analysis of {} failed: {:#}", doc.uri(), e);
                ANALYSIS_FALLBACK.to_string()
            }
        }
    }

    /// Model-classified findings for `range`, in document coordinates.
    pub async fn classify_region(
        &self,
        doc: &dyn TextDocument,
        range: Range,
    ) -> Vec<SecurityFinding> {
        let code = doc.text_in(range);
        if code.trim().is_empty() {
            return Vec::new();
        }
        let base = doc.offset_at(range.start).min(doc.offset_at(range.end));
        let language = detect_language(doc.uri());
        let knowledge = self.knowledge_for(&code, self.settings.analysis_k).await;
        let prompt = prompt::classification_prompt(&code, language, &knowledge);

        match self.chat.invoke(&prompt).await {
            Ok(text) => findings_from_model_json(&text, doc, base),
            Err(e) => {
                log::warn!("classification of {} failed: {:#}", doc.uri(), e);
                Vec::new()
            }
        }
    }
}
