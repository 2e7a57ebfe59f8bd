//! # Vigil Core
//!
//! Shared logic for Vigil: the rule engine and built-in security rules,
//! the security knowledge base, finding aggregation and scoring, prompt
//! assembly, and the retrieval-augmented [`assist::Assistant`].
//!
//! This crate performs no network or filesystem I/O and depends on no
//! async runtime. Language models and embedding providers are reached
//! through the [`llm::ChatBackend`] and [`embedding::EmbeddingBackend`]
//! traits, implemented by the `vigil` application crate.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ rules::RuleEngine ──▶ SecurityFinding ──▶ aggregate ──▶ score
//!   │                                                  ▲
//!   └──▶ knowledge::KnowledgeBase ──▶ prompt ──▶ LLM ──┘ (classify_region)
//! ```

pub mod aggregate;
pub mod assist;
pub mod autofix;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod rules;
pub mod text;
