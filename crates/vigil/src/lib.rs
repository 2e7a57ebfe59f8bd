//! # Vigil
//!
//! **An editor-side security assistant: regex rules, security knowledge
//! retrieval, and LLM advice.**
//!
//! Vigil flags injection, XSS, and leaked-secret patterns with a fast rule
//! engine that needs no setup, and layers model-backed advice, inline
//! completions, region analysis, and draft fixes on top when a provider is
//! configured. Prompts are grounded in a small security knowledge corpus,
//! retrieved by embedding similarity or, without embeddings, by keyword
//! overlap.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Documents  │──▶│ Rule engine  │──▶│ FindingsStore│──▶ report / diagnostics
//! └─────────────┘   └──────────────┘   └──────────────┘
//!        │                                    ▲
//!        ▼                                    │ merge (deep scan)
//! ┌─────────────┐   ┌──────────────┐   ┌──────┴───────┐
//! │  Session    │──▶│  Assistant   │──▶│ Chat backend │
//! │ (provider)  │   │ + knowledge  │   │ (HTTP)       │
//! └─────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vigil scan ./src                      # rule findings and health score
//! vigil scan ./src --deep --json        # plus model classification
//! vigil search "sql injection"          # query the knowledge corpus
//! vigil providers use ollama            # pick a model provider
//! vigil analyze src/db.js --start-line 10 --end-line 24
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`providers`] | Provider registry and `vigil providers` commands |
//! | [`session`] | LLM lifecycle: `Uninitialized → Initializing → Ready` |
//! | [`http`] | JSON POST with retry and backoff |
//! | [`chat`] | OpenAI-compatible chat completion backend |
//! | [`embedding`] | OpenAI-compatible and Ollama embedding backends |
//! | [`knowledge`] | Corpus file loading and `vigil knowledge` / `vigil search` |
//! | [`findings`] | Per-document findings store with completion events |
//! | [`debounce`] | Completion request debouncing |
//! | [`scan`] | Workspace scanning and reports |
//! | [`assist_cmd`] | `vigil advise`, `complete`, `analyze`, `fix` |
//!
//! Rule evaluation, retrieval, scoring, and prompt assembly live in the
//! [`vigil_core`] crate.

pub mod assist_cmd;
pub mod chat;
pub mod config;
pub mod debounce;
pub mod embedding;
pub mod findings;
pub mod http;
pub mod knowledge;
pub mod providers;
pub mod scan;
pub mod session;
