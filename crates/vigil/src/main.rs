//! # Vigil CLI (`vigil`)
//!
//! ## Usage
//!
//! ```bash
//! vigil --config ./config/vigil.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vigil scan <path>` | Run the rule engine over a file or directory |
//! | `vigil search "<query>"` | Query the security knowledge corpus |
//! | `vigil advise <file>` | Security advice for a file |
//! | `vigil complete <file> --line N --character N` | Security-aware completions |
//! | `vigil analyze <file>` | Security report for a file or line range |
//! | `vigil fix <file>` | Draft fix derived from the analysis |
//! | `vigil providers list \| use \| add` | Manage model providers |
//! | `vigil knowledge import \| export \| list` | Manage the knowledge corpus |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vigil::providers::{ModelProviderConfig, ProviderKind};
use vigil::{assist_cmd, config, knowledge, providers, scan};

/// Vigil: security rules, knowledge retrieval, and LLM advice for source code.
#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Vigil: security rules, knowledge retrieval, and LLM advice for source code",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/vigil.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/vigil.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a file or directory with the rule engine.
    ///
    /// Prints findings per file with a health score. Never needs a model
    /// provider unless `--deep` is given.
    Scan {
        /// File or directory to scan.
        path: PathBuf,

        /// Also classify each file with the current model provider.
        #[arg(long)]
        deep: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the security knowledge corpus.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Rank by embedding similarity with the current provider.
        #[arg(long)]
        semantic: bool,
    },

    /// Get security advice for a file.
    Advise {
        file: PathBuf,
    },

    /// Suggest security-aware completions at a position.
    Complete {
        file: PathBuf,

        /// 1-based line number.
        #[arg(long)]
        line: u32,

        /// 1-based column.
        #[arg(long)]
        character: u32,
    },

    /// Produce a security report for a file or a line range.
    Analyze {
        file: PathBuf,

        /// First line (1-based, inclusive).
        #[arg(long)]
        start_line: Option<u32>,

        /// Last line (1-based, inclusive).
        #[arg(long)]
        end_line: Option<u32>,
    },

    /// Print a draft fix for a file or a line range.
    ///
    /// The draft is pattern-based and must be reviewed before use.
    Fix {
        file: PathBuf,

        #[arg(long)]
        start_line: Option<u32>,

        #[arg(long)]
        end_line: Option<u32>,
    },

    /// Manage model providers.
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },

    /// Manage the knowledge corpus.
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

#[derive(Subcommand)]
enum ProvidersAction {
    /// List providers; `*` marks the current one.
    List,
    /// Make a provider current and save the config.
    Use {
        id: String,
    },
    /// Add or replace a custom provider and save the config.
    Add {
        id: String,

        #[arg(long)]
        base_url: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        display_name: Option<String>,

        #[arg(long, default_value_t = 0.2)]
        temperature: f32,

        /// Embedding model; enables embeddings for this provider.
        #[arg(long)]
        embedding_model: Option<String>,

        /// Environment variable holding the API key.
        #[arg(long)]
        api_key_env: Option<String>,

        /// Speak the Ollama API instead of the OpenAI-compatible one.
        #[arg(long)]
        ollama: bool,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Append documents from a corpus JSON file.
    Import {
        file: PathBuf,
    },
    /// Write the effective corpus as JSON.
    Export {
        /// Output file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List corpus documents.
    List {
        #[arg(long)]
        category: Option<String>,

        /// high, medium, or low.
        #[arg(long)]
        severity: Option<String>,

        #[arg(long)]
        tag: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Scan { path, deep, json } => {
            scan::run_scan(&cfg, &path, deep, json).await?;
        }
        Commands::Search {
            query,
            limit,
            semantic,
        } => {
            knowledge::run_search(&cfg, &query, limit, semantic).await?;
        }
        Commands::Advise { file } => {
            assist_cmd::run_advise(&cfg, &file).await?;
        }
        Commands::Complete {
            file,
            line,
            character,
        } => {
            assist_cmd::run_complete(&cfg, &file, line, character).await?;
        }
        Commands::Analyze {
            file,
            start_line,
            end_line,
        } => {
            assist_cmd::run_analyze(&cfg, &file, start_line, end_line).await?;
        }
        Commands::Fix {
            file,
            start_line,
            end_line,
        } => {
            assist_cmd::run_fix(&cfg, &file, start_line, end_line).await?;
        }
        Commands::Providers { action } => match action {
            ProvidersAction::List => {
                providers::run_providers_list(&cfg)?;
            }
            ProvidersAction::Use { id } => {
                providers::run_providers_use(&cfg, &cli.config, &id)?;
            }
            ProvidersAction::Add {
                id,
                base_url,
                model,
                display_name,
                temperature,
                embedding_model,
                api_key_env,
                ollama,
            } => {
                let provider = ModelProviderConfig {
                    display_name: display_name.unwrap_or_else(|| id.clone()),
                    id,
                    base_url,
                    model_name: model,
                    temperature,
                    embeddings_enabled: embedding_model.is_some(),
                    embedding_model_name: embedding_model,
                    api_key_env,
                    kind: if ollama {
                        ProviderKind::Ollama
                    } else {
                        ProviderKind::OpenaiCompatible
                    },
                };
                providers::run_providers_add(&cfg, &cli.config, provider)?;
            }
        },
        Commands::Knowledge { action } => match action {
            KnowledgeAction::Import { file } => {
                knowledge::run_import(&cfg, &file)?;
            }
            KnowledgeAction::Export { output } => {
                knowledge::run_export(&cfg, output.as_deref())?;
            }
            KnowledgeAction::List {
                category,
                severity,
                tag,
            } => {
                knowledge::run_list(
                    &cfg,
                    category.as_deref(),
                    severity.as_deref(),
                    tag.as_deref(),
                )?;
            }
        },
    }

    Ok(())
}
