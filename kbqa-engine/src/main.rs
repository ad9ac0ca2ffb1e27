//! Command line interface for the knowledge base query engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kbqa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
use kbqa_engine::retrieval::corpus::DirectoryCorpus;
use kbqa_engine::{AnalyticsSink, EngineConfig, QueryEngine};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kbqa", about = "Answer questions from a markdown knowledge base")]
struct Args {
    /// Directory holding the markdown knowledge base
    #[arg(long, default_value = "knowledge_base")]
    corpus_dir: PathBuf,

    /// Optional TOML configuration file; flags override nothing in it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the embedding model and serve keyword matches only
    #[arg(long)]
    no_embeddings: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and print the answer
    Ask {
        /// The question text
        query: String,

        /// Session identifier recorded with the interaction
        #[arg(long, default_value = "cli")]
        session: String,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Print index statistics after a fresh build
    Stats,
    /// Summarize recorded interactions
    Analytics {
        /// Trailing window in days
        #[arg(long, default_value_t = 7)]
        days: i64,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::new(&args.corpus_dir),
    };

    // The analytics subcommand never queries; skip the model load for it.
    let needs_provider = !matches!(args.command, Command::Analytics { .. });
    let provider: Option<Arc<dyn EmbeddingProvider>> = if args.no_embeddings || !needs_provider {
        None
    } else {
        match FastEmbedProvider::create(EmbedConfig::default()).await {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                warn!("embedding model unavailable, serving keyword-only: {e}");
                None
            }
        }
    };

    let analytics = AnalyticsSink::open(&config.analytics_db)
        .await
        .context("opening analytics database")?;

    match args.command {
        Command::Ask { query, session, format } => {
            let corpus = Arc::new(DirectoryCorpus::new(&config.corpus_dir));
            let engine = QueryEngine::new(config, corpus, provider, Some(analytics));
            engine.initialize().await?;

            let result = engine.answer(&query, &session).await;
            match format {
                OutputFormat::Text => {
                    println!("{}", result.answer_text);
                    if let Some(source) = &result.source_document_id {
                        println!("\n(source: {source}, confidence {:.2})", result.confidence);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
            engine.shutdown().await;
        }
        Command::Stats => {
            let corpus = Arc::new(DirectoryCorpus::new(&config.corpus_dir));
            let engine = QueryEngine::new(config, corpus, provider, None);
            engine.initialize().await?;

            let stats = engine.snapshot_stats().await;
            println!(
                "generation {}: {} documents, {} chunks ({} embedded)",
                stats.generation, stats.documents, stats.chunks, stats.embedded_chunks
            );
            analytics.close().await;
        }
        Command::Analytics { days, format } => {
            let summary = analytics.summary(days).await?;
            match format {
                OutputFormat::Text => {
                    println!("Interactions ({}):", summary.time_period);
                    println!("  total:            {}", summary.total_interactions);
                    println!("  unique sessions:  {}", summary.unique_sessions);
                    println!(
                        "  avg response:     {:.3}s",
                        summary.avg_response_time_seconds
                    );
                    for qt in &summary.question_types {
                        println!("  {:<17} {}", format!("{}:", qt.question_type), qt.count);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
            analytics.close().await;
        }
    }

    Ok(())
}
