//! Pipeline CLI entry point.
//!
//! Reads a JSON array of documents, runs them through the sync engine
//! with bounded concurrency, and checkpoints progress so interrupted
//! runs can be resumed with `--resume`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sfs_pipeline::embed::EmbeddingGenerator;
use sfs_pipeline::enrich::{AnthropicClient, ContextModel};
use sfs_pipeline::ingest::{IngestOptions, IngestRunner};
use sfs_pipeline::store::ChunkStore;
use sfs_pipeline::sync::SyncEngine;
use sfs_pipeline::types::{Document, PipelineConfig};

struct CliArgs {
    input: Option<PathBuf>,
    progress: PathBuf,
    limit: Option<usize>,
    resume: bool,
    estimate: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut parsed = CliArgs {
        input: None,
        progress: PathBuf::from("ingest-progress.json"),
        limit: None,
        resume: false,
        estimate: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" => {
                let value = args.next().context("--input requires a path")?;
                parsed.input = Some(PathBuf::from(value));
            }
            "--progress" => {
                let value = args.next().context("--progress requires a path")?;
                parsed.progress = PathBuf::from(value);
            }
            "--limit" => {
                let value = args.next().context("--limit requires a number")?;
                parsed.limit = Some(value.parse().context("--limit must be a number")?);
            }
            "--resume" => parsed.resume = true,
            "--estimate" => parsed.estimate = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

fn print_usage() {
    println!(
        "Usage: sfs-pipeline [OPTIONS]\n\n\
         Options:\n\
         \x20 --input <path>     JSON array of documents to ingest\n\
         \x20 --progress <path>  Checkpoint file (default: ingest-progress.json)\n\
         \x20 --limit <n>        Process at most n documents\n\
         \x20 --resume           Resume from the checkpoint cursor\n\
         \x20 --estimate         Report stored chunks missing prefixes or embeddings\n\
         \x20 -h, --help         Show this help"
    );
}

async fn load_documents(path: &PathBuf) -> Result<Vec<Document>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sfs_pipeline=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();
    let args = parse_args()?;

    info!("Starting sfs-pipeline v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(ChunkStore::open(&config.database_path).await?);

    if args.estimate {
        let total = store.count().await?;
        let missing_prefix = store.count_missing_prefix().await?;
        let missing_embedding = store.count_missing_embedding().await?;
        println!("{total} chunks stored");
        println!("{missing_prefix} missing a context prefix");
        println!("{missing_embedding} missing an embedding");
        return Ok(());
    }

    let input = args
        .input
        .context("--input is required unless --estimate is given")?;
    let documents = load_documents(&input).await?;
    info!(documents = documents.len(), input = %input.display(), "loaded documents");

    let openai_key = config.require_openai_key()?.to_string();
    let embedder = Arc::new(EmbeddingGenerator::new(openai_key, config.embed.clone()));
    let context_model: Option<Arc<dyn ContextModel>> =
        config.anthropic_api_key.as_deref().map(|key| {
            Arc::new(AnthropicClient::new(key, config.context_model.clone()))
                as Arc<dyn ContextModel>
        });
    if context_model.is_none() {
        info!("ANTHROPIC_API_KEY not set, chunks will be stored without context prefixes");
    }

    let engine = Arc::new(SyncEngine::new(
        store,
        context_model,
        embedder,
        config.clone(),
    ));
    let runner = IngestRunner::new(engine, args.progress, config.max_concurrency);

    let options = IngestOptions {
        resume: args.resume,
        limit: args.limit,
        ..Default::default()
    };
    let summary = runner.run(documents, &options).await?;

    println!(
        "{} processed ({} skipped), {} failed, {} chunks created, {} embedded",
        summary.processed,
        summary.skipped,
        summary.failed,
        summary.chunks_created,
        summary.chunks_embedded
    );
    if summary.aborted {
        bail!("run aborted after repeated failures, rerun with --resume to continue");
    }
    Ok(())
}
