//! GovRAG — question answering over government service documents.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use govrag_chat::{LlmSettings, ProviderGateway};
use govrag_core::GovRagConfig;
use govrag_server::{build_router, search_defaults, AppState};
use govrag_store::VectorIndex;

fn resolve_data_dir() -> PathBuf {
    std::env::var("GOVRAG_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("GovRAG — grounded answers over government service documents");
    println!();
    println!("Usage: govrag [command]");
    println!();
    println!("Commands:");
    println!("  (none)               Start the server");
    println!("  ingest [dir]         Ingest a directory (default: documents dir) and exit");
    println!("  help                 Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let ingest_only = match args.get(1).map(String::as_str) {
        None => None,
        Some("ingest") => Some(args.get(2).map(PathBuf::from)),
        Some("--help" | "-h" | "help") => {
            print_help();
            return Ok(());
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'govrag help' for usage.", other);
            std::process::exit(1);
        }
    };

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = GovRagConfig::from_env(&data_dir)?;
    let port = config.port;

    let index = VectorIndex::open(
        &config.data_paths.vectordb,
        config.embedding_dim,
        search_defaults(&config),
    )
    .context("Failed to open vector index")?;
    let index = Arc::new(index);

    let embedder = govrag_infer::create_embedder(&config);
    if embedder.dimension() != config.embedding_dim {
        anyhow::bail!(
            "Embedder {} produces {}-dim vectors but the index expects {}",
            embedder.name(),
            embedder.dimension(),
            config.embedding_dim
        );
    }

    let settings = LlmSettings::load(&config.data_paths.llm_config_file);
    let gateway = ProviderGateway::from_settings(&settings, config.request_timeout(), config.retry)?;

    let state = Arc::new(AppState::new(config, index, embedder, gateway, settings)?);

    if let Some(dir) = ingest_only {
        let dir = dir.unwrap_or_else(|| state.config.data_paths.documents.clone());
        let orchestrator = state.orchestrator.clone();
        let summary = tokio::task::spawn_blocking(move || orchestrator.ingest(&dir, false)).await??;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    bootstrap(&state).await;
    state.orchestrator.start_worker();

    let app = build_router(state.clone());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("GovRAG server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Populate an empty index from the documents directory before serving.
async fn bootstrap(state: &Arc<AppState>) {
    if !state.config.bootstrap_ingest || !state.index.is_empty() {
        return;
    }
    let dir = state.config.data_paths.documents.clone();
    info!("Index is empty; ingesting {}", dir.display());

    let orchestrator = state.orchestrator.clone();
    match tokio::task::spawn_blocking(move || orchestrator.ingest(&dir, true)).await {
        Ok(Ok(summary)) => info!(
            "Bootstrap ingested {} documents ({} chunks, {} failures)",
            summary.documents_processed,
            summary.chunks_indexed,
            summary.failures.len()
        ),
        Ok(Err(e)) => warn!("Bootstrap ingestion failed: {}", e),
        Err(e) => warn!("Bootstrap ingestion task failed: {}", e),
    }
}
