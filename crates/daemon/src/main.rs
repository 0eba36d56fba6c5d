//! Daemon entry point: wiring only, no pipeline logic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use prismis_config::{Config, defaults};
use prismis_core::SourceKind;
use prismis_daemon::{LlmAnalyzer, Notifier, Orchestrator, Scheduler};
use prismis_fetchers::{ContentFetcher, FeedFetcher, FileFetcher, ForumFetcher, VideoFetcher};
use prismis_llm::{
    EmbeddingProvider, Evaluator, HttpEmbedder, LlmClient, LlmSettings, Provider, Summarizer,
};
use prismis_storage::Storage;

#[derive(Debug, Parser)]
#[command(name = "prismis-daemon", about = "Personal content-intelligence daemon")]
struct Args {
    /// Run one fetch cycle and exit.
    #[arg(long)]
    once: bool,

    /// Test mode: 5 second fetch intervals.
    #[arg(long)]
    test: bool,

    /// Config file path (default: $XDG_CONFIG_HOME/prismis/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database path (default: $XDG_DATA_HOME/prismis/prismis.db).
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Optional .env next to the config file.
    let env_path = prismis_config::config_dir().join(".env");
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }

    defaults::ensure_config_files()?;
    info!("loading configuration");
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = Arc::new(config);

    prismis_observability::init(prismis_config::observability_dir());

    // Startup LLM validation: fail fast with an actionable message before
    // any scheduling begins.
    let settings = LlmSettings::from_config(
        &config.llm.provider,
        &config.llm.model,
        &config.llm.api_key,
        config.llm.api_base.as_deref(),
    )?;
    let provider = settings.provider;
    let llm = LlmClient::new(settings)?;
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        "validating LLM configuration"
    );
    if let Err(e) = llm.health_check().await {
        error!(error = %e, "LLM connection failed");
        bail!(
            "LLM connection failed: {e}\nCheck your model name, API key, and server availability."
        );
    }
    info!("LLM connection successful");

    let db_path = args.db.clone().unwrap_or_else(prismis_config::db_path);
    let storage = Arc::new(
        Storage::open(&db_path)
            .await
            .with_context(|| format!("cannot open database at {}", db_path.display()))?,
    );

    let embedder = build_embedder(provider, &config)?;

    let mut fetchers: HashMap<SourceKind, Box<dyn ContentFetcher>> = HashMap::new();
    fetchers.insert(SourceKind::Feed, Box::new(FeedFetcher::new(&config)?));
    fetchers.insert(SourceKind::Forum, Box::new(ForumFetcher::new(&config)?));
    fetchers.insert(SourceKind::Video, Box::new(VideoFetcher::new(&config)));
    fetchers.insert(
        SourceKind::File,
        Box::new(FileFetcher::new(storage.clone())?),
    );

    let analyzer = Arc::new(LlmAnalyzer::new(
        Summarizer::new(llm.clone()),
        Evaluator::new(llm.clone()),
    ));
    let notifier = Notifier::new(
        config.notifications.high_priority_only,
        config.notifications.command.clone(),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        storage,
        fetchers,
        analyzer,
        embedder.clone(),
        notifier,
        config.clone(),
    ));

    if args.once {
        info!("running single fetch cycle");
        let stats = orchestrator.run_once(false).await;
        if !stats.errors.is_empty() && stats.items_processed == 0 {
            bail!("cycle failed: {}", stats.errors.join("; "));
        }
        return Ok(());
    }

    // Scheduler + API server until a shutdown signal arrives.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        orchestrator.clone(),
        config.daemon.fetch_interval,
        args.test,
    );
    let job_handles = scheduler.start(shutdown_rx.clone());

    let api_state = prismis_api::AppState::new(
        config.clone(),
        db_path,
        embedder,
        Arc::new(llm),
    );
    let api_shutdown = {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    };
    let api_handle = tokio::spawn(prismis_api::serve(api_state, api_shutdown));

    shutdown_signal().await;
    info!("shutdown signal received, finishing current jobs");
    let _ = shutdown_tx.send(true);

    for handle in job_handles {
        let _ = handle.await;
    }
    let _ = api_handle.await;

    info!("daemon stopped");
    Ok(())
}

/// Embeddings follow the chat provider: Ollama serves a local sentence
/// model; everything else speaks the OpenAI-compatible endpoint.
fn build_embedder(provider: Provider, config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = match provider {
        Provider::Ollama => HttpEmbedder::new(
            Provider::Ollama,
            "all-minilm",
            &config.llm.api_key,
            config.llm.api_base.clone(),
        )?,
        _ => HttpEmbedder::new(
            Provider::OpenAi,
            "text-embedding-3-small",
            &config.llm.api_key,
            None,
        )?,
    };
    Ok(Arc::new(embedder))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
