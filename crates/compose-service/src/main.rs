//! Compose Service
//!
//! REST API for submitting composes + background workers driving them

use anyhow::{Context, Result};
use compose_service::{
    create_router, AppState, CommandPipeline, ComposeService, ComposeStore, Config, MemoryStore,
    MockPipeline, Pipeline, PipelineKind, RedisStore, StoreBackend, Worker,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compose_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Compose Service v{}", config.version);
    info!("Store: {:?}, pipeline: {:?}", config.store, config.pipeline);

    let pipeline: Arc<dyn Pipeline> = match config.pipeline {
        PipelineKind::Mock => Arc::new(MockPipeline::new(Duration::from_secs(1))),
        PipelineKind::Command => {
            let command = config
                .builder_command
                .as_deref()
                .context("COMPOSER_BUILDER_CMD is not set")?;
            std::fs::create_dir_all(&config.work_dir)
                .context("Failed to create work directory")?;

            info!("Builder command: {}", command);
            Arc::new(CommandPipeline::from_command_line(
                command,
                config.work_dir.clone(),
            )?)
        }
    };

    // The memory store is shared; Redis gets a connection per consumer
    let memory: Option<Arc<MemoryStore>> =
        (config.store == StoreBackend::Memory).then(|| Arc::new(MemoryStore::new()));

    let api_store = open_store(&config, memory.as_ref())
        .await
        .context("Failed to initialize API storage")?;

    let mut worker_handles = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let store = open_store(&config, memory.as_ref())
            .await
            .context("Failed to initialize worker storage")?;
        let worker = Worker::new(id, store, pipeline.clone());

        worker_handles.push(tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                tracing::error!("Worker error: {}", e);
            }
        }));
    }

    let service = ComposeService::new(api_store, config.version.clone());
    let app = create_router(AppState::new(Arc::new(service)));

    // Start API server
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Compose Service API running on http://{}", addr);
    info!("{} workers started, processing composes...", config.workers);

    // Run server (workers run in background)
    axum::serve(listener, app).await.context("Server error")?;

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}

async fn open_store(
    config: &Config,
    memory: Option<&Arc<MemoryStore>>,
) -> Result<Arc<dyn ComposeStore>> {
    let store: Arc<dyn ComposeStore> = match (config.store, memory) {
        (StoreBackend::Memory, Some(store)) => store.clone(),
        _ => Arc::new(RedisStore::new(&config.redis_url).await?),
    };
    Ok(store)
}
