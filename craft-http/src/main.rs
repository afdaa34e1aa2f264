use std::future::IntoFuture;
use std::sync::Arc;

use craft_core::{CraftConfig, PipelineOrchestrator, StageRunner};
use craft_infer::{GenerationService, HttpGenerationService, StaticGenerationService};
use craft_manual::ManualAssembler;
use craft_sched::{spawn_worker, InMemoryTaskQueue};
use craft_store::{BlobStore, FsBlobStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod routes;

use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = CraftConfig::from_env()?;

    let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&cfg.store_root));
    let generator: Arc<dyn GenerationService> = if cfg.generation_stub {
        match &cfg.fixtures {
            Some(path) => Arc::new(StaticGenerationService::from_path(path)?),
            None => {
                warn!("generation stub enabled without CRAFT_FIXTURES; every stage will fail");
                Arc::new(StaticGenerationService::new())
            }
        }
    } else {
        Arc::new(HttpGenerationService::new(cfg.generation_url.clone()))
    };

    let manuals = Arc::new(
        ManualAssembler::new(store.clone(), Arc::new(cfg.renderer()), cfg.scratch_root.clone())
            .with_preview(cfg.preview())
            .with_labels(cfg.labels()?)
            .with_join_policy(cfg.join_policy),
    );
    let runner = Arc::new(
        StageRunner::new(store.clone(), generator, manuals).with_join_policy(cfg.join_policy),
    );

    // Request handlers only enqueue; this loop runs the stages.
    let queue = Arc::new(InMemoryTaskQueue::new());
    let worker = spawn_worker(queue.clone(), runner);

    let orch = Arc::new(PipelineOrchestrator::new(store, queue).with_join_policy(cfg.join_policy));
    let app = routes::app(AppState { orch }, cfg.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await?;
    info!(
        addr = %cfg.bind,
        store = %cfg.store_root.display(),
        stub = cfg.generation_stub,
        "plancraft HTTP server listening"
    );
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        stopped = worker => {
            error!(result = ?stopped, "pipeline worker stopped; shutting down");
            anyhow::bail!("pipeline worker stopped");
        }
    }

    Ok(())
}
