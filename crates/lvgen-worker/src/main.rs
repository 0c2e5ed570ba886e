//! Lane worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lvgen_media::{MediaConfig, MediaPostProcessor};
use lvgen_providers::ProviderRegistry;
use lvgen_queue::RedisLaneQueue;
use lvgen_storage::BlobStore;
use lvgen_store::{CreditLedger, HttpCreditLedger, InMemoryLedger, LedgerConfig, RedisTaskStore};
use lvgen_worker::{metrics, ExecutorExit, JobProcessor, LaneExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["lvgen=info", "aws_config=warn", "hyper=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting lvgen-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match metrics::init_exporter(addr) {
            Ok(()) => info!("Serving metrics on {}", addr),
            Err(e) => warn!("Metrics exporter disabled: {}", e),
        }
    }

    let store = match RedisTaskStore::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create task store: {}", e);
            std::process::exit(1);
        }
    };

    let ledger: Arc<dyn CreditLedger> = match LedgerConfig::from_env() {
        Some(cfg) => match HttpCreditLedger::new(cfg) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                error!("Failed to create credit ledger: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("LEDGER_BASE_URL not set, using an in-memory ledger");
            Arc::new(InMemoryLedger::new())
        }
    };

    let queue = match RedisLaneQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create lane queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize lanes: {}", e);
        std::process::exit(1);
    }

    let registry = ProviderRegistry::from_env();
    if registry.providers().is_empty() {
        warn!("No provider adapters configured, generation jobs will fail");
    }

    let media = match MediaPostProcessor::new(MediaConfig::from_env()) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to create media processor: {}", e);
            std::process::exit(1);
        }
    };

    let mut processor = JobProcessor::new(config.clone(), store, ledger, registry, media);
    match BlobStore::from_env() {
        Some(blobs) => processor = processor.with_blob_store(blobs),
        None => info!("Blob mirror not configured, combined videos stay in the local cache"),
    }

    let executor = Arc::new(LaneExecutor::new(Arc::new(queue), Arc::new(processor)));

    let mut runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    tokio::select! {
        result = &mut runner => exit_on_error(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            executor.shutdown();
            match tokio::time::timeout(config.shutdown_timeout, runner).await {
                Ok(result) => exit_on_error(result),
                Err(_) => warn!("Shutdown timeout elapsed with a job still running"),
            }
        }
    }

    info!("Worker shutdown complete");
}

fn exit_on_error(result: Result<lvgen_worker::WorkerResult<ExecutorExit>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(ExecutorExit::JobBudgetSpent)) => info!("Job budget spent, exiting for restart"),
        Ok(Ok(ExecutorExit::Shutdown)) => {}
        Ok(Err(e)) => {
            error!("Executor error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Executor task failed: {}", e);
            std::process::exit(1);
        }
    }
}
