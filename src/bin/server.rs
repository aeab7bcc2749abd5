//! Process entry point: load configuration, build the engine, serve HTTP (§4.14).

use anyhow::{Context, Result};
use kurbisio::auth::HeaderAuthorizer;
use kurbisio::engine::{Engine, EngineConfig};
use kurbisio::interceptor::InterceptorRegistry;
use kurbisio::jobs::{EventRegistry, JobWorkerPoolConfig};
use kurbisio::notification::NotificationRegistry;
use kurbisio::Config;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,kurbisio=debug,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let document = config.load_resource_config()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    let engine_config = EngineConfig {
        schema_name: config.schema_name.clone(),
        force_migration: false,
        default_presigned_ttl: Duration::from_secs(config.default_presigned_url_ttl_secs),
        worker_pool: JobWorkerPoolConfig {
            concurrency: config.pipeline_concurrency,
            ..JobWorkerPoolConfig::default()
        },
    };

    let engine = Engine::build(
        pool,
        &document,
        HashMap::new(),
        Arc::new(HeaderAuthorizer),
        None,
        Arc::new(InterceptorRegistry::new()),
        Arc::new(NotificationRegistry::new()),
        Arc::new(EventRegistry::new()),
        engine_config,
    )
    .await
    .context("failed to build engine from configuration document")?;
    let engine = Arc::new(engine);

    let shutdown = CancellationToken::new();
    let worker_handles = engine.job_pool.spawn(shutdown.clone());

    let app = kurbisio::server::build_router(engine);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;

    tracing::info!(port = config.port, "kurbisio server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
    tracing::info!("shutdown signal received");
}
