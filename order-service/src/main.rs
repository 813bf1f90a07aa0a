//! order-service binary
//!
//! Startup order matters: the cache is restored from the store before the
//! feed consumer is spawned, so lookups never see a cold cache for orders
//! that were committed before the restart.

use std::sync::Arc;

use order_service::api;
use order_service::config::Config;
use order_service::feed::FeedProducer;
use order_service::generator::OrderGenerator;
use order_service::state::AppState;
use order_service::tasks::{BackgroundTasks, TaskKind};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_service=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        env = %config.environment,
        policy = %config.store_failure_policy,
        "Starting order-service"
    );

    let state = AppState::new(&config).await?;

    // Warm restore; abort startup if the store cannot be enumerated
    let report = state.pipeline.start().await?;
    tracing::info!(restored = report.restored, failed = report.failed, "Warm restore complete");

    state.feed.ensure_group().await?;

    let mut tasks = BackgroundTasks::new();

    {
        let pipeline = state.pipeline.clone();
        let feed = state.feed.clone();
        let shutdown = tasks.shutdown_token();
        tasks.spawn("order_consumer", TaskKind::Worker, async move {
            if let Err(e) = pipeline.run_consumer(feed.as_ref(), shutdown).await {
                tracing::error!(error = %e, "Order consumer failed");
            }
        });
    }

    if let Some(interval) = config.generator_interval {
        let producer: Arc<dyn FeedProducer> = state.producer.clone();
        let shutdown = tasks.shutdown_token();
        tasks.spawn(
            "order_generator",
            TaskKind::Periodic,
            OrderGenerator::new(producer, interval).run(shutdown),
        );
    }

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("order-service HTTP listening on {http_addr}");
    {
        let app = api::create_router(state.pipeline.clone());
        let shutdown = tasks.shutdown_token();
        tasks.spawn("http_server", TaskKind::Listener, async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("HTTP server error: {e}");
            }
        });
    }

    tasks.log_summary();

    shutdown_signal().await;
    tasks.shutdown().await;
    state.store.pool().close().await;

    tracing::info!("order-service stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
