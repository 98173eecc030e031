use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use vnc_orchestrator::config::Config;
use vnc_orchestrator::orchestrator::Orchestrator;
use vnc_orchestrator::runtime::{ContainerRuntime, DockerRuntime};
use vnc_orchestrator::{http, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _log_guard = logging::init(&log_dir)?;

    info!(
        "vnc-orchestrator v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env();

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);

    let orchestrator = Arc::new(Orchestrator::start(config.clone(), runtime).await);

    let app = http::router(orchestrator.clone());
    let addr = format!("0.0.0.0:{}", config.server.orchestrator_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(addr, "listening for requests");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "http server error");
    }

    info!("shutting down");
    orchestrator.shutdown().await;

    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM - whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
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
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
