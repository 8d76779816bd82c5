//! Process entrypoint: load config, wire the orchestrator, serve HTTP,
//! drive the scheduler, and shut down cleanly on `SIGINT`/`SIGTERM`.

use homelab_sentinel::config::loader::load_default_config;
use homelab_sentinel::logging;
use homelab_sentinel::orchestrator;
use homelab_sentinel::scheduler::Scheduler;

fn bind_addr() -> String {
    std::env::var("SENTINEL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

#[tokio::main]
async fn main() {
    let config = load_default_config();

    let log_dir = std::env::var("SENTINEL_LOG_DIR").ok().map(std::path::PathBuf::from);
    logging::init(log_dir);

    let built = orchestrator::build(config).await;
    built.scheduler.start().await;

    let addr = bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "listening");

    let server = axum::serve(listener, built.router).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        tracing::error!("server error: {e}");
    }

    built.scheduler.stop().await;
    tracing::info!("shut down");
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
}
