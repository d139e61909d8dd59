//! Bind and serve with graceful shutdown, grounded on
//! `r2e-core/src/builder.rs`'s `AppBuilder::serve()` /
//! `shutdown_signal()`.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use buntime_plugin::PluginRegistry;
use buntime_pool::Pool;

/// Bind `addr`, run `router` until a shutdown signal arrives, then drain
/// the pool and the plugin registry in that order (spec §4.6).
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    pool: Pool,
    plugins: std::sync::Arc<PluginRegistry>,
    shutdown_grace: Duration,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "buntime listening");
    plugins.on_server_start(addr).await;

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown signal handled, draining pool");
    pool.shutdown(shutdown_grace).await;
    plugins.shutdown(Duration::from_secs(5)).await;
    tracing::info!("buntime stopped");
    Ok(())
}

/// Wait for Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
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
