//! Server lifecycle management - startup, shutdown, and signal handling

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use loyalty_core::config::ServerConfig;
use loyalty_orm::{ConnectionManager, UserStore};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{HttpError, HttpResult};
use crate::routes::{router, AppState};

/// Serve the application until Ctrl+C or SIGTERM, then close the pool.
///
/// The pool is closed on every exit path once the listener is gone.
pub async fn serve<C>(config: &ServerConfig, connections: C, users: Arc<dyn UserStore>) -> HttpResult<()>
where
    C: ConnectionManager + Clone + 'static,
{
    let state = AppState::new(Arc::new(connections.clone()), users);
    let app = router(state, config);

    let result = match bind(config).await {
        Ok(listener) => {
            serve_with_shutdown(
                listener,
                app,
                Duration::from_secs(config.shutdown_timeout),
                shutdown_signal(),
            )
            .await
        }
        Err(e) => Err(e),
    };

    connections.close().await;
    result
}

/// Bind the configured address
pub async fn bind(config: &ServerConfig) -> HttpResult<TcpListener> {
    let addr = config.bind_address();
    TcpListener::bind(&addr)
        .await
        .map_err(|e| HttpError::startup(format!("Failed to bind to {}: {}", addr, e)))
}

/// Serve `app` until `shutdown` resolves, then give in-flight requests
/// `drain_timeout` to finish
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    app: Router,
    drain_timeout: Duration,
    shutdown: F,
) -> HttpResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Server listening on {}", addr);
    }

    let (stopping_tx, mut stopping_rx) = watch::channel(false);
    let graceful = async move {
        shutdown.await;
        let _ = stopping_tx.send(true);
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|e| HttpError::server(e.to_string()));
        }
        _ = stopping_rx.changed() => {
            info!("Draining connections (up to {:?})", drain_timeout);
        }
    }

    match tokio::time::timeout(drain_timeout, server).await {
        Ok(result) => {
            result.map_err(|e| HttpError::server(e.to_string()))?;
            info!("Server exited properly");
            Ok(())
        }
        Err(_) => {
            error!("Server forced to shutdown after {:?}", drain_timeout);
            Err(HttpError::ShutdownTimedOut {
                seconds: drain_timeout.as_secs(),
            })
        }
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down gracefully...");
        },
    }
}
