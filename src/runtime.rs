use std::sync::Arc;

use axum::Router;
use axum::extract::Extension;
use axum::routing::get;
use tokio::net::TcpListener;

use crate::config::WatchConfig;
use crate::context::WatchState;
use crate::error::Result;
use crate::handler::watch;
use watchpage_streams::StreamsClient;

/// High-level runtime that serves the watch page with a fixed configuration.
pub struct WatchRuntime {
    config: WatchConfig,
}

impl WatchRuntime {
    /// Creates a runtime with the provided configuration.
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// Consumes the runtime and serves until a shutdown signal arrives.
    pub async fn serve(self) -> Result<()> {
        serve(self.config).await
    }
}

/// Builds the `/watch` router with the streams client and page settings attached.
pub fn app(config: &WatchConfig) -> Result<Router> {
    let streams =
        StreamsClient::with_timeout(config.streams_endpoint.clone(), config.upstream_timeout)?;
    let state = WatchState {
        streams,
        settings: Arc::new(config.page_settings()),
    };

    Ok(Router::new()
        .route("/watch", get(watch))
        .layer(Extension(state)))
}

/// Serves the watch page with the provided configuration.
pub async fn serve(config: WatchConfig) -> Result<()> {
    let router = app(&config)?;
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        upstream = %config.streams_endpoint,
        policy = %config.policy,
        player = %config.player,
        "watchpage listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Loads [`WatchConfig`] from the environment and starts serving.
pub async fn run() -> Result<()> {
    let config = WatchConfig::from_env()?;
    serve(config).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutting down");
}
