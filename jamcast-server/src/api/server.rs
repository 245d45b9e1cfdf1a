//! HTTP server setup and routing

use crate::authority::AuthorityHandle;
use crate::error::Result;
use crate::session::Session;
use crate::streamer::ListenerRegistry;
use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub session: Arc<Session>,
    pub authority: AuthorityHandle,
    pub listeners: Arc<ListenerRegistry>,
    pub started_at: DateTime<Utc>,
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        .with_state(ctx)
}

/// Serve the status API until `shutdown` fires
pub async fn run(listener: TcpListener, ctx: AppContext, shutdown: CancellationToken) -> Result<()> {
    info!("Status API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(ctx))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Status API stopped");
    Ok(())
}
