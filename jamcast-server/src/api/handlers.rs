//! HTTP request handlers

use crate::api::server::AppContext;
use crate::authority::ClientId;
use axum::{extract::State, Json};
use jamcast_common::PlaybackState;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: PlaybackState,
    pub position: usize,
    pub total_samples: usize,
    pub sample_rate: u32,
    pub track: String,
    pub track_index: usize,
    pub playlist_len: usize,
    pub listeners: usize,
    pub command_clients: usize,
    pub master: Option<ClientId>,
    pub started_at: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "jamcast-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - Snapshot of the broadcast session
pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let snap = ctx.session.clock().snapshot();
    let track = ctx.session.now_playing();
    // An exited authority reports no control clients
    let control = ctx.authority.status().await;

    Json(StatusResponse {
        state: snap.state,
        position: snap.position,
        total_samples: snap.total_samples,
        sample_rate: snap.sample_rate,
        track: track.name,
        track_index: track.index,
        playlist_len: ctx.session.playlist_len(),
        listeners: ctx.listeners.count(),
        command_clients: control.as_ref().map(|s| s.clients).unwrap_or(0),
        master: control.and_then(|s| s.master),
        started_at: ctx.started_at.to_rfc3339(),
    })
}
