//! HTTP surface: keep-alive route and Telegram webhook

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{process_update, CommandContext};
use crate::notify::telegram::Update;
use crate::notify::TelegramClient;

#[derive(Clone)]
pub struct WebhookState {
    pub ctx: Arc<CommandContext>,
    pub client: Arc<TelegramClient>,
    pub token: Arc<str>,
}

pub fn create_router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(keep_alive))
        .route("/webhook/:token", post(webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// GET / - liveness for external uptime pings
async fn keep_alive() -> &'static str {
    "Bot is running."
}

/// POST /webhook/{token} - one Telegram update per request
async fn webhook(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    Json(update): Json<Update>,
) -> impl IntoResponse {
    if token.as_str() != &*state.token {
        warn!("Webhook called with wrong token");
        return (StatusCode::NOT_FOUND, "Not found");
    }
    // reply asynchronously so Telegram gets its 200 straight away
    tokio::spawn(async move {
        process_update(&state.ctx, &state.client, &update).await;
    });
    (StatusCode::OK, "Webhook received")
}

/// Serve until the task is aborted
pub async fn serve(port: u16, router: Router) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
