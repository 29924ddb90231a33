//! JSON-over-HTTP control channel.
//!
//! Every request is a `POST /` whose body is a JSON object with a `request`
//! key (`ping`, `ls`, `deploy`, `enable`, `disable`, `config`/`set`, `halt`).
//! Every reply is a [`ControlResponse`]: `{"response": "...", "errors": [...]}`.

pub mod request;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::scheduler::JobRegistry;

pub use request::{dispatch, ControlResponse, PING_RESPONSE};

#[derive(Clone)]
pub struct ControlState {
    pub registry: Arc<JobRegistry>,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/", post(control_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the control channel on `listener` until `shutdown` is cancelled.
pub async fn run_control_server(
    listener: TcpListener,
    state: ControlState,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Control channel listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Control channel closed");
    Ok(())
}

async fn control_handler(
    State(state): State<ControlState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    // Non-JSON bodies are rejected before anything is dispatched
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
            return (
                rejection.status(),
                Json(ControlResponse::error(rejection.body_text())),
            );
        }
    };

    let (status, response): (StatusCode, ControlResponse) = dispatch(&state.registry, body).await;
    (status, Json(response))
}
