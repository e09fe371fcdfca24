//! Webhook surface — the daemon's HTTP front door.
//!
//! One POST endpoint, signature-checked before anything else. A delivery
//! that fails returns 500 so the forge's own redelivery mechanism retries
//! it; the pipeline is built to converge when re-run.

pub mod event;
pub mod signature;

use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::AppContext;
use event::{InstallationEvent, PullRequestEvent};

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !signature::verify(&ctx.config.webhook_secret, &body, signature) {
        warn!("webhook delivery with missing or invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let event_kind = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let delivery = headers
        .get("x-github-delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match dispatch(&ctx, &event_kind, &body).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            // 500 asks the forge to redeliver; the pass re-derives all state
            // so a retry converges.
            error!(event = %event_kind, delivery = %delivery, err = ?err, "webhook delivery failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn dispatch(ctx: &AppContext, event_kind: &str, body: &[u8]) -> anyhow::Result<()> {
    match event_kind {
        "ping" => Ok(()),
        "pull_request" => {
            let payload: PullRequestEvent =
                serde_json::from_slice(body).context("pull_request payload")?;
            match payload.action.as_str() {
                "opened" | "synchronize" => {
                    crate::pipeline::process_pull_request(ctx, &payload).await
                }
                other => {
                    info!(action = other, "ignoring pull_request action");
                    Ok(())
                }
            }
        }
        "installation" => {
            let payload: InstallationEvent =
                serde_json::from_slice(body).context("installation payload")?;
            if payload.action == "created" {
                crate::pipeline::clone_installation_repos(ctx, &payload).await
            } else {
                info!(action = %payload.action, "ignoring installation action");
                Ok(())
            }
        }
        other => {
            info!(event = other, "ignoring event");
            Ok(())
        }
    }
}
