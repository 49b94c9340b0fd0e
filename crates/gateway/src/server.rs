//! HTTP surface: the webhook intake, health, and stored-media serving.
//!
//! The webhook always answers 200. Platforms retry non-2xx deliveries, and a
//! retry of a half-processed batch would replay flow steps, so events are
//! handed to the engine on detached tasks and failures stay server-side.

use std::{path::PathBuf, sync::Arc};

use {
    axum::{
        Router,
        extract::{Path, State},
        http::{StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    },
    dormbot_channel::{InboundEvent, QuotaLedger, WebhookEnvelope},
    dormbot_engine::Engine,
    serde_json::json,
    tracing::{info, warn},
};

use crate::{Result, config::Config, error::Error};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    ledger: Arc<QuotaLedger>,
    media_dir: PathBuf,
}

/// Bind and serve until the task is cancelled.
pub async fn serve(config: &Config, engine: Arc<Engine>, ledger: Arc<QuotaLedger>) -> Result<()> {
    let state = AppState {
        engine,
        ledger,
        media_dir: config.media.dir.clone(),
    };
    let app = Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .route("/media/{name}", get(media))
        .with_state(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::message(format!("cannot bind {addr}: {e}")))?;
    info!(addr, "gateway listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::message(format!("server error: {e}")))?;
    Ok(())
}

async fn webhook(State(state): State<AppState>, body: String) -> StatusCode {
    for event in parse_envelope(&body) {
        let engine = Arc::clone(&state.engine);
        tokio::spawn(async move {
            engine.handle_event(event).await;
        });
    }
    StatusCode::OK
}

/// Lenient envelope parse. A malformed or unrecognized body yields no events,
/// never an error status.
fn parse_envelope(body: &str) -> Vec<InboundEvent> {
    let envelope: WebhookEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unparseable webhook body");
            return Vec::new();
        },
    };
    envelope
        .events
        .into_iter()
        .filter_map(|event| event.normalize())
        .collect()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "sessions": state.engine.sessions().len(),
        "replies": state.ledger.replies(),
        "pushes": state.ledger.pushes(),
    }))
}

async fn media(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    let Some(path) = safe_media_path(&state.media_dir, &name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = match path.extension().and_then(|e| e.to_str()) {
                Some("png") => "image/png",
                Some("webp") => "image/webp",
                _ => "image/jpeg",
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        },
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Media filenames are uuid-based, one path segment. Anything that could
/// escape the media directory is rejected.
fn safe_media_path(dir: &std::path::Path, name: &str) -> Option<PathBuf> {
    if name.is_empty()
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.')
    {
        return None;
    }
    Some(dir.join(name))
}
