//! Dispatch queue and telephony callback handlers.

use crate::AppState;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use dialhawk_dispatch::{queue, worker, DispatchError};
use dialhawk_types::StatusCallback;
use serde_json::{json, Value};
use std::sync::Arc;

/// `GET /api/queue/depth`
pub async fn queue_depth_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let pool = state.pool.clone();
    let depth = tokio::task::spawn_blocking(move || -> Result<u32, DispatchError> {
        let conn = pool.get()?;
        queue::depth(&conn)
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("task failed: {e}") })),
        )
    })?
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(json!({ "depth": depth })))
}

/// `POST /api/calls/status` — the telephony provider's status callback.
///
/// Always acknowledged with 200: a persistence failure is logged and
/// the provider must not retry into an error loop (losing an audit
/// record is preferable to confusing the provider).
pub async fn status_callback_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(callback): Json<StatusCallback>,
) -> Json<Value> {
    let pool = state.pool.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<bool, DispatchError> {
        let conn = pool.get()?;
        worker::handle_status_callback(&conn, &callback, Utc::now())
    })
    .await;

    match result {
        Ok(Ok(redialed)) => Json(json!({ "ok": true, "redialed": redialed })),
        Ok(Err(e)) => {
            tracing::warn!("status callback processing failed: {e}");
            Json(json!({ "ok": false }))
        }
        Err(e) => {
            tracing::warn!("status callback task failed: {e}");
            Json(json!({ "ok": false }))
        }
    }
}
