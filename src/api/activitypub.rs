//! ActivityPub endpoints
//!
//! - Inbox (signed delivery receiving)
//! - Local object lookup

use axum::body::Bytes;
use axum::{
    Router,
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};

use crate::AppState;
use crate::error::AppError;
use crate::federation::InboundRequest;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL, OBJECTS_STORED_TOTAL};

const ACTIVITY_JSON: &str = "application/activity+json";

/// Create ActivityPub router
///
/// Routes:
/// - POST /inbox - Signed delivery
/// - GET /db/*path - Local object
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/inbox", post(inbox))
        .route("/db/*path", get(get_object))
}

/// POST /inbox
///
/// Receives signed ActivityPub deliveries.
///
/// # Steps
/// 1. Verify HTTP Signature (nothing is read from the body before this)
/// 2. Parse the body and read its `id`
/// 3. Store it under the verified `keyId`
async fn inbox(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/inbox"])
        .start_timer();

    let identity = state
        .verifier
        .verify(&InboundRequest {
            method: method.as_str(),
            path: uri.path(),
            headers: &headers,
        })
        .await?;

    let object: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))?;

    // TODO: check that the verified identity may publish under this id's origin.
    let object_id = object
        .get("id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| AppError::Validation("Missing id field".to_string()))?;

    state
        .db
        .insert_object(object_id, identity.as_str(), &object)
        .await?;

    tracing::info!(
        object_id,
        key_id = %identity,
        object_type = object.get("type").and_then(|t| t.as_str()).unwrap_or("unknown"),
        "Stored inbound object"
    );
    OBJECTS_STORED_TOTAL.inc();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/inbox", "202"])
        .inc();

    Ok(StatusCode::ACCEPTED)
}

/// GET /db/*path
///
/// Returns a stored object deposited by a local identity.
///
/// Content-Type: application/activity+json, whatever `Accept` asks for.
/// There is no HTML rendering.
async fn get_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/db/*path"])
        .start_timer();

    let base_url = state.config.server.base_url();
    let url = format!("{}/db/{}", base_url, path);
    let object = state
        .db
        .get_public_object(&url, &format!("{}/", base_url))
        .await?
        .ok_or(AppError::NotFound)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/db/*path", "200"])
        .inc();

    Ok(([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(object)))
}
