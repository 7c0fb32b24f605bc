//! Well-known endpoints
//!
//! - /.well-known/webfinger
//! - /.well-known/nodeinfo
//! - /.well-known/nodeinfo/2.1

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::federation::{generate_webfinger_response, parse_acct_resource};

const NODEINFO_2_1_SCHEMA: &str = "http://nodeinfo.diaspora.software/ns/schema/2.1";

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
/// - GET /.well-known/nodeinfo
/// - GET /.well-known/nodeinfo/2.1
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/.well-known/nodeinfo", get(nodeinfo_links))
        .route("/.well-known/nodeinfo/2.1", get(nodeinfo))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for local actors.
///
/// Query: ?resource=acct:user@domain
///
/// The actor is the stored public object at `<base_url>/db/<user>`.
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let resource = &query.resource;
    let username = parse_acct_resource(resource, &state.config.server.domain)?;

    let base_url = state.config.server.base_url();
    let actor_url = format!("{}/db/{}", base_url, username);

    state
        .db
        .get_public_object(&actor_url, &format!("{}/", base_url))
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::debug!(%username, "WebFinger lookup");

    Ok((
        [(header::CONTENT_TYPE, "application/jrd+json; charset=utf-8")],
        Json(generate_webfinger_response(resource, &actor_url)),
    ))
}

/// GET /.well-known/nodeinfo
///
/// Returns links to nodeinfo documents.
async fn nodeinfo_links(State(state): State<AppState>) -> Json<serde_json::Value> {
    let base_url = state.config.server.base_url();
    Json(serde_json::json!({
        "links": [
            {
                "rel": NODEINFO_2_1_SCHEMA,
                "href": format!("{}/.well-known/nodeinfo/2.1", base_url)
            }
        ]
    }))
}

/// GET /.well-known/nodeinfo/2.1
///
/// Returns NodeInfo 2.1 document.
async fn nodeinfo(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let local_posts = state
        .db
        .count_local_objects(&format!("{}/", state.config.server.base_url()))
        .await?;

    let document = serde_json::json!({
        "version": "2.1",
        "software": {
            "name": "kotipat",
            "version": env!("CARGO_PKG_VERSION")
        },
        "protocols": ["activitypub"],
        "services": {
            "inbound": [],
            "outbound": []
        },
        "openRegistrations": false,
        "usage": {
            "users": {
                "total": 1
            },
            "localPosts": local_posts
        },
        "metadata": {}
    });

    Ok((
        [(
            header::CONTENT_TYPE,
            "application/json; profile=\"http://nodeinfo.diaspora.software/ns/schema/2.1#\"; charset=utf-8",
        )],
        Json(document),
    ))
}
