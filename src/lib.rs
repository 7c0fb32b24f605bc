//! kotipat - A minimal ActivityPub endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Inbox (signed deliveries)                                │
//! │  - Local objects, WebFinger, NodeInfo                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Federation Layer                          │
//! │  - HTTP Signature verification                              │
//! │  - Actor key resolution                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: Signature verification and key resolution
//! - `data`: Object store
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus collectors

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

/// Inbound request bodies larger than this are refused before verification.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Object store
    pub db: Arc<data::Database>,

    /// Inbound HTTP Signature verifier
    pub verifier: Arc<federation::SignatureVerifier>,
}

impl AppState {
    /// Initialize application state
    ///
    /// Actor keys are fetched over HTTP.
    ///
    /// # Errors
    /// Returns error if the database or HTTP client cannot be set up
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let resolver = federation::HttpKeyResolver::from_config(&config.federation)?;
        Self::with_key_resolver(config, Arc::new(resolver)).await
    }

    /// Initialize application state with a custom key resolver
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build the signature verifier for `server.domain`
    pub async fn with_key_resolver(
        config: config::AppConfig,
        resolver: Arc<dyn federation::KeyResolver>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        let verifier = federation::SignatureVerifier::new(config.server.domain.clone(), resolver);

        tracing::info!(
            federation_host = %verifier.federation_host(),
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            verifier: Arc::new(verifier),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
