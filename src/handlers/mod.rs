//! # HTTP Request Handlers
//!
//! Thin adapters between axum and the ceremony engines. Each handler
//! extracts the request, calls one engine operation and returns its JSON.
//!
//! ## Submodules
//! - `health`: Health check endpoint (for monitoring)
//! - `auth`: Registration and authentication ceremony endpoints
//!
//! ## Routes
//! | Method   | Path                           |
//! |----------|--------------------------------|
//! | GET      | `/health`                      |
//! | GET/POST | `/api/auth/register/start`     |
//! | POST     | `/api/auth/register/finish`    |
//! | GET/POST | `/api/auth/authenticate/start` |
//! | POST     | `/api/auth/authenticate/finish`|

pub mod auth;
pub mod health;

use crate::state::AppState;
use anyhow::Context;
use auth::*;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use health::health_check;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// Cross-origin requests are only allowed from the relying party origin;
/// browsers would refuse the ceremony from anywhere else anyway.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&state.rp.origin)
        .with_context(|| format!("origin '{}' is not a valid header value", state.rp.origin))?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health_check))
        // Registration flow (creating a new passkey)
        .route(
            "/api/auth/register/start",
            get(register_start_query).post(register_start),
        )
        .route("/api/auth/register/finish", post(register_finish))
        // Authentication flow (logging in with a passkey)
        .route(
            "/api/auth/authenticate/start",
            get(authenticate_start_query).post(authenticate_start),
        )
        .route("/api/auth/authenticate/finish", post(authenticate_finish))
        // Layers run bottom-up
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}
