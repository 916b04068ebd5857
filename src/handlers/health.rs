//! # Health Check Handler
//!
//! Used by load balancers and monitoring systems to see whether the server
//! is up.

use axum::Json;
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "healthy",
///   "service": "passkey-rp-server"
/// }
/// ```
///
/// Never touches the store, so it answers even when the database is down.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME")
    }))
}
