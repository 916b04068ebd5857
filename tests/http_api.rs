mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{alice_state, SoftAuthenticator};
use passkey_rp_server::handlers::router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> Router {
    router(alice_state().await).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Merge `username` into a serialized credential, as the client does.
fn with_username<T: serde::Serialize>(username: &str, credential: &T) -> Value {
    let mut body = serde_json::to_value(credential).unwrap();
    body["username"] = json!(username);
    body
}

#[tokio::test]
async fn health_reports_service_name() {
    let app = app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "passkey-rp-server");
}

#[tokio::test]
async fn full_ceremony_over_http() {
    let app = app().await;
    let mut authenticator = SoftAuthenticator::new();

    let (status, options) = send(&app, post("/api/auth/register/start", json!({"username": "alice"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["rp"]["id"], "localhost");
    assert_eq!(options["attestation"], "none");
    assert_eq!(options["excludeCredentials"], json!([]));
    assert_eq!(options["pubKeyCredParams"][0]["alg"], -7);
    assert_eq!(options["authenticatorSelection"]["residentKey"], "discouraged");

    let challenge = options["challenge"].as_str().unwrap();
    let body = with_username("alice", &authenticator.register(challenge));
    let (status, result) = send(&app, post("/api/auth/register/finish", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result, json!({"verified": true}));

    let (status, options) = send(&app, get("/api/auth/authenticate/start?username=alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["rpId"], "localhost");
    assert_eq!(options["allowCredentials"].as_array().unwrap().len(), 1);
    assert_eq!(options["allowCredentials"][0]["type"], "public-key");

    authenticator.sign_count = 1;
    let challenge = options["challenge"].as_str().unwrap();
    let body = with_username("alice", &authenticator.assert(challenge, None));
    let (status, result) = send(&app, post("/api/auth/authenticate/finish", body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result, json!({"verified": true}));

    // Replay
    let (status, result) = send(&app, post("/api/auth/authenticate/finish", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result["error"], "No pending challenge");
}

#[tokio::test]
async fn registration_start_accepts_query_string() {
    let app = app().await;
    let (status, options) = send(&app, get("/api/auth/register/start?username=alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["user"]["name"], "alice");
    assert_eq!(options["user"]["displayName"], "alice");
    assert_ne!(options["user"]["id"], "alice");
}

#[tokio::test]
async fn unknown_user_is_404() {
    let app = app().await;
    let (status, body) = send(&app, post("/api/auth/authenticate/start", json!({"username": "mallory"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("mallory"));
}

#[tokio::test]
async fn verification_failures_do_not_leak_the_reason() {
    let app = app().await;
    let mut authenticator = SoftAuthenticator::new();
    authenticator.origin = "https://phish.example".to_string();

    let (_, options) = send(&app, post("/api/auth/register/start", json!({"username": "alice"}))).await;
    let challenge = options["challenge"].as_str().unwrap();
    let body = with_username("alice", &authenticator.register(challenge));

    let (status, result) = send(&app, post("/api/auth/register/finish", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result, json!({"error": "Verification failed"}));
}

#[tokio::test]
async fn unverified_user_is_reported_in_the_body() {
    let app = app().await;
    let mut authenticator = SoftAuthenticator::new();
    authenticator.flags = 0;

    let (_, options) = send(&app, post("/api/auth/register/start", json!({"username": "alice"}))).await;
    let challenge = options["challenge"].as_str().unwrap();
    let body = with_username("alice", &authenticator.register(challenge));

    let (status, result) = send(&app, post("/api/auth/register/finish", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result, json!({"verified": false}));
}

#[tokio::test]
async fn malformed_assertion_is_a_json_400_and_burns_the_challenge() {
    let app = app().await;
    let mut authenticator = SoftAuthenticator::new();

    let (_, options) = send(&app, post("/api/auth/register/start", json!({"username": "alice"}))).await;
    let challenge = options["challenge"].as_str().unwrap();
    let body = with_username("alice", &authenticator.register(challenge));
    send(&app, post("/api/auth/register/finish", body)).await;

    let (_, options) = send(&app, post("/api/auth/authenticate/start", json!({"username": "alice"}))).await;
    authenticator.sign_count = 1;
    let challenge = options["challenge"].as_str().unwrap();
    let valid = with_username("alice", &authenticator.assert(challenge, None));

    let mut mangled = valid.clone();
    mangled["response"]["signature"] = json!("!!not base64!!");
    let (status, result) = send(&app, post("/api/auth/authenticate/finish", mangled)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result, json!({"error": "Bad request: Malformed credential"}));

    let (status, result) = send(&app, post("/api/auth/authenticate/finish", valid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result, json!({"error": "No pending challenge"}));
}

#[tokio::test]
async fn unparseable_bodies_get_a_json_error() {
    let app = app().await;

    let request = Request::post("/api/auth/register/finish")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let (status, result) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result, json!({"error": "Bad request: Invalid JSON body"}));

    let (status, result) = send(&app, post("/api/auth/authenticate/finish", json!({"id": "AQID"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result, json!({"error": "Bad request: Invalid JSON body"}));

    let (status, result) = send(&app, get("/api/auth/register/start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(result, json!({"error": "Bad request: Invalid query string"}));
}

#[tokio::test]
async fn cors_allows_only_the_rp_origin() {
    let app = app().await;

    let request = Request::get("/health")
        .header(header::ORIGIN, common::ORIGIN)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        common::ORIGIN
    );

    let request = Request::get("/health")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
