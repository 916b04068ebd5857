//! # Passkey Relying-Party Server
//!
//! Issues WebAuthn challenges, verifies the signed responses authenticators
//! return, and keeps per-user credential state.
//!
//! ## Modules
//! - `webauthn`: registration and authentication ceremonies plus response verification
//! - `db`: the `CredentialStore` trait with in-memory and SQLite implementations
//! - `codec`: base64url and constant-time byte helpers
//! - `handlers`: axum routes over the ceremonies
//! - `config`, `error`, `state`: configuration, error mapping, shared state

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod state;
pub mod webauthn;
