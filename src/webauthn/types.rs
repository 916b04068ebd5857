//! # WebAuthn API Types
//!
//! Request/response types for the ceremony endpoints, following the WebAuthn
//! JSON serialization (`PublicKeyCredentialCreationOptionsJSON`,
//! `RegistrationResponseJSON` and friends). Binary fields are
//! [`Base64UrlBytes`], so they are raw bytes once deserialized.
//!
//! ## API Flow
//! Each ceremony has two steps:
//! - Start: server issues options containing a fresh challenge
//! - Finish: client returns the authenticator's signed response

use crate::codec::Base64UrlBytes;
use crate::db::models::Transport;
use serde::{Deserialize, Serialize};

pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Relying party identity as shown to the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Opaque user handle, never the username
    pub id: Base64UrlBytes,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    pub alg: i64,
    #[serde(rename = "type")]
    pub type_: String,
}

/// A credential reference in `excludeCredentials` / `allowCredentials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<Transport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Discouraged,
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: ResidentKeyRequirement,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// Options for `navigator.credentials.create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Milliseconds; a hint for the client, the server enforces its own TTL
    pub timeout: u64,
    pub attestation: AttestationConveyance,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
}

/// Options for `navigator.credentials.get()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String,
    pub rp_id: String,
    pub timeout: u64,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlBytes,
    pub attestation_object: Base64UrlBytes,
    /// Missing transports are treated as an empty set
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Result of `navigator.credentials.create()` as serialized by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AttestationResponse,
    #[serde(default)]
    pub client_extension_results: serde_json::Value,
    #[serde(default)]
    pub authenticator_attachment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlBytes,
    pub authenticator_data: Base64UrlBytes,
    pub signature: Base64UrlBytes,
    #[serde(default)]
    pub user_handle: Option<Base64UrlBytes>,
}

/// Result of `navigator.credentials.get()` as serialized by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AssertionResponse,
    #[serde(default)]
    pub client_extension_results: serde_json::Value,
    #[serde(default)]
    pub authenticator_attachment: Option<String>,
}

/// Outcome of a finish call. `verified: false` is a normal answer, not an
/// error: the ceremony ran but the authenticator did not satisfy policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
}

/// Request to start either ceremony.
///
/// ## Example JSON
/// ```json
/// { "username": "alice" }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub username: String,
}

/// Request to complete either ceremony: the username plus the credential
/// fields flattened alongside it.
///
/// The credential stays untyped here. It is parsed by the ceremony engine
/// only after the user's pending challenge has been cleared, so a
/// malformed body still burns the challenge.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinishRequest {
    pub username: String,
    #[serde(flatten)]
    pub credential: serde_json::Value,
}
