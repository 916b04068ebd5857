//! # WebAuthn Module
//!
//! Server side of the passkey ceremonies.
//!
//! ## Submodules
//! - `types`: request/response types for the API
//! - `registration`: creating new passkey credentials
//! - `authentication`: logging in with existing passkeys
//! - `verify`: pure verification of authenticator responses
//! - `authenticator_data`, `cose`: binary structures inside those responses
//! - `locks`: per-user serialization of ceremony steps
//!
//! ## WebAuthn Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. Client requests options → `registration::start_registration()`
//! 2. Server stores a fresh challenge for the user and returns the options
//! 3. Client runs `navigator.credentials.create()` with its authenticator
//! 4. Client posts the credential → `registration::finish_registration()`
//! 5. Server verifies it and stores the public key
//!
//! ### Authentication (Logging In)
//! 1. Client requests options → `authentication::start_authentication()`
//! 2. Server stores a fresh challenge and lists the user's credentials
//! 3. Client runs `navigator.credentials.get()`
//! 4. Client posts the assertion → `authentication::finish_authentication()`
//! 5. Server verifies the signature with the stored key and advances the counter

pub mod authentication;
pub mod authenticator_data;
pub mod cose;
pub mod error;
pub mod locks;
pub mod registration;
pub mod types;
pub mod verify;

use crate::codec;
use crate::config::Config;
use crate::db::models::{Ceremony, Credential, PendingChallenge};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use error::VerifyError;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use types::{CredentialDescriptor, PUBLIC_KEY_TYPE};

/// Number of random bytes in every challenge.
pub const CHALLENGE_LEN: usize = 32;

/// The relying party identity and the verification policy derived from
/// configuration.
#[derive(Debug, Clone)]
pub struct RelyingParty {
    pub name: String,
    pub id: String,
    /// Origin exactly as browsers serialize it
    pub origin: String,
    /// SHA-256 of `id`, compared against `rpIdHash` in authenticator data
    pub id_hash: [u8; 32],
    pub timeout_ms: u64,
    pub challenge_ttl: chrono::Duration,
    pub require_user_verification: bool,
}

impl RelyingParty {
    pub fn from_config(config: &Config) -> Self {
        let id_hash: [u8; 32] = Sha256::digest(config.rp_id.as_bytes()).into();

        Self {
            name: config.rp_name.clone(),
            id: config.rp_id.clone(),
            origin: config.normalized_origin(),
            id_hash,
            timeout_ms: config.ceremony_timeout_ms,
            // bounded by config validation
            challenge_ttl: chrono::Duration::seconds(config.challenge_ttl_secs as i64),
            require_user_verification: config.require_user_verification,
        }
    }
}

/// A fresh base64url-encoded challenge.
pub fn new_challenge() -> String {
    codec::encode(&codec::random_bytes(CHALLENGE_LEN))
}

/// Descriptors for a user's credentials, used for both `excludeCredentials`
/// and `allowCredentials`.
pub(crate) fn descriptors(credentials: &[Credential]) -> Vec<CredentialDescriptor> {
    credentials
        .iter()
        .map(|c| CredentialDescriptor {
            id: c.credential_id.clone().into(),
            type_: PUBLIC_KEY_TYPE.to_string(),
            transports: c.transports.clone(),
        })
        .collect()
}

/// The challenge a finish call must be verified against.
///
/// The caller has already cleared it from the store; this only decides
/// whether the consumed value is usable for `ceremony`.
pub(crate) fn consume_challenge(
    rp: &RelyingParty,
    pending: Option<PendingChallenge>,
    ceremony: Ceremony,
) -> AppResult<String> {
    let pending = match pending {
        Some(p) if p.ceremony == ceremony => p,
        _ => return Err(AppError::NoPendingChallenge),
    };

    if pending.is_expired(Utc::now(), rp.challenge_ttl) {
        return Err(VerifyError::ChallengeExpired.into());
    }

    Ok(pending.challenge)
}

/// Parse the credential half of a finish request.
///
/// Library error text goes to the log only; the client sees a fixed message.
pub(crate) fn parse_credential<T: DeserializeOwned>(credential: &serde_json::Value) -> AppResult<T> {
    serde_json::from_value(credential.clone()).map_err(|e| {
        tracing::debug!(error = %e, "Malformed credential in finish request");
        AppError::BadRequest("Malformed credential".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rp() -> RelyingParty {
        RelyingParty {
            name: "Test".to_string(),
            id: "localhost".to_string(),
            origin: "http://localhost:8080".to_string(),
            id_hash: Sha256::digest(b"localhost").into(),
            timeout_ms: 60_000,
            challenge_ttl: chrono::Duration::seconds(300),
            require_user_verification: false,
        }
    }

    #[test]
    fn malformed_credentials_are_bad_requests() {
        let credential = serde_json::json!({ "id": "AQID", "rawId": "!!not base64!!" });
        let err = parse_credential::<types::AuthenticationResponse>(&credential).unwrap_err();
        match err {
            AppError::BadRequest(msg) => assert_eq!(msg, "Malformed credential"),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn challenges_are_random_and_32_bytes() {
        let a = new_challenge();
        let b = new_challenge();
        assert_ne!(a, b);
        assert_eq!(codec::decode(&a).unwrap().len(), CHALLENGE_LEN);
    }

    #[test]
    fn consume_requires_matching_ceremony() {
        let rp = rp();
        let pending = PendingChallenge::new("abc".to_string(), Ceremony::Registration);

        assert_eq!(
            consume_challenge(&rp, Some(pending.clone()), Ceremony::Registration).unwrap(),
            "abc"
        );
        assert!(matches!(
            consume_challenge(&rp, Some(pending), Ceremony::Authentication),
            Err(AppError::NoPendingChallenge)
        ));
        assert!(matches!(
            consume_challenge(&rp, None, Ceremony::Registration),
            Err(AppError::NoPendingChallenge)
        ));
    }

    #[test]
    fn consume_rejects_stale_challenges() {
        let rp = rp();
        let mut pending = PendingChallenge::new("abc".to_string(), Ceremony::Authentication);
        pending.issued_at = Utc::now() - chrono::Duration::seconds(301);

        assert!(matches!(
            consume_challenge(&rp, Some(pending), Ceremony::Authentication),
            Err(AppError::Verification(VerifyError::ChallengeExpired))
        ));
    }
}
