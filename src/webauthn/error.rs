//! Reasons a WebAuthn response can fail verification.
//!
//! These never reach the client verbatim; see `AppError::Verification`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("credential type is not public-key")]
    CredentialType,

    #[error("credential id does not match rawId")]
    CredentialIdMismatch,

    #[error("client data: {0}")]
    ClientData(String),

    #[error("client data type {found} where {expected} was expected")]
    CeremonyType { expected: &'static str, found: String },

    #[error("challenge mismatch")]
    ChallengeMismatch,

    #[error("challenge expired")]
    ChallengeExpired,

    #[error("origin mismatch")]
    OriginMismatch,

    #[error("cross-origin ceremonies are not accepted")]
    CrossOrigin,

    #[error("rp id hash mismatch")]
    RpIdMismatch,

    #[error("authenticator data: {0}")]
    AuthenticatorData(String),

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification flag not set")]
    UserNotVerified,

    #[error("attested credential data missing")]
    MissingCredentialData,

    #[error("unsupported public key algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("invalid public key: {0}")]
    PublicKey(String),

    #[error("attestation: {0}")]
    Attestation(String),

    #[error("unsupported attestation format {0}")]
    AttestationFormat(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("user handle mismatch")]
    UserHandleMismatch,

    #[error("credential id is registered to another user")]
    CredentialInUse,

    #[error("signature counter did not advance (stored {stored}, received {received})")]
    CounterRollback { stored: u32, received: u32 },
}

impl VerifyError {
    /// Failures where the ceremony itself was sound but the authenticator
    /// did not assert the required user presence / verification.
    ///
    /// These are reported to the client as `{ "verified": false }` rather
    /// than as a request error.
    pub fn is_unverified(&self) -> bool {
        matches!(self, VerifyError::UserNotPresent | VerifyError::UserNotVerified)
    }
}
