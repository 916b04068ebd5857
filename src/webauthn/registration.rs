//! # Passkey Registration Logic
//!
//! Server side of creating a new passkey for an existing user.
//! Registration is a two-step process: begin and finish.
//!
//! ## Registration Flow
//! 1. **Begin**: Generate a challenge → store it → send options to the client
//! 2. **Finish**: Consume the challenge → verify the attestation → store the public key
//!
//! ## Security Concepts
//! - **Challenge**: Random value the authenticator must sign over, so a
//!   response cannot be replayed into a later ceremony
//! - **Public Key Cryptography**: The server stores the public key; the
//!   private key stays on the device
//! - **Attestation**: Only `none` and self-attested `packed` are accepted

use super::cose::SUPPORTED_ALGORITHMS;
use super::types::{
    AttestationConveyance, AuthenticatorSelection, PubKeyCredParam, RegistrationOptions,
    RegistrationResponse, RelyingPartyEntity, ResidentKeyRequirement, UserEntity,
    UserVerificationRequirement, Verification, PUBLIC_KEY_TYPE,
};
use super::error::VerifyError;
use super::{consume_challenge, descriptors, new_challenge, parse_credential, verify};
use crate::db::models::{parse_transports, AddCredential, Ceremony, Credential, PendingChallenge};
use crate::error::AppResult;
use crate::state::AppState;
use chrono::Utc;
use serde_json::Value;

/// Begin passkey registration for `username`.
///
/// ## Flow
/// 1. Look up the user and take their ceremony lock
/// 2. Generate a fresh 32-byte challenge
/// 3. Store it as the user's pending challenge, replacing any earlier one
/// 4. Return the creation options, excluding credentials already enrolled
///
/// ## Errors
/// - NotFound: Unknown username
/// - Database: Challenge storage failed
pub async fn begin_registration(state: &AppState, username: &str) -> AppResult<RegistrationOptions> {
    let user = state.store.find_user_by_username(username).await?;
    let _guard = state.locks.acquire(&user.id).await;
    // Re-read under the lock so the exclude list is current.
    let user = state.store.find_user_by_username(username).await?;

    let challenge = new_challenge();
    let rp = &state.rp;

    let options = RegistrationOptions {
        challenge: challenge.clone(),
        rp: RelyingPartyEntity {
            name: rp.name.clone(),
            id: rp.id.clone(),
        },
        user: UserEntity {
            id: user.user_handle.clone().into(),
            name: user.username.clone(),
            display_name: user.username.clone(),
        },
        pub_key_cred_params: SUPPORTED_ALGORITHMS
            .iter()
            .map(|&alg| PubKeyCredParam {
                alg,
                type_: PUBLIC_KEY_TYPE.to_string(),
            })
            .collect(),
        timeout: rp.timeout_ms,
        attestation: AttestationConveyance::None,
        exclude_credentials: descriptors(&user.credentials),
        authenticator_selection: AuthenticatorSelection {
            resident_key: ResidentKeyRequirement::Discouraged,
            require_resident_key: false,
            user_verification: if rp.require_user_verification {
                UserVerificationRequirement::Required
            } else {
                UserVerificationRequirement::Preferred
            },
        },
    };

    state
        .store
        .set_challenge(&user.id, &PendingChallenge::new(challenge, Ceremony::Registration))
        .await?;

    tracing::debug!(
        user = %user.username,
        excluded = options.exclude_credentials.len(),
        "Issued registration challenge"
    );

    Ok(options)
}

/// Finish passkey registration for `username`.
///
/// ## Flow
/// 1. Look up the user and take their ceremony lock
/// 2. Clear the pending challenge, whatever the outcome of this call
/// 3. Parse `credential` as a `RegistrationResponse`
/// 4. Check the consumed challenge belongs to registration and is fresh
/// 5. Verify the response (client data, authenticator data, attestation)
/// 6. Enroll the credential unless its ID is already known
///
/// ## Returns
/// `{verified: true}` on success, including when the credential was
/// already enrolled. `{verified: false}` when the authenticator did not
/// assert user presence, or user verification while it is required.
///
/// ## Errors
/// - NotFound: Unknown username
/// - BadRequest: `credential` is not a well-formed registration response
/// - NoPendingChallenge: Nothing outstanding for a registration
/// - Verification: Any protocol or cryptographic check failed, or the
///   credential ID belongs to another user
pub async fn finish_registration(
    state: &AppState,
    username: &str,
    credential: &Value,
) -> AppResult<Verification> {
    let user = state.store.find_user_by_username(username).await?;
    let _guard = state.locks.acquire(&user.id).await;
    let user = state.store.find_user_by_username(username).await?;

    // One-time use: a failed attempt burns the challenge too.
    state.store.clear_challenge(&user.id).await?;
    let response: RegistrationResponse = parse_credential(credential)?;
    let challenge = consume_challenge(&state.rp, user.current_challenge, Ceremony::Registration)?;

    let verified = match verify::verify_registration(&state.rp, &challenge, &response) {
        Ok(verified) => verified,
        Err(e) if e.is_unverified() => {
            tracing::info!(user = %user.username, reason = %e, "Registration not verified");
            return Ok(Verification { verified: false });
        }
        Err(e) => return Err(e.into()),
    };

    let credential = Credential {
        credential_id: verified.credential_id,
        public_key: verified.public_key,
        sign_count: verified.sign_count,
        transports: parse_transports(&response.response.transports),
        created_at: Utc::now(),
        last_used_at: None,
    };

    match state.store.add_credential(&user.id, &credential).await? {
        AddCredential::Added => tracing::info!(
            user = %user.username,
            format = %verified.attestation_format,
            aaguid = %verified.aaguid,
            user_verified = verified.user_verified,
            backup_eligible = verified.backup_eligible,
            backed_up = verified.backed_up,
            "Registered new passkey"
        ),
        AddCredential::AlreadyExists => tracing::info!(
            user = %user.username,
            "Passkey already registered, nothing to store"
        ),
        AddCredential::OwnedByAnotherUser => return Err(VerifyError::CredentialInUse.into()),
    }

    Ok(Verification { verified: true })
}
