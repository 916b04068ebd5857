use super::types::{
    AuthenticationOptions, AuthenticationResponse, UserVerificationRequirement, Verification,
};
use super::{consume_challenge, descriptors, new_challenge, parse_credential, verify};
use crate::db::models::{Ceremony, PendingChallenge};
use crate::error::AppResult;
use crate::state::AppState;
use serde_json::Value;

pub async fn begin_authentication(
    state: &AppState,
    username: &str,
) -> AppResult<AuthenticationOptions> {
    // Get user, then re-read under their lock
    let user = state.store.find_user_by_username(username).await?;
    let _guard = state.locks.acquire(&user.id).await;
    let user = state.store.find_user_by_username(username).await?;

    if user.credentials.is_empty() {
        tracing::debug!(user = %user.username, "Authentication requested with no registered passkeys");
    }

    let challenge = new_challenge();
    let options = AuthenticationOptions {
        challenge: challenge.clone(),
        rp_id: state.rp.id.clone(),
        timeout: state.rp.timeout_ms,
        allow_credentials: descriptors(&user.credentials),
        user_verification: if state.rp.require_user_verification {
            UserVerificationRequirement::Required
        } else {
            UserVerificationRequirement::Preferred
        },
    };

    state
        .store
        .set_challenge(&user.id, &PendingChallenge::new(challenge, Ceremony::Authentication))
        .await?;

    Ok(options)
}

pub async fn finish_authentication(
    state: &AppState,
    username: &str,
    credential: &Value,
) -> AppResult<Verification> {
    let user = state.store.find_user_by_username(username).await?;
    let _guard = state.locks.acquire(&user.id).await;
    let user = state.store.find_user_by_username(username).await?;

    // Cleared before anything can fail, so a response is never accepted twice
    state.store.clear_challenge(&user.id).await?;
    let response: AuthenticationResponse = parse_credential(credential)?;

    let credential = state
        .store
        .find_credential(&user.id, response.raw_id.as_slice())
        .await?;

    let challenge = consume_challenge(&state.rp, user.current_challenge, Ceremony::Authentication)?;

    let verified = match verify::verify_authentication(
        &state.rp,
        &challenge,
        &response,
        &credential,
        &user.user_handle,
    ) {
        Ok(verified) => verified,
        Err(e) if e.is_unverified() => {
            tracing::info!(user = %user.username, reason = %e, "Authentication not verified");
            return Ok(Verification { verified: false });
        }
        Err(e) => return Err(e.into()),
    };

    // Update counter
    state
        .store
        .update_sign_count(&user.id, &credential.credential_id, verified.sign_count)
        .await?;

    tracing::info!(
        user = %user.username,
        sign_count = verified.sign_count,
        user_verified = verified.user_verified,
        "Authenticated with passkey"
    );

    Ok(Verification { verified: true })
}
