//! Verification of registration and authentication responses.
//!
//! Everything here is pure: the caller supplies the relying party, the
//! challenge it issued and (for authentication) the stored credential, and
//! gets back either the verified facts or the reason the response was
//! rejected. Store access and challenge bookkeeping live in the ceremony
//! modules.

use super::authenticator_data::AuthenticatorData;
use super::cose::CoseKey;
use super::error::VerifyError;
use super::types::{AuthenticationResponse, RegistrationResponse, PUBLIC_KEY_TYPE};
use super::RelyingParty;
use crate::codec;
use crate::db::models::Credential;
use ciborium::value::Value;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const CLIENT_DATA_CREATE: &str = "webauthn.create";
const CLIENT_DATA_GET: &str = "webauthn.get";

/// Facts established by a successful registration verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRegistration {
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes as attested by the authenticator
    pub public_key: Vec<u8>,
    pub sign_count: u32,
    pub attestation_format: String,
    /// Authenticator model, all zero under `none` attestation
    pub aaguid: Uuid,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backed_up: bool,
}

/// Facts established by a successful authentication verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAuthentication {
    pub sign_count: u32,
    pub user_verified: bool,
}

/// `CollectedClientData`, the JSON the browser hashes into every signature.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectedClientData {
    #[serde(rename = "type")]
    type_: String,
    challenge: String,
    origin: String,
    #[serde(default)]
    cross_origin: Option<bool>,
}

pub fn verify_registration(
    rp: &RelyingParty,
    expected_challenge: &str,
    response: &RegistrationResponse,
) -> Result<VerifiedRegistration, VerifyError> {
    check_envelope(&response.type_, &response.id, response.raw_id.as_slice())?;

    let client_data_json = response.response.client_data_json.as_slice();
    check_client_data(rp, client_data_json, CLIENT_DATA_CREATE, expected_challenge)?;

    let attestation = AttestationObject::parse(response.response.attestation_object.as_slice())?;
    let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
    check_rp_id_hash(rp, &auth_data)?;

    let attested = auth_data
        .attested_credential
        .as_ref()
        .ok_or(VerifyError::MissingCredentialData)?;
    if !codec::constant_time_eq(&attested.credential_id, response.raw_id.as_slice()) {
        return Err(VerifyError::CredentialIdMismatch);
    }

    // Rejects anything outside the advertised algorithm list.
    let key = CoseKey::from_cbor(&attested.public_key)?;

    let client_data_hash = Sha256::digest(client_data_json);
    attestation.verify_statement(&key, &client_data_hash)?;

    check_user_flags(rp, &auth_data)?;

    Ok(VerifiedRegistration {
        credential_id: attested.credential_id.clone(),
        public_key: attested.public_key.clone(),
        sign_count: auth_data.sign_count,
        attestation_format: attestation.fmt,
        aaguid: Uuid::from_bytes(attested.aaguid),
        user_verified: auth_data.user_verified(),
        backup_eligible: auth_data.backup_eligible(),
        backed_up: auth_data.backed_up(),
    })
}

pub fn verify_authentication(
    rp: &RelyingParty,
    expected_challenge: &str,
    response: &AuthenticationResponse,
    credential: &Credential,
    user_handle: &[u8],
) -> Result<VerifiedAuthentication, VerifyError> {
    check_envelope(&response.type_, &response.id, response.raw_id.as_slice())?;
    if !codec::constant_time_eq(response.raw_id.as_slice(), &credential.credential_id) {
        return Err(VerifyError::CredentialIdMismatch);
    }

    let client_data_json = response.response.client_data_json.as_slice();
    check_client_data(rp, client_data_json, CLIENT_DATA_GET, expected_challenge)?;

    let raw_auth_data = response.response.authenticator_data.as_slice();
    let auth_data = AuthenticatorData::parse(raw_auth_data)?;
    check_rp_id_hash(rp, &auth_data)?;

    if let Some(handle) = &response.response.user_handle {
        if !handle.as_slice().is_empty() && !codec::constant_time_eq(handle.as_slice(), user_handle)
        {
            return Err(VerifyError::UserHandleMismatch);
        }
    }

    let key = CoseKey::from_cbor(&credential.public_key)?;
    let signed = signed_data(raw_auth_data, client_data_json);
    key.verify(&signed, response.response.signature.as_slice())?;

    check_sign_count(credential.sign_count, auth_data.sign_count)?;
    check_user_flags(rp, &auth_data)?;

    Ok(VerifiedAuthentication {
        sign_count: auth_data.sign_count,
        user_verified: auth_data.user_verified(),
    })
}

/// A counter that does not move forward means the private key may exist in
/// two places. Authenticators that never count report 0 forever, which is
/// allowed as long as the stored value is 0 too.
pub fn check_sign_count(stored: u32, received: u32) -> Result<(), VerifyError> {
    if (received > 0 || stored > 0) && received <= stored {
        return Err(VerifyError::CounterRollback { stored, received });
    }
    Ok(())
}

fn check_envelope(type_: &str, id: &str, raw_id: &[u8]) -> Result<(), VerifyError> {
    if type_ != PUBLIC_KEY_TYPE {
        return Err(VerifyError::CredentialType);
    }
    if raw_id.is_empty() {
        return Err(VerifyError::MalformedResponse("empty rawId".to_string()));
    }
    // `id` is the base64url form of `rawId`; compare as bytes so padding
    // differences do not matter.
    let id_bytes = codec::decode(id).map_err(|_| VerifyError::CredentialIdMismatch)?;
    if !codec::constant_time_eq(&id_bytes, raw_id) {
        return Err(VerifyError::CredentialIdMismatch);
    }
    Ok(())
}

fn check_client_data(
    rp: &RelyingParty,
    raw: &[u8],
    expected_type: &'static str,
    expected_challenge: &str,
) -> Result<(), VerifyError> {
    let client_data: CollectedClientData =
        serde_json::from_slice(raw).map_err(|e| VerifyError::ClientData(e.to_string()))?;

    if client_data.type_ != expected_type {
        return Err(VerifyError::CeremonyType {
            expected: expected_type,
            found: client_data.type_,
        });
    }

    let received = codec::decode(&client_data.challenge).map_err(|_| VerifyError::ChallengeMismatch)?;
    let expected = codec::decode(expected_challenge).map_err(|_| VerifyError::ChallengeMismatch)?;
    if !codec::constant_time_eq(&received, &expected) {
        return Err(VerifyError::ChallengeMismatch);
    }

    if client_data.origin != rp.origin {
        return Err(VerifyError::OriginMismatch);
    }

    if client_data.cross_origin == Some(true) {
        return Err(VerifyError::CrossOrigin);
    }

    Ok(())
}

fn check_rp_id_hash(rp: &RelyingParty, auth_data: &AuthenticatorData) -> Result<(), VerifyError> {
    if codec::constant_time_eq(&auth_data.rp_id_hash, &rp.id_hash) {
        Ok(())
    } else {
        Err(VerifyError::RpIdMismatch)
    }
}

fn check_user_flags(rp: &RelyingParty, auth_data: &AuthenticatorData) -> Result<(), VerifyError> {
    if !auth_data.user_present() {
        return Err(VerifyError::UserNotPresent);
    }
    if rp.require_user_verification && !auth_data.user_verified() {
        return Err(VerifyError::UserNotVerified);
    }
    Ok(())
}

/// `authenticatorData || SHA-256(clientDataJSON)`, the message every
/// WebAuthn signature covers.
fn signed_data(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let client_data_hash = Sha256::digest(client_data_json);
    let mut signed = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    signed.extend_from_slice(auth_data);
    signed.extend_from_slice(&client_data_hash);
    signed
}

/// The CBOR attestation object returned by `navigator.credentials.create()`.
struct AttestationObject {
    fmt: String,
    att_stmt: Vec<(Value, Value)>,
    auth_data: Vec<u8>,
}

impl AttestationObject {
    fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| VerifyError::MalformedResponse(format!("attestation object: {e}")))?;
        let Value::Map(entries) = value else {
            return Err(VerifyError::MalformedResponse(
                "attestation object is not a map".to_string(),
            ));
        };

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data = None;
        for (key, value) in entries {
            match (key, value) {
                (Value::Text(k), Value::Text(v)) if k == "fmt" => fmt = Some(v),
                (Value::Text(k), Value::Map(v)) if k == "attStmt" => att_stmt = Some(v),
                (Value::Text(k), Value::Bytes(v)) if k == "authData" => auth_data = Some(v),
                (Value::Text(k), _) if k == "fmt" || k == "attStmt" || k == "authData" => {
                    return Err(VerifyError::MalformedResponse(format!(
                        "attestation object field {k} has the wrong type"
                    )));
                }
                _ => {}
            }
        }

        let missing = |field: &str| VerifyError::MalformedResponse(format!("attestation object missing {field}"));
        Ok(Self {
            fmt: fmt.ok_or_else(|| missing("fmt"))?,
            att_stmt: att_stmt.ok_or_else(|| missing("attStmt"))?,
            auth_data: auth_data.ok_or_else(|| missing("authData"))?,
        })
    }

    /// Accepts `none` and self-attested `packed`; attestation certificate
    /// chains are not evaluated, so any format that relies on one is refused.
    fn verify_statement(&self, key: &CoseKey, client_data_hash: &[u8]) -> Result<(), VerifyError> {
        match self.fmt.as_str() {
            "none" => {
                if self.att_stmt.is_empty() {
                    Ok(())
                } else {
                    Err(VerifyError::Attestation(
                        "none attestation with a non-empty statement".to_string(),
                    ))
                }
            }
            "packed" => self.verify_packed_self(key, client_data_hash),
            other => Err(VerifyError::AttestationFormat(other.to_string())),
        }
    }

    fn verify_packed_self(&self, key: &CoseKey, client_data_hash: &[u8]) -> Result<(), VerifyError> {
        let field = |name: &str| {
            self.att_stmt.iter().find_map(|(k, v)| match k {
                Value::Text(t) if t == name => Some(v),
                _ => None,
            })
        };

        if field("x5c").is_some() {
            return Err(VerifyError::AttestationFormat("packed with x5c".to_string()));
        }

        let alg = match field("alg") {
            Some(Value::Integer(i)) => i64::try_from(*i)
                .map_err(|_| VerifyError::Attestation("alg out of range".to_string()))?,
            _ => return Err(VerifyError::Attestation("packed statement missing alg".to_string())),
        };
        if alg != key.algorithm() {
            return Err(VerifyError::Attestation(format!(
                "statement alg {alg} does not match credential key alg {}",
                key.algorithm()
            )));
        }

        let sig = match field("sig") {
            Some(Value::Bytes(b)) => b,
            _ => return Err(VerifyError::Attestation("packed statement missing sig".to_string())),
        };

        let mut signed = Vec::with_capacity(self.auth_data.len() + client_data_hash.len());
        signed.extend_from_slice(&self.auth_data);
        signed.extend_from_slice(client_data_hash);
        key.verify(&signed, sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_count_rules() {
        // authenticators without a counter
        assert!(check_sign_count(0, 0).is_ok());
        // normal progression
        assert!(check_sign_count(0, 1).is_ok());
        assert!(check_sign_count(5, 6).is_ok());
        // replayed or cloned
        assert_eq!(
            check_sign_count(5, 5),
            Err(VerifyError::CounterRollback { stored: 5, received: 5 })
        );
        assert!(check_sign_count(5, 4).is_err());
        // a counting authenticator suddenly reporting 0
        assert!(check_sign_count(5, 0).is_err());
    }

    #[test]
    fn envelope_requires_public_key_type_and_matching_id() {
        assert!(check_envelope("public-key", "AQID", &[1, 2, 3]).is_ok());
        assert_eq!(
            check_envelope("password", "AQID", &[1, 2, 3]),
            Err(VerifyError::CredentialType)
        );
        assert_eq!(
            check_envelope("public-key", "AQIE", &[1, 2, 3]),
            Err(VerifyError::CredentialIdMismatch)
        );
        assert!(check_envelope("public-key", "", &[]).is_err());
    }

    #[test]
    fn attestation_object_requires_all_fields() {
        let map = Value::Map(vec![(Value::Text("fmt".into()), Value::Text("none".into()))]);
        let mut cbor = Vec::new();
        ciborium::into_writer(&map, &mut cbor).unwrap();
        assert!(matches!(
            AttestationObject::parse(&cbor),
            Err(VerifyError::MalformedResponse(_))
        ));
    }

    #[test]
    fn attestation_object_rejects_wrong_field_types() {
        let map = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Integer(1.into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(vec![0; 37])),
        ]);
        let mut cbor = Vec::new();
        ciborium::into_writer(&map, &mut cbor).unwrap();
        assert!(AttestationObject::parse(&cbor).is_err());
    }
}
