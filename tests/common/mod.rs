//! Shared fixtures for the integration tests: a software authenticator that
//! produces real ES256 signatures, and helpers to build application state.

#![allow(dead_code)]

use ciborium::value::Value;
use p256::ecdsa::{signature::Signer as _, DerSignature, SigningKey};
use passkey_rp_server::codec::{self, Base64UrlBytes};
use passkey_rp_server::config::Config;
use passkey_rp_server::db::{CredentialStore, MemoryStore};
use passkey_rp_server::state::AppState;
use passkey_rp_server::webauthn::authenticator_data::{FLAG_AT, FLAG_UP, FLAG_UV};
use passkey_rp_server::webauthn::types::{
    AssertionResponse, AttestationResponse, AuthenticationResponse, RegistrationResponse,
};
use rand::rngs::OsRng;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

pub const RP_ID: &str = "localhost";
pub const ORIGIN: &str = "http://localhost:8080";

/// Configuration for tests; `overrides` are applied on top of the defaults.
pub fn config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("RP_ID".to_string(), RP_ID.to_string()),
        ("RP_ORIGIN".to_string(), ORIGIN.to_string()),
        ("DATABASE_URL".to_string(), "memory".to_string()),
        ("SEED_USERS".to_string(), "alice".to_string()),
    ]);
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// In-memory state with `usernames` provisioned.
pub async fn state_with_users(config: &Config, usernames: &[&str]) -> AppState {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    for name in usernames {
        store.create_user(name).await.unwrap();
    }
    AppState::with_store(config, store)
}

pub async fn alice_state() -> AppState {
    state_with_users(&config(&[]), &["alice"]).await
}

/// A platform authenticator holding one P-256 credential.
///
/// Every field is public so a test can tamper with exactly one aspect of
/// the next response it produces.
pub struct SoftAuthenticator {
    pub key: SigningKey,
    pub credential_id: Vec<u8>,
    pub rp_id: String,
    pub origin: String,
    pub flags: u8,
    pub sign_count: u32,
    pub transports: Vec<String>,
}

impl SoftAuthenticator {
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
            credential_id: codec::random_bytes(16),
            rp_id: RP_ID.to_string(),
            origin: ORIGIN.to_string(),
            flags: FLAG_UP | FLAG_UV,
            sign_count: 0,
            transports: vec!["internal".to_string(), "hybrid".to_string()],
        }
    }

    /// COSE_Key encoding of the credential public key.
    pub fn cose_key(&self) -> Vec<u8> {
        let point = self.key.verifying_key().to_encoded_point(false);
        let map = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(point.x().unwrap().to_vec())),
            (int(-3), Value::Bytes(point.y().unwrap().to_vec())),
        ]);
        cbor(&map)
    }

    pub fn client_data(&self, type_: &str, challenge: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": type_,
            "challenge": challenge,
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .unwrap()
    }

    pub fn authenticator_data(&self, attested: bool) -> Vec<u8> {
        let mut data = Sha256::digest(self.rp_id.as_bytes()).to_vec();
        let flags = if attested { self.flags | FLAG_AT } else { self.flags };
        data.push(flags);
        data.extend_from_slice(&self.sign_count.to_be_bytes());
        if attested {
            data.extend_from_slice(&[0u8; 16]); // aaguid
            data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            data.extend_from_slice(&self.credential_id);
            data.extend_from_slice(&self.cose_key());
        }
        data
    }

    /// Sign `authData || SHA-256(clientDataJSON)`.
    pub fn sign(&self, auth_data: &[u8], client_data: &[u8]) -> Vec<u8> {
        let mut message = auth_data.to_vec();
        message.extend_from_slice(&Sha256::digest(client_data));
        let sig: DerSignature = self.key.sign(&message);
        sig.as_bytes().to_vec()
    }

    /// `navigator.credentials.create()` with `none` attestation.
    pub fn register(&self, challenge: &str) -> RegistrationResponse {
        let client_data = self.client_data("webauthn.create", challenge);
        let auth_data = self.authenticator_data(true);
        let attestation = attestation_object("none", Vec::new(), auth_data);
        self.registration_response(client_data, attestation)
    }

    /// `navigator.credentials.create()` with packed self attestation.
    pub fn register_packed(&self, challenge: &str) -> RegistrationResponse {
        let client_data = self.client_data("webauthn.create", challenge);
        let auth_data = self.authenticator_data(true);
        let sig = self.sign(&auth_data, &client_data);
        let statement = vec![
            (Value::Text("alg".into()), int(-7)),
            (Value::Text("sig".into()), Value::Bytes(sig)),
        ];
        let attestation = attestation_object("packed", statement, auth_data);
        self.registration_response(client_data, attestation)
    }

    pub fn registration_response(
        &self,
        client_data: Vec<u8>,
        attestation_object: Vec<u8>,
    ) -> RegistrationResponse {
        RegistrationResponse {
            id: codec::encode(&self.credential_id),
            raw_id: Base64UrlBytes(self.credential_id.clone()),
            type_: "public-key".to_string(),
            response: AttestationResponse {
                client_data_json: Base64UrlBytes(client_data),
                attestation_object: Base64UrlBytes(attestation_object),
                transports: self.transports.clone(),
            },
            client_extension_results: json!({}),
            authenticator_attachment: Some("platform".to_string()),
        }
    }

    /// `navigator.credentials.get()` reporting the current `sign_count`.
    pub fn assert(&self, challenge: &str, user_handle: Option<&[u8]>) -> AuthenticationResponse {
        let client_data = self.client_data("webauthn.get", challenge);
        let auth_data = self.authenticator_data(false);
        let signature = self.sign(&auth_data, &client_data);

        AuthenticationResponse {
            id: codec::encode(&self.credential_id),
            raw_id: Base64UrlBytes(self.credential_id.clone()),
            type_: "public-key".to_string(),
            response: AssertionResponse {
                client_data_json: Base64UrlBytes(client_data),
                authenticator_data: Base64UrlBytes(auth_data),
                signature: Base64UrlBytes(signature),
                user_handle: user_handle.map(|h| Base64UrlBytes(h.to_vec())),
            },
            client_extension_results: json!({}),
            authenticator_attachment: Some("platform".to_string()),
        }
    }
}

/// The credential as a browser would post it.
pub fn to_json<T: serde::Serialize>(credential: &T) -> serde_json::Value {
    serde_json::to_value(credential).unwrap()
}

pub fn attestation_object(fmt: &str, statement: Vec<(Value, Value)>, auth_data: Vec<u8>) -> Vec<u8> {
    cbor(&Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text(fmt.into())),
        (Value::Text("attStmt".into()), Value::Map(statement)),
        (Value::Text("authData".into()), Value::Bytes(auth_data)),
    ]))
}

pub fn int(i: i64) -> Value {
    Value::Integer(i.into())
}

pub fn cbor(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).unwrap();
    buf
}
