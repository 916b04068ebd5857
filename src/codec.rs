//! # Binary Codec Utilities
//!
//! WebAuthn moves a lot of binary data around: challenges, credential IDs,
//! public keys, signatures. On the wire (JSON) all of them are base64url
//! strings; inside the server they are raw bytes.
//!
//! This module is the single place where that conversion happens, plus the
//! constant-time comparison used whenever two secrets or identifiers meet.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// base64url engine used for every binary field.
///
/// Encodes without padding (what browsers emit) and accepts input with or
/// without padding, but only the URL-safe alphabet.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid base64url: {0}")]
    Base64(String),
}

/// Encode bytes as an unpadded base64url string.
pub fn encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

/// Decode a base64url string (padded or not) into bytes.
pub fn decode(input: &str) -> Result<Vec<u8>, CodecError> {
    BASE64URL
        .decode(input.as_bytes())
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Compare two byte strings without leaking where they differ.
///
/// Lengths are not secret here (credential IDs and hashes have public
/// lengths), so a length mismatch returns early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Fill a fresh buffer from the operating system RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Raw bytes that travel as a base64url string.
///
/// Use this in request/response types for any binary WebAuthn field; the
/// (de)serializer does the transport conversion so handlers only ever see
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64UrlBytes(pub Vec<u8>);

impl Base64UrlBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64UrlBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Base64UrlBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64UrlBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        decode(&s).map(Self).map_err(serde::de::Error::custom)
    }
}
