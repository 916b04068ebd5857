//! Parser for the authenticator data structure (WebAuthn §6.1).
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, big endian)
//!   [ aaguid (16) | credIdLen (2, big endian) | credId | COSE_Key ]   if AT
//!   [ extensions (CBOR map) ]                                         if ED
//! ```

use super::error::VerifyError;
use ciborium::value::Value;

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_BE: u8 = 0x08;
pub const FLAG_BS: u8 = 0x10;
pub const FLAG_AT: u8 = 0x40;
pub const FLAG_ED: u8 = 0x80;

const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// Credential data present when the AT flag is set (registration only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// The COSE_Key exactly as encoded by the authenticator
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(data: &[u8]) -> Result<Self, VerifyError> {
        if data.len() < HEADER_LEN {
            return Err(VerifyError::AuthenticatorData(format!(
                "{} bytes is shorter than the {HEADER_LEN} byte header",
                data.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&data[..32]);
        let flags = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let mut rest = &data[HEADER_LEN..];

        let attested_credential = if flags & FLAG_AT != 0 {
            Some(parse_attested_credential(&mut rest)?)
        } else {
            None
        };

        if flags & FLAG_ED != 0 {
            let _extensions: Value = ciborium::from_reader(&mut rest).map_err(|e| {
                VerifyError::AuthenticatorData(format!("invalid extensions: {e}"))
            })?;
        }

        if !rest.is_empty() {
            return Err(VerifyError::AuthenticatorData(format!(
                "{} trailing bytes",
                rest.len()
            )));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    pub fn backed_up(&self) -> bool {
        self.flags & FLAG_BS != 0
    }
}

fn parse_attested_credential(rest: &mut &[u8]) -> Result<AttestedCredentialData, VerifyError> {
    if rest.len() < AAGUID_LEN + 2 {
        return Err(VerifyError::AuthenticatorData(
            "attested credential data truncated".to_string(),
        ));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
    let id_len = u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]) as usize;
    *rest = &rest[AAGUID_LEN + 2..];

    if id_len == 0 || rest.len() < id_len {
        return Err(VerifyError::AuthenticatorData(format!(
            "credential id length {id_len} is invalid"
        )));
    }
    let credential_id = rest[..id_len].to_vec();
    *rest = &rest[id_len..];

    // The COSE key has no length prefix: decode one CBOR item and measure
    // how far the reader advanced.
    let key_source: &[u8] = *rest;
    let _key: Value = ciborium::from_reader(&mut *rest).map_err(|e| {
        VerifyError::AuthenticatorData(format!("invalid credential public key: {e}"))
    })?;
    let consumed = key_source.len() - rest.len();

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key: key_source[..consumed].to_vec(),
    })
}
