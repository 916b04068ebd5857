//! COSE public keys (RFC 9053) as carried in attested credential data.
//!
//! Only the two algorithms the server advertises in `pubKeyCredParams` are
//! understood:
//! - ES256: `kty 2 (EC2), alg -7, crv 1 (P-256), x, y`
//! - RS256: `kty 3 (RSA), alg -257, n, e`

use super::error::VerifyError;
use ciborium::value::Value;
use p256::ecdsa::signature::Verifier as _;
use sha2::Sha256;

pub const ALG_ES256: i64 = -7;
pub const ALG_RS256: i64 = -257;

/// Signature algorithms accepted for new credentials, in preference order.
pub const SUPPORTED_ALGORITHMS: [i64; 2] = [ALG_ES256, ALG_RS256];

const KTY: i64 = 1;
const ALG: i64 = 3;
const EC2_CRV: i64 = -1;
const EC2_X: i64 = -2;
const EC2_Y: i64 = -3;
const RSA_N: i64 = -1;
const RSA_E: i64 = -2;

const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;

/// A credential public key the server can verify signatures with.
#[derive(Debug, Clone)]
pub enum CoseKey {
    Es256(p256::ecdsa::VerifyingKey),
    Rs256(rsa::RsaPublicKey),
}

impl CoseKey {
    /// Parse a COSE_Key from its CBOR encoding.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, VerifyError> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| VerifyError::PublicKey(format!("invalid CBOR: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse a COSE_Key from an already decoded CBOR map.
    pub fn from_value(value: &Value) -> Result<Self, VerifyError> {
        let Value::Map(entries) = value else {
            return Err(VerifyError::PublicKey("COSE key is not a map".to_string()));
        };

        let kty = int_field(entries, KTY)?;
        let alg = int_field(entries, ALG)?;

        match (kty, alg) {
            (KTY_EC2, ALG_ES256) => {
                let crv = int_field(entries, EC2_CRV)?;
                if crv != CRV_P256 {
                    return Err(VerifyError::PublicKey(format!("unsupported curve {crv}")));
                }
                let x = coordinate(entries, EC2_X)?;
                let y = coordinate(entries, EC2_Y)?;
                let point = p256::EncodedPoint::from_affine_coordinates(
                    &p256::FieldBytes::clone_from_slice(x),
                    &p256::FieldBytes::clone_from_slice(y),
                    false,
                );
                let key = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| VerifyError::PublicKey("point not on P-256".to_string()))?;
                Ok(CoseKey::Es256(key))
            }
            (KTY_RSA, ALG_RS256) => {
                let n = bytes_field(entries, RSA_N)?;
                let e = bytes_field(entries, RSA_E)?;
                let key = rsa::RsaPublicKey::new(
                    rsa::BigUint::from_bytes_be(n),
                    rsa::BigUint::from_bytes_be(e),
                )
                .map_err(|e| VerifyError::PublicKey(e.to_string()))?;
                Ok(CoseKey::Rs256(key))
            }
            (_, alg) if SUPPORTED_ALGORITHMS.contains(&alg) => Err(VerifyError::PublicKey(
                format!("key type {kty} does not match algorithm {alg}"),
            )),
            (_, alg) => Err(VerifyError::UnsupportedAlgorithm(alg)),
        }
    }

    /// COSE algorithm identifier of this key.
    pub fn algorithm(&self) -> i64 {
        match self {
            CoseKey::Es256(_) => ALG_ES256,
            CoseKey::Rs256(_) => ALG_RS256,
        }
    }

    /// Verify `signature` over `message`.
    ///
    /// ES256 signatures are ASN.1 DER encoded as WebAuthn mandates; RS256
    /// signatures are PKCS#1 v1.5 with SHA-256.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
        match self {
            CoseKey::Es256(key) => {
                let sig = p256::ecdsa::DerSignature::from_bytes(signature)
                    .map_err(|_| VerifyError::InvalidSignature)?;
                key.verify(message, &sig)
                    .map_err(|_| VerifyError::InvalidSignature)
            }
            CoseKey::Rs256(key) => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| VerifyError::InvalidSignature)?;
                verifying_key
                    .verify(message, &sig)
                    .map_err(|_| VerifyError::InvalidSignature)
            }
        }
    }
}

fn field(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == i128::from(label) => Some(v),
        _ => None,
    })
}

fn int_field(entries: &[(Value, Value)], label: i64) -> Result<i64, VerifyError> {
    match field(entries, label) {
        Some(Value::Integer(i)) => i64::try_from(*i)
            .map_err(|_| VerifyError::PublicKey(format!("label {label} out of range"))),
        Some(_) => Err(VerifyError::PublicKey(format!("label {label} is not an integer"))),
        None => Err(VerifyError::PublicKey(format!("label {label} missing"))),
    }
}

fn bytes_field(entries: &[(Value, Value)], label: i64) -> Result<&[u8], VerifyError> {
    match field(entries, label) {
        Some(Value::Bytes(b)) if !b.is_empty() => Ok(b),
        Some(_) => Err(VerifyError::PublicKey(format!("label {label} is not a byte string"))),
        None => Err(VerifyError::PublicKey(format!("label {label} missing"))),
    }
}

fn coordinate(entries: &[(Value, Value)], label: i64) -> Result<&[u8], VerifyError> {
    let bytes = bytes_field(entries, label)?;
    if bytes.len() != 32 {
        return Err(VerifyError::PublicKey(format!(
            "coordinate {label} must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Signer as _, SigningKey};
    use rand::rngs::OsRng;

    fn int(i: i64) -> Value {
        Value::Integer(i.into())
    }

    fn es256_cose(key: &SigningKey) -> Vec<u8> {
        let point = key.verifying_key().to_encoded_point(false);
        let map = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(point.x().unwrap().to_vec())),
            (int(-3), Value::Bytes(point.y().unwrap().to_vec())),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    #[test]
    fn es256_verifies_der_signature() {
        let sk = SigningKey::random(&mut OsRng);
        let key = CoseKey::from_cbor(&es256_cose(&sk)).unwrap();
        assert_eq!(key.algorithm(), ALG_ES256);

        let sig: p256::ecdsa::DerSignature = sk.sign(b"signed data");
        key.verify(b"signed data", sig.as_bytes()).unwrap();

        assert_eq!(
            key.verify(b"other data", sig.as_bytes()),
            Err(VerifyError::InvalidSignature)
        );
        assert_eq!(
            key.verify(b"signed data", b"not der"),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn rs256_verifies_pkcs1v15_signature() {
        use rsa::signature::{SignatureEncoding, Signer};
        use rsa::traits::PublicKeyParts;

        let private = rsa::RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = private.to_public_key();
        let map = Value::Map(vec![
            (int(1), int(3)),
            (int(3), int(-257)),
            (int(-1), Value::Bytes(public.n().to_bytes_be())),
            (int(-2), Value::Bytes(public.e().to_bytes_be())),
        ]);
        let mut cbor = Vec::new();
        ciborium::into_writer(&map, &mut cbor).unwrap();

        let key = CoseKey::from_cbor(&cbor).unwrap();
        assert_eq!(key.algorithm(), ALG_RS256);

        let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private);
        let sig = signer.sign(b"signed data").to_vec();
        key.verify(b"signed data", &sig).unwrap();
        assert!(key.verify(b"tampered", &sig).is_err());
    }

    #[test]
    fn rejects_algorithms_outside_the_allow_list() {
        // EdDSA (-8) over OKP
        let map = Value::Map(vec![
            (int(1), int(1)),
            (int(3), int(-8)),
            (int(-1), int(6)),
            (int(-2), Value::Bytes(vec![0u8; 32])),
        ]);
        assert_eq!(
            CoseKey::from_value(&map).unwrap_err(),
            VerifyError::UnsupportedAlgorithm(-8)
        );
    }

    #[test]
    fn rejects_mismatched_key_type() {
        let map = Value::Map(vec![(int(1), int(3)), (int(3), int(-7))]);
        assert!(matches!(
            CoseKey::from_value(&map),
            Err(VerifyError::PublicKey(_))
        ));
    }

    #[test]
    fn rejects_short_coordinates_and_off_curve_points() {
        let short = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(vec![1u8; 31])),
            (int(-3), Value::Bytes(vec![1u8; 32])),
        ]);
        assert!(matches!(
            CoseKey::from_value(&short),
            Err(VerifyError::PublicKey(_))
        ));

        let off_curve = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(vec![1u8; 32])),
            (int(-3), Value::Bytes(vec![1u8; 32])),
        ]);
        assert!(matches!(
            CoseKey::from_value(&off_curve),
            Err(VerifyError::PublicKey(_))
        ));
    }

    #[test]
    fn rejects_non_map() {
        let mut cbor = Vec::new();
        ciborium::into_writer(&Value::Text("key".into()), &mut cbor).unwrap();
        assert!(CoseKey::from_cbor(&cbor).is_err());
    }
}
