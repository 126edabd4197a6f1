//! Conversion between in-memory keys and JSON Web Keys (RFC 7517)
//!
//! Stored records carry keys as JWKs so they stay portable across backends
//! and exportable as backups. Conversion is parameterized by algorithm
//! family: `Ecdh` keys are `kty = "EC"` on `K-256`, `Aes` keys are
//! `kty = "oct"` with `alg = "A256GCM"`.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::{
    error::KeyDerivationError,
    keys::{PrivateKey, PublicKey},
    local_key::LocalKey,
};

/// JWK curve name for secp256k1 (RFC 8812)
const CURVE_K256: &str = "K-256";

/// Curve name some exporters write instead of `K-256`
const CURVE_SECP256K1: &str = "secp256k1";

/// JWK algorithm name for the local key
const ALG_A256GCM: &str = "A256GCM";

/// Algorithm family a JWK is interpreted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// secp256k1 key agreement keys (persona key pairs)
    Ecdh,
    /// AES-GCM symmetric keys (local keys)
    Aes,
}

/// Portable JSON Web Key.
///
/// Only the members used by persona keys are modelled. Unknown members are
/// dropped on parse.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type: `EC` or `oct`
    pub kty: String,
    /// Curve name for EC keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// base64url x coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// base64url y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// base64url private scalar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// base64url symmetric key bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    /// Intended algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Extractable flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    /// Permitted operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<String>,
}

impl JsonWebKey {
    /// Parse a JWK from its JSON text.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: the text is not a JSON object with a `kty` member
    pub fn from_json(text: &str) -> Result<Self, KeyDerivationError> {
        serde_json::from_str(text)
            .map_err(|e| KeyDerivationError::InvalidKey { reason: format!("malformed JWK: {e}") })
    }

    /// Serialize to compact JSON text.
    pub fn to_json(&self) -> String {
        let Ok(text) = serde_json::to_string(self) else {
            unreachable!("JWK members are plain strings and cannot fail to serialize");
        };
        text
    }

    /// Returns true if this JWK carries secret material (`d` or `k`).
    pub fn has_secret_component(&self) -> bool {
        self.d.is_some() || self.k.is_some()
    }

    /// Copy with the private scalar removed.
    #[must_use]
    pub fn to_public(&self) -> Self {
        Self { d: None, key_ops: Vec::new(), ..self.clone() }
    }
}

impl fmt::Debug for JsonWebKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebKey")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("d", &self.d.as_ref().map(|_| "[REDACTED]"))
            .field("k", &self.k.as_ref().map(|_| "[REDACTED]"))
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// An in-memory key of any family a persona stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoKey {
    /// Public secp256k1 key
    EcdhPublic(PublicKey),
    /// Private secp256k1 key
    EcdhPrivate(PrivateKey),
    /// AES-256-GCM local key
    Aes(LocalKey),
}

impl CryptoKey {
    /// Import a JWK under the given algorithm family.
    ///
    /// An `Ecdh` JWK with a `d` member imports as [`CryptoKey::EcdhPrivate`];
    /// its `x`/`y` must match the public key of `d`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedKeyType`: `kty` (or `crv`/`alg`) does not fit `algorithm`
    /// - `InvalidKey`: missing members, bad base64, wrong lengths, off-curve
    ///   points or mismatched halves
    pub fn from_jwk(jwk: &JsonWebKey, algorithm: KeyAlgorithm) -> Result<Self, KeyDerivationError> {
        match algorithm {
            KeyAlgorithm::Ecdh => Self::ec_from_jwk(jwk),
            KeyAlgorithm::Aes => Self::aes_from_jwk(jwk),
        }
    }

    /// Export as a JWK.
    pub fn to_jwk(&self) -> JsonWebKey {
        match self {
            Self::EcdhPublic(key) => ec_public_jwk(key),
            Self::EcdhPrivate(key) => {
                let mut jwk = ec_public_jwk(&key.public_key());
                jwk.d = Some(URL_SAFE_NO_PAD.encode(key.to_bytes().as_slice()));
                jwk.key_ops = vec!["deriveKey".to_string(), "deriveBits".to_string()];
                jwk
            },
            Self::Aes(key) => JsonWebKey {
                kty: "oct".to_string(),
                k: Some(URL_SAFE_NO_PAD.encode(key.as_bytes())),
                alg: Some(ALG_A256GCM.to_string()),
                ext: Some(true),
                key_ops: vec!["encrypt".to_string(), "decrypt".to_string()],
                ..JsonWebKey::default()
            },
        }
    }

    /// Algorithm family of this key.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::EcdhPublic(_) | Self::EcdhPrivate(_) => KeyAlgorithm::Ecdh,
            Self::Aes(_) => KeyAlgorithm::Aes,
        }
    }

    /// Public key of an EC key. A private key yields its public half.
    pub fn into_public_key(self) -> Option<PublicKey> {
        match self {
            Self::EcdhPublic(key) => Some(key),
            Self::EcdhPrivate(key) => Some(key.public_key()),
            Self::Aes(_) => None,
        }
    }

    /// Private key, if this is one.
    pub fn into_private_key(self) -> Option<PrivateKey> {
        match self {
            Self::EcdhPrivate(key) => Some(key),
            Self::EcdhPublic(_) | Self::Aes(_) => None,
        }
    }

    /// Local key, if this is one.
    pub fn into_local_key(self) -> Option<LocalKey> {
        match self {
            Self::Aes(key) => Some(key),
            Self::EcdhPublic(_) | Self::EcdhPrivate(_) => None,
        }
    }

    fn ec_from_jwk(jwk: &JsonWebKey) -> Result<Self, KeyDerivationError> {
        if jwk.kty != "EC" {
            return Err(KeyDerivationError::UnsupportedKeyType {
                kty: jwk.kty.clone(),
                algorithm: KeyAlgorithm::Ecdh,
            });
        }
        if let Some(crv) = &jwk.crv
            && crv != CURVE_K256
            && crv != CURVE_SECP256K1
        {
            return Err(KeyDerivationError::UnsupportedKeyType {
                kty: format!("EC/{crv}"),
                algorithm: KeyAlgorithm::Ecdh,
            });
        }

        let x = decode_member(jwk.x.as_deref(), "x")?;
        let y = decode_member(jwk.y.as_deref(), "y")?;
        let public_key = PublicKey::from_coordinates(&x, &y)?;

        let Some(d) = jwk.d.as_deref() else {
            return Ok(Self::EcdhPublic(public_key));
        };

        let scalar = zeroize::Zeroizing::new(decode_member(Some(d), "d")?);
        let private_key = PrivateKey::from_bytes(&scalar)?;
        if private_key.public_key() != public_key {
            return Err(KeyDerivationError::InvalidKey {
                reason: "private scalar does not match x/y".to_string(),
            });
        }

        Ok(Self::EcdhPrivate(private_key))
    }

    fn aes_from_jwk(jwk: &JsonWebKey) -> Result<Self, KeyDerivationError> {
        if jwk.kty != "oct" {
            return Err(KeyDerivationError::UnsupportedKeyType {
                kty: jwk.kty.clone(),
                algorithm: KeyAlgorithm::Aes,
            });
        }
        if let Some(alg) = &jwk.alg
            && alg != ALG_A256GCM
        {
            return Err(KeyDerivationError::UnsupportedKeyType {
                kty: format!("oct/{alg}"),
                algorithm: KeyAlgorithm::Aes,
            });
        }

        let bytes = zeroize::Zeroizing::new(decode_member(jwk.k.as_deref(), "k")?);
        LocalKey::from_bytes(&bytes).map(Self::Aes)
    }
}

fn ec_public_jwk(key: &PublicKey) -> JsonWebKey {
    let (x, y) = key.coordinates();
    JsonWebKey {
        kty: "EC".to_string(),
        crv: Some(CURVE_K256.to_string()),
        x: Some(URL_SAFE_NO_PAD.encode(x)),
        y: Some(URL_SAFE_NO_PAD.encode(y)),
        ext: Some(true),
        ..JsonWebKey::default()
    }
}

fn decode_member(value: Option<&str>, member: &str) -> Result<Vec<u8>, KeyDerivationError> {
    let value = value.ok_or_else(|| KeyDerivationError::InvalidKey {
        reason: format!("JWK is missing member {member:?}"),
    })?;
    URL_SAFE_NO_PAD.decode(value).map_err(|e| KeyDerivationError::InvalidKey {
        reason: format!("JWK member {member:?} is not base64url: {e}"),
    })
}
