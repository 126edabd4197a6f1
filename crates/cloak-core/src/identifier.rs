//! Identifiers for profiles and personas.
//!
//! Both identifiers have a canonical text form that is also their serialized
//! form, so they work as keys in any map and any storage encoding:
//!
//! ```text
//! person:<network>/<user_id>          ProfileIdentifier
//! ec_key:secp256k1/<compressed_point> PersonaIdentifier
//! ```
//!
//! `compressed_point` is standard base64 of the SEC1 compressed public key
//! with `/` replaced by `|`, so the text splits unambiguously on the first
//! `/`.

use std::{fmt, str::FromStr};

use base64_text::{decode_point, encode_point};
use cloak_crypto::{CryptoKey, JsonWebKey, KeyAlgorithm, KeyDerivationError, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;

const PROFILE_PREFIX: &str = "person:";
const PERSONA_PREFIX: &str = "ec_key:";

/// Curve of every persona key
pub const SECP256K1_CURVE: &str = "secp256k1";

/// Identifies an account on a social network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileIdentifier {
    network: String,
    user_id: String,
}

impl ProfileIdentifier {
    /// Create an identifier for `user_id` on `network`.
    ///
    /// # Errors
    ///
    /// - `Malformed`: either part is empty, or the network contains `/`
    pub fn new(
        network: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        let network = network.into();
        let user_id = user_id.into();

        let reason = if network.is_empty() {
            Some("network is empty")
        } else if network.contains('/') {
            Some("network contains '/'")
        } else if user_id.is_empty() {
            Some("user id is empty")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(IdentifierError::Malformed {
                text: format!("{PROFILE_PREFIX}{network}/{user_id}"),
                reason,
            });
        }

        Ok(Self { network, user_id })
    }

    /// Social network host, e.g. `facebook.com`.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Account id on that network.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for ProfileIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PROFILE_PREFIX}{}/{}", self.network, self.user_id)
    }
}

impl FromStr for ProfileIdentifier {
    type Err = IdentifierError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let body = text
            .strip_prefix(PROFILE_PREFIX)
            .ok_or_else(|| IdentifierError::UnknownPrefix(text.to_string()))?;
        let (network, user_id) = body.split_once('/').ok_or(IdentifierError::Malformed {
            text: text.to_string(),
            reason: "missing '/' between network and user id",
        })?;
        Self::new(network, user_id)
    }
}

impl TryFrom<String> for ProfileIdentifier {
    type Error = IdentifierError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<ProfileIdentifier> for String {
    fn from(identifier: ProfileIdentifier) -> Self {
        identifier.to_string()
    }
}

/// Identifies a persona by the compressed point of its secp256k1 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonaIdentifier {
    compressed_point: String,
}

impl PersonaIdentifier {
    /// Identifier of the persona owning `public_key`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self { compressed_point: encode_point(&public_key.to_compressed_point()) }
    }

    /// Identifier of the persona owning the public key in `jwk`.
    ///
    /// A private JWK is accepted; only its public half is used.
    ///
    /// # Errors
    ///
    /// Any `KeyDerivationError` from importing the JWK as an EC key.
    pub fn from_json_web_key(jwk: &JsonWebKey) -> Result<Self, KeyDerivationError> {
        let key = CryptoKey::from_jwk(&jwk.to_public(), KeyAlgorithm::Ecdh)?;
        let Some(public_key) = key.into_public_key() else {
            unreachable!("EC import always yields a key with a public half");
        };
        Ok(Self::from_public_key(&public_key))
    }

    /// Curve name; always [`SECP256K1_CURVE`].
    pub fn curve(&self) -> &'static str {
        SECP256K1_CURVE
    }

    /// Compressed point text.
    pub fn compressed_point(&self) -> &str {
        &self.compressed_point
    }

    /// Human-comparable fingerprint (the compressed point text).
    pub fn fingerprint(&self) -> &str {
        &self.compressed_point
    }

    /// Recover the public key this identifier was derived from.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: the point is not on the curve
    pub fn to_public_key(&self) -> Result<PublicKey, KeyDerivationError> {
        let bytes = decode_point(&self.compressed_point).ok_or_else(|| {
            KeyDerivationError::InvalidKey { reason: "compressed point is not base64".to_string() }
        })?;
        PublicKey::from_sec1_bytes(&bytes)
    }
}

impl fmt::Display for PersonaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PERSONA_PREFIX}{SECP256K1_CURVE}/{}", self.compressed_point)
    }
}

impl FromStr for PersonaIdentifier {
    type Err = IdentifierError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let body = text
            .strip_prefix(PERSONA_PREFIX)
            .ok_or_else(|| IdentifierError::UnknownPrefix(text.to_string()))?;
        let malformed = |reason| IdentifierError::Malformed { text: text.to_string(), reason };

        let (curve, point) = body.split_once('/').ok_or(malformed("missing '/' after curve"))?;
        if curve != SECP256K1_CURVE {
            return Err(malformed("curve is not secp256k1"));
        }

        let bytes = decode_point(point).ok_or(malformed("compressed point is not base64"))?;
        if bytes.len() != 33 || !matches!(bytes[0], 0x02 | 0x03) {
            return Err(malformed("not a SEC1 compressed point"));
        }

        Ok(Self { compressed_point: encode_point(&bytes) })
    }
}

impl TryFrom<String> for PersonaIdentifier {
    type Error = IdentifierError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<PersonaIdentifier> for String {
    fn from(identifier: PersonaIdentifier) -> Self {
        identifier.to_string()
    }
}

/// Either kind of identifier. Key lookups accept both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    /// A social-network profile
    Profile(ProfileIdentifier),
    /// A persona
    Persona(PersonaIdentifier),
}

impl From<ProfileIdentifier> for Identifier {
    fn from(identifier: ProfileIdentifier) -> Self {
        Self::Profile(identifier)
    }
}

impl From<PersonaIdentifier> for Identifier {
    fn from(identifier: PersonaIdentifier) -> Self {
        Self::Persona(identifier)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile(id) => id.fmt(f),
            Self::Persona(id) => id.fmt(f),
        }
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.starts_with(PROFILE_PREFIX) {
            text.parse().map(Self::Profile)
        } else if text.starts_with(PERSONA_PREFIX) {
            text.parse().map(Self::Persona)
        } else {
            Err(IdentifierError::UnknownPrefix(text.to_string()))
        }
    }
}

mod base64_text {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    pub(super) fn encode_point(bytes: &[u8]) -> String {
        STANDARD.encode(bytes).replace('/', "|")
    }

    pub(super) fn decode_point(text: &str) -> Option<Vec<u8>> {
        STANDARD.decode(text.replace('|', "/")).ok()
    }
}
