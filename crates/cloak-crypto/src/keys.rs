//! secp256k1 key pair wrappers
//!
//! Thin newtypes over `k256` so callers never touch curve internals and
//! `Debug` never prints secret scalars.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use k256::{FieldBytes, elliptic_curve::sec1::ToEncodedPoint};
use zeroize::Zeroizing;

use crate::error::KeyDerivationError;

/// Size of a secp256k1 scalar or coordinate in bytes
const SCALAR_SIZE: usize = 32;

/// Public half of a persona key pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(k256::PublicKey);

impl PublicKey {
    /// Parse a SEC1 encoded point (compressed or uncompressed).
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: the bytes do not encode a point on secp256k1
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, KeyDerivationError> {
        k256::PublicKey::from_sec1_bytes(bytes).map(Self).map_err(|_| {
            KeyDerivationError::InvalidKey { reason: "not a secp256k1 point".to_string() }
        })
    }

    /// Build a key from big-endian affine coordinates.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: a coordinate has the wrong length or the point is off
    ///   the curve
    pub fn from_coordinates(x: &[u8], y: &[u8]) -> Result<Self, KeyDerivationError> {
        if x.len() != SCALAR_SIZE || y.len() != SCALAR_SIZE {
            return Err(KeyDerivationError::InvalidKey {
                reason: format!(
                    "coordinates must be {SCALAR_SIZE} bytes, got x={} y={}",
                    x.len(),
                    y.len()
                ),
            });
        }

        let point = k256::EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(x),
            FieldBytes::from_slice(y),
            false,
        );
        Self::from_sec1_bytes(point.as_bytes())
    }

    /// SEC1 compressed point (33 bytes). Stable across encodings, so it is
    /// the basis of the persona identifier.
    pub fn to_compressed_point(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Big-endian affine `(x, y)` coordinates.
    pub fn coordinates(&self) -> (FieldBytes, FieldBytes) {
        let point = self.0.to_encoded_point(false);
        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            unreachable!("uncompressed encoding of a valid public key has both coordinates");
        };
        (*x, *y)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", STANDARD.encode(self.to_compressed_point()))
    }
}

/// Secret half of a persona key pair. Zeroized on drop by `k256`.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(k256::SecretKey);

impl PrivateKey {
    /// Parse a 32-byte big-endian scalar.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: wrong length, zero, or not below the curve order
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyDerivationError> {
        if bytes.len() != SCALAR_SIZE {
            return Err(KeyDerivationError::InvalidKey {
                reason: format!("private scalar must be {SCALAR_SIZE} bytes, got {}", bytes.len()),
            });
        }

        k256::SecretKey::from_slice(bytes).map(Self).map_err(|_| KeyDerivationError::InvalidKey {
            reason: "scalar is zero or exceeds the curve order".to_string(),
        })
    }

    /// Big-endian scalar bytes, wiped when the returned buffer drops.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// A secp256k1 key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Public half
    pub public_key: PublicKey,
    /// Secret half
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Complete a key pair from its secret half.
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        Self { public_key: private_key.public_key(), private_key }
    }
}
