//! Cryptographic primitives for attestation: digest algorithms and the key
//! signer contract.

use crate::types::{Digest, SignatureBytes, SignerId};
use async_trait::async_trait;
pub use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Compute SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::Digest as _;
    Sha256::digest(data).into()
}

/// Compute SHA-512 hash of data.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    use sha2::Digest as _;
    let hash = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&hash);
    out
}

/// Compute Blake3 hash of data.
pub fn blake3(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Digest algorithm applied to canonical bytes.
///
/// Every commitment records the algorithm that produced its digest so that
/// verification recomputes with the same one, even after the configured
/// default changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 3] = [Self::Sha256, Self::Sha512, Self::Blake3];

    /// Algorithm name as used in configuration and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Length of a digest produced by this algorithm, in hex characters.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 | Self::Blake3 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Digest {
        match self {
            Self::Sha256 => Digest::from_hash_bytes(&sha256(data)),
            Self::Sha512 => Digest::from_hash_bytes(&sha512(data)),
            Self::Blake3 => Digest::from_hash_bytes(&blake3(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            other => Err(UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported hash algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

/// Errors raised by a key signer backend.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Signer backend error: {0}")]
    Backend(String),
}

/// Trait for signing digests with a caller-controlled identity key.
///
/// Signing happens over the digest string rather than the raw input, so the
/// signature size does not depend on the input size.
#[async_trait]
pub trait KeySigner: Send + Sync {
    /// Sign a digest with this signer's identity key.
    async fn sign(&self, digest: &Digest) -> Result<SignatureBytes, SignerError>;

    /// Check `signature` over `digest` against the key registered for `signer_id`.
    ///
    /// Returns `Ok(false)` for a signature that does not verify, including
    /// signatures attributed to an unknown signer. `Err` is reserved for
    /// backend failures.
    async fn verify(
        &self,
        digest: &Digest,
        signature: &SignatureBytes,
        signer_id: &SignerId,
    ) -> Result<bool, SignerError>;

    /// Identity of the key used by [`KeySigner::sign`].
    fn identity_id(&self) -> SignerId;
}

/// A signer backed by an in-process Ed25519 key.
///
/// The identity id is the hex-encoded verifying key. Verification consults a
/// keyring of trusted verifying keys, which always contains this signer's own
/// key.
pub struct Ed25519KeySigner {
    signing_key: SigningKey,
    identity: SignerId,
    keyring: HashMap<SignerId, VerifyingKey>,
}

impl Ed25519KeySigner {
    /// Create a new signer from a signing key.
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let identity = Self::signer_id_for(&verifying_key);
        let mut keyring = HashMap::new();
        keyring.insert(identity.clone(), verifying_key);
        Self {
            signing_key,
            identity,
            keyring,
        }
    }

    /// Generate a new random signing key.
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        let mut csprng = OsRng;
        Self::new(SigningKey::generate(&mut csprng))
    }

    /// Identity id derived from a verifying key.
    pub fn signer_id_for(key: &VerifyingKey) -> SignerId {
        SignerId(hex::encode(key.to_bytes()))
    }

    /// Trust another signer's verifying key for verification.
    pub fn trust(&mut self, key: VerifyingKey) -> SignerId {
        let id = Self::signer_id_for(&key);
        self.keyring.insert(id.clone(), key);
        id
    }

    /// Get the verifying (public) key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl fmt::Debug for Ed25519KeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeySigner")
            .field("identity", &self.identity)
            .field("trusted", &self.keyring.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeySigner for Ed25519KeySigner {
    async fn sign(&self, digest: &Digest) -> Result<SignatureBytes, SignerError> {
        use ed25519_dalek::Signer as _;
        let signature = self.signing_key.sign(digest.as_str().as_bytes());
        Ok(SignatureBytes(signature.to_bytes().to_vec()))
    }

    async fn verify(
        &self,
        digest: &Digest,
        signature: &SignatureBytes,
        signer_id: &SignerId,
    ) -> Result<bool, SignerError> {
        use ed25519_dalek::Verifier as _;

        let Some(key) = self.keyring.get(signer_id) else {
            return Ok(false);
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature.as_bytes()) else {
            return Ok(false);
        };

        Ok(key.verify(digest.as_str().as_bytes(), &signature).is_ok())
    }

    fn identity_id(&self) -> SignerId {
        self.identity.clone()
    }
}
