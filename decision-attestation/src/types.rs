//! Core types used across the attestation system.

use crate::crypto::HashAlgorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hex-encoded content digest of a canonical form.
///
/// Always lowercase. The length is fixed per algorithm: 64 characters for
/// SHA-256 and BLAKE3, 128 for SHA-512.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse a digest from a hex string.
    ///
    /// Accepts upper- or lowercase input and normalizes to lowercase.
    pub fn from_hex(hex: &str) -> Result<Self, DigestParseError> {
        let hex = hex.trim().to_ascii_lowercase();
        if !HashAlgorithm::ALL.iter().any(|alg| alg.hex_len() == hex.len()) {
            return Err(DigestParseError::InvalidLength(hex.len()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DigestParseError::InvalidHex);
        }
        Ok(Self(hex))
    }

    pub(crate) fn from_hash_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// The digest as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw digest bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Validated as hex on every construction path.
        hex::decode(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    #[error("Invalid digest length: {0} hex characters")]
    InvalidLength(usize),

    #[error("Digest is not valid hex")]
    InvalidHex,
}

/// Opaque signature bytes produced by a key signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureBytes(#[serde(with = "serde_hex")] pub Vec<u8>);

impl SignatureBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for SignatureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        SignatureBytes(bytes)
    }
}

impl AsRef<[u8]> for SignatureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Signatures travel as hex strings in persisted records
mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(|_| serde::de::Error::custom("Invalid signature hex"))
    }
}

/// Signer identity (stable per signing key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerId(pub String);

impl SignerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SignerId {
    fn from(id: &str) -> Self {
        SignerId(id.to_string())
    }
}

/// A signed commitment binding a digest to a point in time and an identity.
///
/// Written once per attestation and never mutated. Re-attesting identical
/// content yields a record with the same digest, signer and algorithm; only
/// the timestamp may differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationCommitment {
    /// Content digest of the canonical input (primary key)
    pub digest: Digest,
    /// Signature over the digest
    pub signature: SignatureBytes,
    /// Creation time, epoch milliseconds
    pub timestamp: i64,
    /// Identity of the signer
    pub signer_id: SignerId,
    /// Protocol version the commitment was produced under
    pub protocol_version: String,
    /// Hash algorithm that produced `digest`
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

impl AttestationCommitment {
    /// Creation time as a UTC datetime.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Receipt returned to the caller of a successful attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub digest: Digest,
    pub signature: SignatureBytes,
}

/// Reason a verification did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationCode {
    /// No commitment is registered under the claimed digest
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    /// The candidate input does not hash to the committed digest
    #[serde(rename = "E_HASH_MISMATCH")]
    HashMismatch,
    /// The stored signature does not verify for the stored signer
    #[serde(rename = "E_SIG_INVALID")]
    SignatureInvalid,
}

impl VerificationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationCode::NotFound => "E_NOT_FOUND",
            VerificationCode::HashMismatch => "E_HASH_MISMATCH",
            VerificationCode::SignatureInvalid => "E_SIG_INVALID",
        }
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of verifying a candidate input against a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<VerificationCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<SignerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

impl VerificationResult {
    /// A successful verification of `record`.
    pub fn verified(record: &AttestationCommitment) -> Self {
        Self {
            valid: true,
            code: None,
            signer_id: Some(record.signer_id.clone()),
            timestamp: Some(record.timestamp),
            protocol_version: Some(record.protocol_version.clone()),
        }
    }

    /// A failed verification.
    pub fn rejected(code: VerificationCode) -> Self {
        Self {
            valid: false,
            code: Some(code),
            signer_id: None,
            timestamp: None,
            protocol_version: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}
