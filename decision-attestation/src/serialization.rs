//! Canonical CBOR serialization for deterministic hashing.
//!
//! Two logically equal input vectors always serialize to the same byte
//! sequence, regardless of the order their map entries were built in. That
//! byte sequence is what gets hashed into a commitment digest.
//!
//! ## Canonicalization Rules
//! 1. Map keys are sorted lexicographically by their UTF-8 bytes; duplicate
//!    keys are rejected
//! 2. Arrays keep index order
//! 3. Every primitive keeps its CBOR major type, so `1`, `"1"`, `1.0` and the
//!    byte string `b"1"` never encode the same
//! 4. Integers encoded in minimal form
//! 5. Non-finite floats are rejected
//! 6. No indefinite-length encoding

use crate::crypto::HashAlgorithm;
use crate::types::Digest;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalizationError {
    #[error("Non-finite float cannot be canonicalized: {0}")]
    NonFiniteFloat(f64),

    #[error("Integer out of encodable range: {0}")]
    IntegerOutOfRange(i128),

    #[error("Nesting exceeds maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("Duplicate map key: {0}")]
    DuplicateKey(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("CBOR value conversion error: {0}")]
    Value(#[from] ciborium::value::Error),

    #[error("CBOR encoding error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CanonicalizationError>;

/// Canonical byte form of an input vector.
///
/// Only produced by [`Canonicalizer::canonicalize`], so anything hashed into
/// a digest went through the canonicalization rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalForm(Vec<u8>);

impl CanonicalForm {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalForm {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Deterministic serializer and hasher for input vectors.
///
/// Holds no mutable state; share it freely across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonicalizer {
    max_depth: usize,
}

impl Canonicalizer {
    /// Default maximum nesting depth of arrays and maps.
    pub const DEFAULT_MAX_DEPTH: usize = 128;

    pub fn new() -> Self {
        Self::with_max_depth(Self::DEFAULT_MAX_DEPTH)
    }

    /// Create a canonicalizer that rejects values nested deeper than `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Serialize a value to its canonical form.
    pub fn canonicalize(&self, value: &Value) -> Result<CanonicalForm> {
        let tree = self.encode_tree(value, 0)?;
        let mut buf = Vec::new();
        ciborium::into_writer(&tree, &mut buf)?;

        verify_canonical(&buf)?;

        Ok(CanonicalForm(buf))
    }

    /// Serialize any serializable type to its canonical form.
    pub fn canonicalize_serializable<T: Serialize + ?Sized>(&self, value: &T) -> Result<CanonicalForm> {
        self.canonicalize(&Value::from_serialize(value)?)
    }

    /// Hash a canonical form with the given algorithm.
    pub fn hash(&self, form: &CanonicalForm, algorithm: HashAlgorithm) -> Digest {
        algorithm.digest(form.as_bytes())
    }

    /// Hash a canonical form with [`HashAlgorithm::default`].
    pub fn hash_default(&self, form: &CanonicalForm) -> Digest {
        self.hash(form, HashAlgorithm::default())
    }

    /// Canonicalize and hash in one step.
    pub fn digest_of(&self, value: &Value, algorithm: HashAlgorithm) -> Result<Digest> {
        let form = self.canonicalize(value)?;
        Ok(self.hash(&form, algorithm))
    }

    fn encode_tree(&self, value: &Value, depth: usize) -> Result<ciborium::Value> {
        if depth > self.max_depth {
            return Err(CanonicalizationError::DepthExceeded(self.max_depth));
        }

        Ok(match value {
            Value::Null => ciborium::Value::Null,
            Value::Bool(b) => ciborium::Value::Bool(*b),
            Value::Integer(i) => {
                let int = ciborium::value::Integer::try_from(*i)
                    .map_err(|_| CanonicalizationError::IntegerOutOfRange(*i))?;
                ciborium::Value::Integer(int)
            }
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(CanonicalizationError::NonFiniteFloat(*f));
                }
                ciborium::Value::Float(*f)
            }
            Value::String(s) => ciborium::Value::Text(s.clone()),
            Value::Bytes(b) => ciborium::Value::Bytes(b.clone()),
            Value::Array(items) => ciborium::Value::Array(
                items
                    .iter()
                    .map(|item| self.encode_tree(item, depth + 1))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(entries) => {
                let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

                if let Some(pair) = sorted.windows(2).find(|w| w[0].0 == w[1].0) {
                    return Err(CanonicalizationError::DuplicateKey(pair[0].0.clone()));
                }

                let mut out = Vec::with_capacity(sorted.len());
                for (key, val) in sorted {
                    out.push((
                        ciborium::Value::Text(key.clone()),
                        self.encode_tree(val, depth + 1)?,
                    ));
                }
                ciborium::Value::Map(out)
            }
        })
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a value to canonical CBOR bytes.
///
/// Struct fields are reordered by name like any other map, so the output does
/// not depend on field declaration order.
pub fn to_canonical_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(Canonicalizer::new().canonicalize_serializable(value)?.into_bytes())
}

/// Deserialize a value from canonical CBOR bytes.
pub fn from_canonical_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    verify_canonical(bytes)?;
    let value = ciborium::from_reader(bytes)?;
    Ok(value)
}

/// Verify that CBOR bytes hold exactly one item in canonical form.
///
/// Checks for:
/// - No indefinite-length encoding (major type with additional info 31)
/// - No reserved additional info values
/// - No trailing bytes
/// - No nesting deeper than [`MAX_VERIFY_DEPTH`]
fn verify_canonical(bytes: &[u8]) -> Result<()> {
    let mut cursor = std::io::Cursor::new(bytes);
    verify_canonical_item(&mut cursor, 0)?;
    if cursor.position() != bytes.len() as u64 {
        return Err(invalid_data("Trailing bytes after canonical CBOR item"));
    }
    Ok(())
}

fn invalid_data(msg: &'static str) -> CanonicalizationError {
    CanonicalizationError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

/// Bound on container and tag nesting accepted when reading CBOR back.
///
/// Leaves headroom over [`Canonicalizer::DEFAULT_MAX_DEPTH`] for the record
/// structs that wrap canonicalized content.
const MAX_VERIFY_DEPTH: usize = Canonicalizer::DEFAULT_MAX_DEPTH + 8;

fn verify_canonical_item<R: Read>(reader: &mut R, depth: usize) -> Result<()> {
    if depth > MAX_VERIFY_DEPTH {
        return Err(invalid_data("Nesting too deep"));
    }

    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;

    let major_type = (buf[0] & 0xE0) >> 5;
    let additional_info = buf[0] & 0x1F;

    if additional_info == 31 {
        return Err(invalid_data(
            "Indefinite-length encoding not allowed in canonical CBOR",
        ));
    }

    let length = match additional_info {
        0..=23 => additional_info as u64,
        24 => {
            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf)?;
            buf[0] as u64
        }
        25 => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u16::from_be_bytes(buf) as u64
        }
        26 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            u32::from_be_bytes(buf) as u64
        }
        27 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            u64::from_be_bytes(buf)
        }
        _ => return Err(invalid_data("Reserved additional info in CBOR header")),
    };

    match major_type {
        // Unsigned int, negative int, simple/float: no nested data
        0 | 1 | 7 => {}
        2 | 3 => {
            let skipped = std::io::copy(&mut reader.by_ref().take(length), &mut std::io::sink())?;
            if skipped != length {
                return Err(invalid_data("Truncated CBOR string"));
            }
        }
        4 => {
            for _ in 0..length {
                verify_canonical_item(reader, depth + 1)?;
            }
        }
        5 => {
            for _ in 0..length {
                verify_canonical_item(reader, depth + 1)?; // Key
                verify_canonical_item(reader, depth + 1)?; // Value
            }
        }
        6 => {
            verify_canonical_item(reader, depth + 1)?;
        }
        _ => {}
    }

    Ok(())
}
