//! # Decision Attestation
//!
//! Turns arbitrary structured decision inputs into tamper-evident,
//! non-repudiable commitments, and later checks whether a claimed input
//! matches a registered commitment.
//!
//! ## Key Features
//! - **Canonical CBOR serialization**: insertion-order independent, type-tagged
//! - **Swappable digests**: SHA-256 (default), SHA-512, BLAKE3, recorded per commitment
//! - **Pluggable collaborators**: key signer and commitment store are traits
//! - **Structured verification**: `E_NOT_FOUND`, `E_HASH_MISMATCH`, `E_SIG_INVALID`
//!   are results, not errors

pub mod config;
pub mod crypto;
pub mod registrar;
pub mod serialization;
pub mod store;
pub mod types;
pub mod value;

pub use config::RegistrarConfig;
pub use crypto::{Ed25519KeySigner, HashAlgorithm, KeySigner, SignerError};
pub use registrar::{AttestationRegistrar, RegistrarBuilder, RegistrarError};
pub use serialization::{CanonicalForm, CanonicalizationError, Canonicalizer};
pub use store::{CommitmentStore, FileCommitmentStore, MemoryCommitmentStore, StoreError};
pub use types::*;
pub use value::Value;

/// Re-export for convenience
pub use ed25519_dalek::{SigningKey, VerifyingKey};
