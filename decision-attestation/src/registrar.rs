//! Attestation registrar: the attest and verify flows.
//!
//! Attest: input → canonical form → digest → signature → persisted commitment.
//! Verify: claimed digest → stored commitment → recomputed digest → signature
//! check.
//!
//! ## Failure Taxonomy
//! - Construction and attest-path failures are hard errors ([`RegistrarError`]).
//! - Verification outcomes (`E_NOT_FOUND`, `E_HASH_MISMATCH`, `E_SIG_INVALID`)
//!   are ordinary results, since a failed verification of untrusted input is
//!   an expected outcome rather than a malfunction.

use crate::config::RegistrarConfig;
use crate::crypto::{HashAlgorithm, KeySigner, SignerError};
use crate::serialization::{CanonicalizationError, Canonicalizer};
use crate::store::{CommitmentStore, StoreError};
use crate::types::{
    Attestation, AttestationCommitment, Digest, SignerId, VerificationCode, VerificationResult,
};
use crate::value::Value;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors surfaced by the registrar.
#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("Missing required collaborator: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("Commitment store failure: {0}")]
    Store(#[from] StoreError),
}

impl RegistrarError {
    /// Stable error code for callers that branch on failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            RegistrarError::ConfigMissing(_) => "E_CONFIG_MISSING",
            RegistrarError::InvalidConfig(_) => "E_CONFIG_INVALID",
            RegistrarError::Canonicalization(_) => "E_CANONICALIZATION",
            RegistrarError::Signing(_) => "E_SIGNING_FAILURE",
            RegistrarError::Store(_) => "E_STORE_FAILURE",
        }
    }
}

/// Registers signed commitments over input vectors and verifies candidates
/// against them.
///
/// Holds no mutable state of its own. Share it as `Arc<AttestationRegistrar>`
/// to attest and verify concurrently.
pub struct AttestationRegistrar {
    canonicalizer: Canonicalizer,
    signer: Arc<dyn KeySigner>,
    store: Arc<dyn CommitmentStore>,
    config: RegistrarConfig,
}

impl AttestationRegistrar {
    /// Create a registrar from its collaborators.
    ///
    /// Fails if the configuration is invalid.
    pub fn new(
        canonicalizer: Canonicalizer,
        signer: Arc<dyn KeySigner>,
        store: Arc<dyn CommitmentStore>,
        config: RegistrarConfig,
    ) -> Result<Self, RegistrarError> {
        config.validate()?;
        Ok(Self {
            canonicalizer,
            signer,
            store,
            config,
        })
    }

    pub fn builder() -> RegistrarBuilder {
        RegistrarBuilder::new()
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    /// Identity that signs new commitments.
    pub fn signer_id(&self) -> SignerId {
        self.signer.identity_id()
    }

    /// Canonicalize, hash, sign and persist an input vector.
    ///
    /// Nothing is persisted unless signing succeeds, and success is only
    /// reported once the store has durably accepted the commitment.
    #[instrument(
        skip_all,
        fields(algorithm = %self.config.hash_algorithm, digest = tracing::field::Empty)
    )]
    pub async fn attest_inputs(&self, inputs: &Value) -> Result<Attestation, RegistrarError> {
        let algorithm = self.config.hash_algorithm;
        let form = self.canonicalizer.canonicalize(inputs).map_err(|err| {
            warn!(error = %err, "input cannot be canonicalized");
            err
        })?;
        let digest = self.canonicalizer.hash(&form, algorithm);
        tracing::Span::current().record("digest", digest.as_str());
        debug!(bytes = form.len(), "input canonicalized");

        let signature = self.signer.sign(&digest).await.map_err(|err| {
            warn!(error = %err, "signing failed, no commitment written");
            err
        })?;

        let record = AttestationCommitment {
            digest: digest.clone(),
            signature: signature.clone(),
            timestamp: Utc::now().timestamp_millis(),
            signer_id: self.signer.identity_id(),
            protocol_version: self.config.protocol_version.clone(),
            algorithm,
        };

        self.store.store_attestation(&record).await.map_err(|err| {
            warn!(error = %err, "commitment store rejected write");
            err
        })?;

        info!(signer = %record.signer_id, "attestation committed");
        Ok(Attestation { digest, signature })
    }

    /// Attest any serializable input.
    pub async fn attest_serializable<T: Serialize + ?Sized>(
        &self,
        inputs: &T,
    ) -> Result<Attestation, RegistrarError> {
        let value = Value::from_serialize(inputs)?;
        self.attest_inputs(&value).await
    }

    /// Verify a candidate input vector against the commitment for `claimed`.
    ///
    /// Checks run cheapest first: record lookup, then the content digest,
    /// then the signature. The digest comparison must come before the
    /// signature check, because a valid signature says nothing about whether
    /// the candidate content is the committed content.
    #[instrument(skip_all, fields(digest = %claimed))]
    pub async fn verify_attestation(
        &self,
        claimed: &Digest,
        candidate: &Value,
    ) -> Result<VerificationResult, RegistrarError> {
        let Some(record) = self.store.get_attestation(claimed).await? else {
            return Ok(reject(VerificationCode::NotFound));
        };

        let recomputed = match self.canonicalizer.digest_of(candidate, record.algorithm) {
            Ok(digest) => digest,
            Err(err) => {
                debug!(error = %err, "candidate cannot be canonicalized");
                return Ok(reject(VerificationCode::HashMismatch));
            }
        };
        if recomputed != record.digest || record.digest != *claimed {
            return Ok(reject(VerificationCode::HashMismatch));
        }

        let authentic = self
            .signer
            .verify(&record.digest, &record.signature, &record.signer_id)
            .await?;
        if !authentic {
            return Ok(reject(VerificationCode::SignatureInvalid));
        }

        info!(signer = %record.signer_id, "attestation verified");
        Ok(VerificationResult::verified(&record))
    }

    /// Verify against a claimed digest given as a raw string.
    ///
    /// A malformed digest cannot name any stored commitment and yields
    /// `E_NOT_FOUND`.
    pub async fn verify_attestation_str(
        &self,
        claimed: &str,
        candidate: &Value,
    ) -> Result<VerificationResult, RegistrarError> {
        match Digest::from_hex(claimed) {
            Ok(digest) => self.verify_attestation(&digest, candidate).await,
            Err(err) => {
                debug!(error = %err, "claimed digest is malformed");
                Ok(reject(VerificationCode::NotFound))
            }
        }
    }

    /// Read-only lookup of a stored commitment.
    pub async fn commitment(&self, digest: &Digest) -> Result<Option<AttestationCommitment>, RegistrarError> {
        Ok(self.store.get_attestation(digest).await?)
    }
}

impl fmt::Debug for AttestationRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationRegistrar")
            .field("signer", &self.signer.identity_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn reject(code: VerificationCode) -> VerificationResult {
    warn!(code = %code, "verification failed");
    VerificationResult::rejected(code)
}

/// Builder for constructing a registrar.
///
/// The signer and store are required; the canonicalizer and configuration
/// fall back to their defaults.
#[derive(Default)]
pub struct RegistrarBuilder {
    canonicalizer: Option<Canonicalizer>,
    signer: Option<Arc<dyn KeySigner>>,
    store: Option<Arc<dyn CommitmentStore>>,
    config: Option<RegistrarConfig>,
}

impl RegistrarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonicalizer(mut self, canonicalizer: Canonicalizer) -> Self {
        self.canonicalizer = Some(canonicalizer);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn KeySigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn store(mut self, store: Arc<dyn CommitmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: RegistrarConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        let config = self.config.take().unwrap_or_default();
        self.config = Some(config.with_protocol_version(version));
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        let config = self.config.take().unwrap_or_default();
        self.config = Some(config.with_hash_algorithm(algorithm));
        self
    }

    /// Build the registrar.
    ///
    /// Fails with `E_CONFIG_MISSING` when a required collaborator was never
    /// supplied.
    pub fn build(self) -> Result<AttestationRegistrar, RegistrarError> {
        let signer = self.signer.ok_or(RegistrarError::ConfigMissing("signer"))?;
        let store = self.store.ok_or(RegistrarError::ConfigMissing("store"))?;

        AttestationRegistrar::new(
            self.canonicalizer.unwrap_or_default(),
            signer,
            store,
            self.config.unwrap_or_default(),
        )
    }
}
