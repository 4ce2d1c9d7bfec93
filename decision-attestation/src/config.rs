//! Registrar configuration.
//!
//! Built once at startup and handed to the registrar by value; nothing reads
//! it from ambient state afterwards.

use crate::crypto::HashAlgorithm;
use crate::registrar::RegistrarError;
use serde::{Deserialize, Serialize};

/// Protocol version stamped on commitments when none is configured.
pub const DEFAULT_PROTOCOL_VERSION: &str = "dac/1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrarConfig {
    /// Version string recorded on every commitment
    pub protocol_version: String,
    /// Algorithm used to hash canonical forms on attest
    pub hash_algorithm: HashAlgorithm,
}

impl RegistrarConfig {
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Reject configurations that cannot produce a trustworthy commitment.
    pub fn validate(&self) -> Result<(), RegistrarError> {
        if self.protocol_version.trim().is_empty() {
            return Err(RegistrarError::InvalidConfig(
                "protocol version must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}
