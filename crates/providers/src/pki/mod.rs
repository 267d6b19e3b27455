//! Local certificate-based signing.
//!
//! ## Material
//!
//! ```text
//! CA certificate (trust anchor)
//!     │
//!     └── Signer certificate  <->  Ed25519 private key (PKCS#8 PEM)
//! ```
//!
//! The key, the signer certificate and the CA certificate are loaded once at
//! construction. Each signature is a detached artifact over the digest of
//! the document.

pub mod authority;
pub mod certificate;
pub mod csr;
pub mod provider;
pub mod signature;
pub mod validator;

use std::fs;
use std::path::PathBuf;

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, KeypairBytes};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use certificate::PkiCertificate;
pub use csr::CertificateSubject;
pub use provider::LocalSigningProvider;
pub use signature::{DigestAlgorithm, PkiSignature, SignatureVerification};
pub use validator::{
    CertificateAuthorityValidator, CertificateValidation, RevocationCheck, RevocationStatus,
    RevokedSerials,
};

/// Default provider id for the local signer.
pub const PKI_PROVIDER_ID: &str = "pki";

fn default_provider_id() -> String {
    PKI_PROVIDER_ID.to_string()
}

/// PEM material given either inline or as a file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PemSource {
    Path(PathBuf),
    Inline(String),
}

impl PemSource {
    /// Read the PEM text.
    pub fn load(&self, what: &str) -> Result<String, ProviderError> {
        match self {
            PemSource::Inline(pem) => Ok(pem.clone()),
            PemSource::Path(path) => fs::read_to_string(path).map_err(|e| {
                ProviderError::Configuration(format!(
                    "Failed to read {} from {}: {}",
                    what,
                    path.display(),
                    e
                ))
            }),
        }
    }
}

/// Settings for the local signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkiConfig {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    /// Display name of the issuing authority.
    pub certificate_authority: String,
    pub private_key: PemSource,
    pub certificate: PemSource,
    pub ca_certificate: PemSource,
    #[serde(default)]
    pub hash_algorithm: DigestAlgorithm,
}

/// Unencrypted PKCS#8 v1 PEM for an Ed25519 key.
pub(crate) fn pkcs8_pem(key: &SigningKey) -> Result<String, ProviderError> {
    let bytes = KeypairBytes {
        secret_key: key.to_bytes(),
        public_key: None,
    };
    bytes
        .to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| ProviderError::Configuration(format!("Failed to encode private key: {}", e)))
}
