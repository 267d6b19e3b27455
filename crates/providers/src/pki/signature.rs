//! Detached signature artifacts and their verification.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use uuid::Uuid;

use super::certificate::PkiCertificate;

/// Signature scheme of every artifact produced here.
pub const SIGNATURE_SCHEME: &str = "Ed25519";

/// Digest applied to the document before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable signature artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiSignature {
    pub signature_id: Uuid,
    /// Hex digest of the signed document.
    pub document_hash: String,
    /// Base64 signature over the raw digest bytes.
    pub signature: String,
    pub digest_algorithm: DigestAlgorithm,
    pub scheme: String,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 fingerprint of the signer certificate.
    pub certificate_fingerprint: String,
    pub certificate_serial: String,
    /// Party the signature was produced for.
    pub signer: String,
}

impl PkiSignature {
    /// Hash `document` and sign the digest.
    pub fn create(
        key: &SigningKey,
        certificate: &PkiCertificate,
        digest_algorithm: DigestAlgorithm,
        document: &[u8],
        signer: &str,
    ) -> Self {
        let digest = digest_algorithm.digest(document);
        let signature = key.sign(&digest);

        Self {
            signature_id: Uuid::new_v4(),
            document_hash: hex::encode(&digest),
            signature: base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
            digest_algorithm,
            scheme: SIGNATURE_SCHEME.to_string(),
            timestamp: Utc::now(),
            certificate_fingerprint: certificate.fingerprint.clone(),
            certificate_serial: certificate.serial.clone(),
            signer: signer.to_string(),
        }
    }
}

/// Result of checking a signature against a document.
///
/// Each check runs regardless of the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureVerification {
    /// Recorded document hash is a digest of the recorded algorithm's size.
    pub hash_well_formed: bool,
    /// Signature verifies over the recorded digest with the certificate key.
    pub signature_valid: bool,
    /// Recomputed digest equals the recorded one.
    pub hash_matches: bool,
    /// Certificate was inside its validity window at verification time.
    pub certificate_valid: bool,
    pub errors: Vec<String>,
}

impl SignatureVerification {
    pub fn is_valid(&self) -> bool {
        self.hash_well_formed && self.signature_valid && self.hash_matches && self.certificate_valid
    }
}

/// Verify `signature` against `document` using `certificate`.
pub fn verify_signature(
    signature: &PkiSignature,
    document: &[u8],
    certificate: &PkiCertificate,
    now: DateTime<Utc>,
) -> SignatureVerification {
    let mut errors = Vec::new();

    let recomputed = signature.digest_algorithm.digest(document);
    let recorded = hex::decode(&signature.document_hash);

    let hash_well_formed = recorded
        .as_ref()
        .is_ok_and(|r| r.len() == signature.digest_algorithm.output_len());
    if !hash_well_formed {
        errors.push(format!(
            "recorded document hash is not a {} digest",
            signature.digest_algorithm
        ));
    }

    let signature_valid = match check_cryptographic(signature, recorded.as_deref().ok(), certificate)
    {
        Ok(()) => true,
        Err(e) => {
            errors.push(e);
            false
        }
    };

    let hash_matches = recorded.as_deref().map(|r| r == recomputed.as_slice()).unwrap_or(false);
    if !hash_matches {
        errors.push("document hash does not match the signed hash".to_string());
    }

    let certificate_valid = certificate.is_valid_at(now);
    if !certificate_valid {
        errors.push(certificate.validity_error(now));
    }

    SignatureVerification {
        hash_well_formed,
        signature_valid,
        hash_matches,
        certificate_valid,
        errors,
    }
}

fn check_cryptographic(
    signature: &PkiSignature,
    recorded_digest: Option<&[u8]>,
    certificate: &PkiCertificate,
) -> Result<(), String> {
    if signature.certificate_fingerprint != certificate.fingerprint {
        return Err("signature was produced with a different certificate".to_string());
    }
    let digest = recorded_digest.ok_or_else(|| "recorded document hash is not hex".to_string())?;

    let key_bytes: [u8; 32] = certificate
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| "certificate public key is not an Ed25519 key".to_string())?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| format!("invalid certificate public key: {}", e))?;

    let raw = base64::engine::general_purpose::STANDARD
        .decode(&signature.signature)
        .map_err(|e| format!("signature is not base64: {}", e))?;
    let sig = Signature::from_slice(&raw).map_err(|e| format!("malformed signature: {}", e))?;

    verifying_key
        .verify(digest, &sig)
        .map_err(|_| "cryptographic signature check failed".to_string())
}
