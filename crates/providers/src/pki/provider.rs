//! Local certificate-based signing provider.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{
    ProviderId, SignatoryEvidence, SignatureEvidence, SignatureRequest, SignatureStatus,
    SigningDocument,
};

use super::certificate::PkiCertificate;
use super::csr::{certificate_request, CertificateSubject};
use super::signature::{verify_signature, DigestAlgorithm, PkiSignature, SignatureVerification};
use super::validator::{
    CertificateAuthorityValidator, CertificateValidation, RevocationCheck, RevokedSerials,
};
use super::{pkcs8_pem, PkiConfig};
use crate::error::ProviderError;
use crate::{JobMetadata, SigningJob, SigningProvider, VerificationTarget};

/// Origin recorded on evidence produced by this backend.
pub const LOCAL_ORIGIN: &str = "local-pki";

/// Jobs kept in memory for correlation lookups. Older jobs are still
/// verifiable from the artifacts stored with their session.
pub const MAX_CACHED_JOBS: usize = 1024;

/// Recently produced jobs, oldest evicted first.
#[derive(Default)]
struct JobCache {
    jobs: HashMap<String, Vec<PkiSignature>>,
    order: VecDeque<String>,
}

impl JobCache {
    fn insert(&mut self, correlation_id: String, signatures: Vec<PkiSignature>) {
        while self.order.len() >= MAX_CACHED_JOBS {
            if let Some(oldest) = self.order.pop_front() {
                self.jobs.remove(&oldest);
            }
        }
        self.order.push_back(correlation_id.clone());
        self.jobs.insert(correlation_id, signatures);
    }
}

/// Parse an unencrypted PKCS#8 PEM Ed25519 key.
pub fn parse_signing_key(pem: &str) -> Result<SigningKey, ProviderError> {
    SigningKey::from_pkcs8_pem(pem)
        .map_err(|e| ProviderError::Configuration(format!("Failed to parse Ed25519 private key: {}", e)))
}

/// Signs documents with a locally held key and certificate.
pub struct LocalSigningProvider {
    id: ProviderId,
    authority: String,
    signing_key: SigningKey,
    certificate: PkiCertificate,
    validator: CertificateAuthorityValidator,
    digest: DigestAlgorithm,
    /// Signatures of recent jobs, keyed by correlation id.
    jobs: RwLock<JobCache>,
}

impl LocalSigningProvider {
    /// Load key material from the configured sources with an empty local
    /// revocation list.
    pub fn from_config(config: &PkiConfig) -> Result<Self, ProviderError> {
        Self::from_config_with_revocation(config, Arc::new(RevokedSerials::new()))
    }

    pub fn from_config_with_revocation(
        config: &PkiConfig,
        revocation: Arc<dyn RevocationCheck>,
    ) -> Result<Self, ProviderError> {
        let key_pem = config.private_key.load("private key")?;
        let cert_pem = config.certificate.load("certificate")?;
        let ca_pem = config.ca_certificate.load("CA certificate")?;

        let mut provider = Self::from_pem(
            ProviderId::new(config.provider_id.clone()),
            &key_pem,
            &cert_pem,
            &ca_pem,
            config.hash_algorithm,
            revocation,
        )?;
        provider.authority = config.certificate_authority.clone();
        Ok(provider)
    }

    /// Build from PEM strings. Fails if any item is malformed or the key
    /// does not belong to the certificate.
    pub fn from_pem(
        id: ProviderId,
        key_pem: &str,
        cert_pem: &str,
        ca_pem: &str,
        digest: DigestAlgorithm,
        revocation: Arc<dyn RevocationCheck>,
    ) -> Result<Self, ProviderError> {
        let signing_key = parse_signing_key(key_pem)?;
        let certificate = PkiCertificate::from_pem(cert_pem)?;
        let ca = PkiCertificate::from_pem(ca_pem)?;

        if signing_key.verifying_key().as_bytes().as_slice() != certificate.public_key.as_slice() {
            return Err(ProviderError::Configuration(format!(
                "private key does not match certificate {}",
                certificate.serial
            )));
        }

        info!(
            provider = %id,
            serial = %certificate.serial,
            subject = %certificate.subject,
            not_after = %certificate.not_after,
            digest = %digest,
            "Local signing provider loaded"
        );

        Ok(Self {
            id,
            authority: ca.subject.clone(),
            signing_key,
            certificate,
            validator: CertificateAuthorityValidator::new(ca, revocation),
            digest,
            jobs: RwLock::new(JobCache::default()),
        })
    }

    pub fn certificate(&self) -> &PkiCertificate {
        &self.certificate
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Validate the provider's own certificate now.
    pub fn validate_own_certificate(&self) -> CertificateValidation {
        self.validator.validate(&self.certificate, Utc::now())
    }

    /// Validate any certificate against the configured CA.
    pub fn validate_certificate(&self, cert: &PkiCertificate) -> CertificateValidation {
        self.validator.validate(cert, Utc::now())
    }

    /// Sign `document` for `signer`. Refuses to sign with a certificate that
    /// currently fails validation.
    pub fn create_signature(&self, document: &[u8], signer: &str) -> Result<PkiSignature, ProviderError> {
        let validation = self.validate_own_certificate();
        if !validation.valid {
            return Err(ProviderError::Signing(format!(
                "signer certificate is not usable: {}",
                validation.errors.join("; ")
            )));
        }

        let signature =
            PkiSignature::create(&self.signing_key, &self.certificate, self.digest, document, signer);
        debug!(
            signature_id = %signature.signature_id,
            signer,
            "Created local signature"
        );
        Ok(signature)
    }

    /// Run every verification check and report all failures.
    pub fn verify_signature(&self, signature: &PkiSignature, document: &[u8]) -> SignatureVerification {
        verify_signature(signature, document, &self.certificate, Utc::now())
    }

    /// CSR for renewing this provider's certificate with the same key.
    pub fn generate_certificate_request(
        &self,
        subject: &CertificateSubject,
    ) -> Result<String, ProviderError> {
        let key_pem = pkcs8_pem(&self.signing_key)?;
        certificate_request(subject, &key_pem)
    }

    /// Signatures recorded for a recent job.
    pub async fn signatures(&self, correlation_id: &str) -> Option<Vec<PkiSignature>> {
        self.jobs.read().await.jobs.get(correlation_id).cloned()
    }
}

#[async_trait]
impl SigningProvider for LocalSigningProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    /// Signs once per signatory. Either every signatory is signed or the
    /// job fails and nothing is recorded.
    async fn create_signing_job(
        &self,
        request: &SignatureRequest,
        document: &SigningDocument,
        _metadata: &JobMetadata,
    ) -> Result<SigningJob, ProviderError> {
        if request.signatories.is_empty() {
            return Err(ProviderError::InvalidPayload("request has no signatories".into()));
        }

        let signatures = request
            .signatories
            .iter()
            .map(|s| self.create_signature(&document.content, &s.party_id))
            .collect::<Result<Vec<_>, _>>()?;

        let evidence = signatures
            .iter()
            .map(|sig| SignatoryEvidence {
                party_id: sig.signer.clone(),
                evidence: SignatureEvidence {
                    signed_at: sig.timestamp,
                    origin_address: Some(LOCAL_ORIGIN.to_string()),
                    signature_data: Some(sig.signature.clone()),
                },
            })
            .collect();

        let artifacts = signatures
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::Signing(format!("Failed to serialize signature: {}", e)))?;

        let correlation_id = format!("pki-{}", uuid::Uuid::new_v4());
        info!(
            request_id = %request.id,
            correlation_id = %correlation_id,
            signatures = signatures.len(),
            "Local signing job completed"
        );
        self.jobs
            .write()
            .await
            .insert(correlation_id.clone(), signatures);

        Ok(SigningJob {
            correlation_id,
            status: SignatureStatus::Completed,
            evidence,
            artifacts,
        })
    }

    async fn get_status(&self, correlation_id: &str) -> Result<SignatureStatus, ProviderError> {
        if self.jobs.read().await.jobs.contains_key(correlation_id) {
            Ok(SignatureStatus::Completed)
        } else {
            Err(ProviderError::NotFound(format!("signing job {}", correlation_id)))
        }
    }

    async fn verify(
        &self,
        target: &VerificationTarget,
        document: &SigningDocument,
    ) -> Result<bool, ProviderError> {
        let signatures = match target {
            VerificationTarget::Correlation(id) => self
                .signatures(id)
                .await
                .ok_or_else(|| ProviderError::NotFound(format!("signing job {}", id)))?,
            VerificationTarget::Artifact(value) => {
                let signature: PkiSignature = serde_json::from_value(value.clone()).map_err(|e| {
                    ProviderError::InvalidPayload(format!("not a signature artifact: {}", e))
                })?;
                vec![signature]
            }
        };

        let mut all_valid = true;
        for signature in &signatures {
            let result = self.verify_signature(signature, &document.content);
            if !result.is_valid() {
                warn!(
                    signature_id = %signature.signature_id,
                    errors = ?result.errors,
                    "Signature verification failed"
                );
                all_valid = false;
            }
        }
        Ok(all_valid)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let validation = self.validate_own_certificate();
        if !validation.valid {
            warn!(provider = %self.id, errors = ?validation.errors, "Signer certificate unusable");
        }
        Ok(validation.valid)
    }
}
