//! Minimal local certificate authority.
//!
//! Issues Ed25519 signer certificates. Used to bootstrap development
//! deployments and to mint material in tests; production deployments load
//! certificates issued by their own authority.

use std::time::{Duration, SystemTime};

use ed25519_dalek::SigningKey;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use tracing::info;

use super::pkcs8_pem;
use crate::error::ProviderError;

/// Default certificate validity period (1 year).
const DEFAULT_VALIDITY_DAYS: u64 = 365;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Signer material produced by [`LocalAuthority::issue`].
pub struct IssuedCertificate {
    pub cert_pem: String,
    /// PKCS#8 PEM of `signing_key`.
    pub key_pem: String,
    pub signing_key: SigningKey,
}

/// Self-signed CA able to issue signer certificates.
pub struct LocalAuthority {
    cert: rcgen::Certificate,
    key_pair: KeyPair,
    key_pem: String,
}

impl LocalAuthority {
    /// Generate a new CA.
    pub fn generate(common_name: &str) -> Result<Self, ProviderError> {
        info!(common_name, "Generating local certificate authority");

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = SystemTime::now();
        params.not_before = now.into();
        params.not_after = (now + DAY * DEFAULT_VALIDITY_DAYS as u32).into();

        let (key_pair, key_pem) = generate_key_pair()?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| ProviderError::Configuration(format!("Failed to create CA certificate: {}", e)))?;

        Ok(Self {
            cert,
            key_pair,
            key_pem,
        })
    }

    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Issue a signer certificate valid from now for one year.
    pub fn issue(&self, common_name: &str) -> Result<IssuedCertificate, ProviderError> {
        let now = SystemTime::now();
        self.issue_with_validity(common_name, now, now + DAY * DEFAULT_VALIDITY_DAYS as u32)
    }

    /// Issue a signer certificate with an explicit validity window.
    pub fn issue_with_validity(
        &self,
        common_name: &str,
        not_before: SystemTime,
        not_after: SystemTime,
    ) -> Result<IssuedCertificate, ProviderError> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ];
        params.serial_number = Some(SerialNumber::from_slice(uuid::Uuid::new_v4().as_bytes()));
        params.not_before = not_before.into();
        params.not_after = not_after.into();

        let (key_pair, key_pem) = generate_key_pair()?;
        let cert = params
            .signed_by(&key_pair, &self.cert, &self.key_pair)
            .map_err(|e| ProviderError::Configuration(format!("Failed to sign certificate: {}", e)))?;

        let signing_key = super::provider::parse_signing_key(&key_pem)?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            key_pem,
            signing_key,
        })
    }
}

/// Fresh Ed25519 key as both an rcgen key pair and PKCS#8 PEM.
fn generate_key_pair() -> Result<(KeyPair, String), ProviderError> {
    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let key_pem = pkcs8_pem(&signing_key)?;
    let key_pair = KeyPair::from_pem(&key_pem)
        .map_err(|e| ProviderError::Configuration(format!("Failed to load key pair: {}", e)))?;
    Ok((key_pair, key_pem))
}
