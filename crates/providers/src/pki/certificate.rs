//! X.509 certificate facts extracted once at load time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::ProviderError;

/// Immutable view of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PkiCertificate {
    /// Colon-separated hex serial number.
    pub serial: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Raw subject public key bytes.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Hex SHA-256 of the DER encoding.
    pub fingerprint: String,
    /// Signature algorithm of the certificate itself.
    pub algorithm: String,
    #[serde(skip)]
    der: Vec<u8>,
}

impl PkiCertificate {
    pub fn from_pem(pem: &str) -> Result<Self, ProviderError> {
        let (_, pem) = parse_x509_pem(pem.as_bytes()).map_err(|e| {
            ProviderError::Configuration(format!("Failed to parse certificate PEM: {}", e))
        })?;
        Self::from_der(&pem.contents)
    }

    pub fn from_der(der: &[u8]) -> Result<Self, ProviderError> {
        let cert = parse_der(der)?;

        let not_before = timestamp(cert.validity().not_before.timestamp())?;
        let not_after = timestamp(cert.validity().not_after.timestamp())?;

        Ok(Self {
            serial: cert.raw_serial_as_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            public_key: cert.public_key().subject_public_key.data.to_vec(),
            fingerprint: hex::encode(Sha256::digest(der)),
            algorithm: algorithm_name(&cert.signature_algorithm.algorithm.to_id_string()),
            der: der.to_vec(),
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Parse the stored DER again for checks that need the full structure.
    pub(crate) fn parsed(&self) -> Result<X509Certificate<'_>, ProviderError> {
        parse_der(&self.der)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Message describing why the certificate is outside its window at `now`.
    pub fn validity_error(&self, now: DateTime<Utc>) -> String {
        if now > self.not_after {
            format!("certificate {} expired at {}", self.serial, self.not_after.to_rfc3339())
        } else {
            format!(
                "certificate {} is not valid before {}",
                self.serial,
                self.not_before.to_rfc3339()
            )
        }
    }
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>, ProviderError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| ProviderError::Configuration(format!("Failed to parse certificate: {}", e)))?;
    Ok(cert)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        ProviderError::Configuration(format!("certificate timestamp out of range: {}", secs))
    })
}

fn algorithm_name(oid: &str) -> String {
    match oid {
        "1.3.101.112" => "Ed25519".to_string(),
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256".to_string(),
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384".to_string(),
        "1.2.840.113549.1.1.11" => "RSA-SHA256".to_string(),
        other => other.to_string(),
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }
}
