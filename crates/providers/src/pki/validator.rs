//! Certificate validation against a trust anchor.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::certificate::PkiCertificate;
use crate::error::ProviderError;

/// Answer of a revocation source for one serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationStatus {
    Revoked,
    NotRevoked,
    /// The source has nothing to say about this serial.
    NoData,
}

/// Source of revocation information.
#[cfg_attr(test, mockall::automock)]
pub trait RevocationCheck: Send + Sync {
    fn status(&self, serial: &str) -> RevocationStatus;
}

#[derive(Default)]
struct RevokedSerialsState {
    loaded: bool,
    serials: HashSet<String>,
}

/// Locally maintained list of revoked serial numbers.
///
/// Until the list is populated it reports [`RevocationStatus::NoData`].
#[derive(Default)]
pub struct RevokedSerials {
    state: RwLock<RevokedSerialsState>,
}

impl RevokedSerials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list.
    pub fn replace<I: IntoIterator<Item = String>>(&self, serials: I) {
        if let Ok(mut state) = self.state.write() {
            state.serials = serials.into_iter().map(|s| normalize(&s)).collect();
            state.loaded = true;
        }
    }

    pub fn revoke(&self, serial: &str) {
        if let Ok(mut state) = self.state.write() {
            state.serials.insert(normalize(serial));
            state.loaded = true;
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.serials.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationCheck for RevokedSerials {
    fn status(&self, serial: &str) -> RevocationStatus {
        let Ok(state) = self.state.read() else {
            return RevocationStatus::NoData;
        };
        if !state.loaded {
            RevocationStatus::NoData
        } else if state.serials.contains(&normalize(serial)) {
            RevocationStatus::Revoked
        } else {
            RevocationStatus::NotRevoked
        }
    }
}

/// Serials compare case-insensitively and without separators.
fn normalize(serial: &str) -> String {
    serial
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Outcome of [`CertificateAuthorityValidator::validate`].
#[derive(Debug, Clone, Serialize)]
pub struct CertificateValidation {
    pub valid: bool,
    pub issued_by_ca: bool,
    pub within_validity: bool,
    pub revocation: RevocationStatus,
    pub errors: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Validates certificates against a CA certificate.
pub struct CertificateAuthorityValidator {
    ca: PkiCertificate,
    revocation: Arc<dyn RevocationCheck>,
}

impl CertificateAuthorityValidator {
    pub fn new(ca: PkiCertificate, revocation: Arc<dyn RevocationCheck>) -> Self {
        Self { ca, revocation }
    }

    pub fn ca(&self) -> &PkiCertificate {
        &self.ca
    }

    /// Check issuer, validity window and revocation at `now`.
    pub fn validate(&self, cert: &PkiCertificate, now: DateTime<Utc>) -> CertificateValidation {
        let mut errors = Vec::new();

        let issued_by_ca = match self.check_issuer(cert) {
            Ok(()) => true,
            Err(e) => {
                errors.push(e.to_string());
                false
            }
        };

        let within_validity = cert.is_valid_at(now);
        if !within_validity {
            errors.push(cert.validity_error(now));
        }

        let revocation = self.revocation.status(&cert.serial);
        match revocation {
            RevocationStatus::Revoked => {
                errors.push(format!("certificate {} has been revoked", cert.serial));
            }
            RevocationStatus::NoData => {
                debug!(serial = %cert.serial, "No revocation data, treating as not revoked");
            }
            RevocationStatus::NotRevoked => {}
        }

        let valid = errors.is_empty();
        if !valid {
            warn!(serial = %cert.serial, ?errors, "Certificate validation failed");
        }

        CertificateValidation {
            valid,
            issued_by_ca,
            within_validity,
            revocation,
            errors,
            checked_at: now,
        }
    }

    fn check_issuer(&self, cert: &PkiCertificate) -> Result<(), ProviderError> {
        let parsed = cert.parsed()?;
        let ca = self.ca.parsed()?;

        if parsed.issuer().as_raw() != ca.subject().as_raw() {
            return Err(ProviderError::Configuration(format!(
                "certificate issuer '{}' does not match CA '{}'",
                cert.issuer, self.ca.subject
            )));
        }

        parsed
            .verify_signature(Some(ca.public_key()))
            .map_err(|e| {
                ProviderError::Configuration(format!(
                    "certificate is not signed by the CA: {}",
                    e
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::authority::LocalAuthority;
    use std::time::{Duration, SystemTime};

    fn ca_and_leaf() -> (LocalAuthority, PkiCertificate) {
        let ca = LocalAuthority::generate("Validator CA").unwrap();
        let leaf = PkiCertificate::from_pem(&ca.issue("leaf@example.org").unwrap().cert_pem).unwrap();
        (ca, leaf)
    }

    fn validator(ca: &LocalAuthority, revocation: Arc<dyn RevocationCheck>) -> CertificateAuthorityValidator {
        CertificateAuthorityValidator::new(PkiCertificate::from_pem(&ca.cert_pem()).unwrap(), revocation)
    }

    #[test]
    fn test_valid_certificate_without_revocation_data() {
        let (ca, leaf) = ca_and_leaf();
        let v = validator(&ca, Arc::new(RevokedSerials::new()));

        let result = v.validate(&leaf, Utc::now());
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.issued_by_ca);
        assert_eq!(result.revocation, RevocationStatus::NoData);
    }

    #[test]
    fn test_revoked_serial() {
        let (ca, leaf) = ca_and_leaf();
        let revoked = Arc::new(RevokedSerials::new());
        revoked.revoke(&leaf.serial.to_uppercase());
        let v = validator(&ca, revoked.clone());

        let result = v.validate(&leaf, Utc::now());
        assert!(!result.valid);
        assert_eq!(result.revocation, RevocationStatus::Revoked);
        assert!(result.errors[0].contains("revoked"));

        revoked.replace(Vec::new());
        assert_eq!(v.validate(&leaf, Utc::now()).revocation, RevocationStatus::NotRevoked);
    }

    #[test]
    fn test_expired_certificate_names_expiry() {
        let ca = LocalAuthority::generate("CA").unwrap();
        let now = SystemTime::now();
        let day = Duration::from_secs(86_400);
        let issued = ca
            .issue_with_validity("expired", now - day * 10, now - day)
            .unwrap();
        let leaf = PkiCertificate::from_pem(&issued.cert_pem).unwrap();

        let result = validator(&ca, Arc::new(RevokedSerials::new())).validate(&leaf, Utc::now());
        assert!(!result.valid);
        assert!(!result.within_validity);
        assert!(result.issued_by_ca);
        assert!(result.errors.iter().any(|e| e.contains("expired")));
    }

    #[test]
    fn test_foreign_ca_is_rejected() {
        let (_, leaf) = ca_and_leaf();
        let other = LocalAuthority::generate("Other CA").unwrap();

        let result = validator(&other, Arc::new(RevokedSerials::new())).validate(&leaf, Utc::now());
        assert!(!result.valid);
        assert!(!result.issued_by_ca);
    }

    #[test]
    fn test_same_name_different_key_is_rejected() {
        let (_, leaf) = ca_and_leaf();
        // Same subject, different key: the name check passes, the signature check does not.
        let impostor = LocalAuthority::generate("Validator CA").unwrap();

        let result =
            validator(&impostor, Arc::new(RevokedSerials::new())).validate(&leaf, Utc::now());
        assert!(!result.issued_by_ca);
        assert!(result.errors[0].contains("not signed by the CA"));
    }

    #[test]
    fn test_revocation_source_is_consulted_with_serial() {
        let (ca, leaf) = ca_and_leaf();
        let serial = leaf.serial.clone();

        let mut mock = MockRevocationCheck::new();
        mock.expect_status()
            .withf(move |s| s == serial)
            .times(1)
            .returning(|_| RevocationStatus::NotRevoked);

        let result = validator(&ca, Arc::new(mock)).validate(&leaf, Utc::now());
        assert!(result.valid);
        assert_eq!(result.revocation, RevocationStatus::NotRevoked);
    }
}
