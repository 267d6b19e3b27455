//! PKCS#10 certificate signing requests.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Subject of a certificate request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateSubject {
    pub common_name: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub organizational_unit: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl CertificateSubject {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());
        if let Some(org) = &self.organization {
            dn.push(DnType::OrganizationName, org.as_str());
        }
        if let Some(unit) = &self.organizational_unit {
            dn.push(DnType::OrganizationalUnitName, unit.as_str());
        }
        if let Some(country) = &self.country {
            dn.push(DnType::CountryName, country.as_str());
        }
        dn
    }
}

/// Build a PEM-encoded CSR for `subject`, signed with the PKCS#8 key in `key_pem`.
pub fn certificate_request(subject: &CertificateSubject, key_pem: &str) -> Result<String, ProviderError> {
    if subject.common_name.trim().is_empty() {
        return Err(ProviderError::Configuration("CSR subject has no common name".into()));
    }

    let key_pair = KeyPair::from_pem(key_pem)
        .map_err(|e| ProviderError::Configuration(format!("Failed to load key pair: {}", e)))?;

    let mut params = CertificateParams::default();
    params.distinguished_name = subject.distinguished_name();

    params
        .serialize_request(&key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| ProviderError::Signing(format!("Failed to build certificate request: {}", e)))
}
