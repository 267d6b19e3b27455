//! Provider identity and availability records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a configured signing provider (e.g. `"envelope"`, `"pki"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Last known availability of a provider.
///
/// Cached in memory by the health monitor; never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub is_available: bool,
    pub last_checked: DateTime<Utc>,
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn available(provider: ProviderId) -> Self {
        Self {
            provider,
            is_available: true,
            last_checked: Utc::now(),
            error: None,
        }
    }

    pub fn unavailable(provider: ProviderId, error: impl Into<String>) -> Self {
        Self {
            provider,
            is_available: false,
            last_checked: Utc::now(),
            error: Some(error.into()),
        }
    }
}
