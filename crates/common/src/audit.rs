//! Append-only audit trail attached to every signature request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of state-changing actions recorded on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    RequestCreated,
    ProviderSelected,
    SessionOpened,
    JobSubmitted,
    SignatureCaptured,
    AttemptFailed,
    FailoverTriggered,
    StatusChanged,
    StatusSynchronized,
    WebhookReceived,
}

/// One timestamped entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<String>,
    pub details: serde_json::Value,
}

/// Ordered, append-only list of audit entries.
///
/// There is intentionally no way to remove or rewrite an entry once recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current time.
    pub fn record(&mut self, event: AuditEvent, actor: Option<&str>, details: serde_json::Value) {
        self.entries.push(AuditEntry {
            event,
            timestamp: Utc::now(),
            actor: actor.map(str::to_string),
            details,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind, in recording order.
    pub fn events_of(&self, event: AuditEvent) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.event == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_preserves_order() {
        let mut trail = AuditTrail::new();
        trail.record(AuditEvent::SessionOpened, None, json!({ "n": 1 }));
        trail.record(AuditEvent::JobSubmitted, Some("system"), json!({ "n": 2 }));
        trail.record(AuditEvent::SessionOpened, None, json!({ "n": 3 }));

        let order: Vec<i64> = trail
            .entries()
            .iter()
            .map(|e| e.details["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(trail.events_of(AuditEvent::SessionOpened).count(), 2);
        assert!(trail.entries()[0].timestamp <= trail.entries()[2].timestamp);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut trail = AuditTrail::new();
        trail.record(AuditEvent::WebhookReceived, None, json!({}));
        let value = serde_json::to_value(&trail).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["event"], "webhook_received");

        let back: AuditTrail = serde_json::from_value(value).unwrap();
        assert_eq!(back, trail);
    }
}
