//! Inbound envelope status notifications.
//!
//! Parsing never fails: anything that cannot be read yields `None` and the
//! caller ignores the delivery.

use chrono::{DateTime, Utc};
use serde_json::Value;

use common::{SignatoryEvidence, SignatureEvidence, SignatureStatus};

use super::status::map_envelope_status;

/// Deliveries retried more often than this are dropped.
pub const MAX_WEBHOOK_RETRIES: u64 = 5;

/// The parts of a notification the orchestrator acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotice {
    pub event: String,
    pub envelope_id: String,
    pub retry_count: u64,
    /// Raw remote status from the envelope summary.
    pub remote_status: Option<String>,
    pub status_changed_at: Option<DateTime<Utc>>,
    /// Evidence for recipients reported as completed.
    pub signed: Vec<SignatoryEvidence>,
}

impl WebhookNotice {
    /// Remote status mapped onto the shared vocabulary.
    pub fn status(&self) -> Option<SignatureStatus> {
        self.remote_status.as_deref().map(map_envelope_status)
    }

    pub fn exceeds_retry_limit(&self) -> bool {
        self.retry_count > MAX_WEBHOOK_RETRIES
    }
}

/// Read a notification body. Returns `None` when no envelope id can be found.
pub fn parse_webhook(body: &Value) -> Option<WebhookNotice> {
    let data = body.get("data");
    let summary = data.and_then(|d| d.get("envelopeSummary"));

    let envelope_id = body
        .get("envelopeId")
        .or_else(|| data.and_then(|d| d.get("envelopeId")))
        .or_else(|| summary.and_then(|s| s.get("envelopeId")))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?
        .to_string();

    let retry_count = match body.get("retryCount") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };

    let remote_status = summary
        .and_then(|s| s.get("status"))
        .and_then(Value::as_str)
        .or_else(|| {
            // `envelope-completed` style event names carry the status.
            body.get("event")
                .and_then(Value::as_str)
                .filter(|e| e.starts_with("envelope"))
                .and_then(|e| e.rsplit(|c| c == '.' || c == '-').next())
        })
        .map(str::to_string);

    let status_changed_at = summary
        .and_then(|s| s.get("statusChangedDateTime"))
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let signed = summary
        .and_then(|s| s.pointer("/recipients/signers"))
        .and_then(Value::as_array)
        .map(|signers| signers.iter().filter_map(signer_evidence).collect())
        .unwrap_or_default();

    Some(WebhookNotice {
        event: body
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        envelope_id,
        retry_count,
        remote_status,
        status_changed_at,
        signed,
    })
}

fn signer_evidence(signer: &Value) -> Option<SignatoryEvidence> {
    let status = signer.get("status").and_then(Value::as_str)?;
    if !status.eq_ignore_ascii_case("completed") {
        return None;
    }
    let party_id = signer.get("email").and_then(Value::as_str)?.to_string();
    let signed_at = signer
        .get("signedDateTime")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    Some(SignatoryEvidence {
        party_id,
        evidence: SignatureEvidence {
            signed_at,
            origin_address: signer
                .get("clientIPAddress")
                .and_then(Value::as_str)
                .map(str::to_string),
            signature_data: None,
        },
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed_event() -> Value {
        json!({
            "event": "envelope-completed",
            "apiVersion": "v2.1",
            "uri": "/restapi/v2.1/accounts/acc-1/envelopes/env-1",
            "retryCount": 0,
            "configurationId": 10,
            "generatedDateTime": "2026-03-01T10:00:00Z",
            "data": {
                "accountId": "acc-1",
                "userId": "user-1",
                "envelopeId": "env-1",
                "envelopeSummary": {
                    "envelopeId": "env-1",
                    "status": "completed",
                    "statusChangedDateTime": "2026-03-01T09:59:58Z",
                    "documents": [],
                    "recipients": {
                        "signers": [
                            {
                                "email": "a@example.org",
                                "status": "completed",
                                "signedDateTime": "2026-03-01T09:58:00Z",
                                "clientIPAddress": "10.0.0.7"
                            },
                            { "email": "b@example.org", "status": "sent" }
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_completed_event() {
        let notice = parse_webhook(&completed_event()).unwrap();
        assert_eq!(notice.envelope_id, "env-1");
        assert_eq!(notice.status(), Some(SignatureStatus::Completed));
        assert!(notice.status_changed_at.is_some());
        assert_eq!(notice.signed.len(), 1);
        assert_eq!(notice.signed[0].party_id, "a@example.org");
        assert_eq!(
            notice.signed[0].evidence.origin_address.as_deref(),
            Some("10.0.0.7")
        );
        assert!(!notice.exceeds_retry_limit());
    }

    #[test]
    fn test_status_from_event_name_when_summary_missing() {
        let notice = parse_webhook(&json!({
            "event": "envelope.declined",
            "envelopeId": "env-2"
        }))
        .unwrap();
        assert_eq!(notice.status(), Some(SignatureStatus::Declined));
    }

    #[test]
    fn test_malformed_bodies_yield_none() {
        assert!(parse_webhook(&json!(null)).is_none());
        assert!(parse_webhook(&json!({ "event": "envelope-sent" })).is_none());
        assert!(parse_webhook(&json!({ "envelopeId": "" })).is_none());
        assert!(parse_webhook(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_retry_count_as_string() {
        let notice = parse_webhook(&json!({
            "envelopeId": "env-3",
            "retryCount": "9"
        }))
        .unwrap();
        assert_eq!(notice.retry_count, 9);
        assert!(notice.exceeds_retry_limit());
    }
}
