//! Prometheus metrics for signature orchestration.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec};

lazy_static! {
    /// Initiation results by provider
    pub static ref INITIATION_RESULT: IntCounterVec = register_int_counter_vec!(
        "signature_initiation_total",
        "Signature initiations by provider and result",
        &["provider", "result"]
    )
    .expect("Failed to register signature_initiation_total metric");

    /// Failovers from one provider to another
    pub static ref FAILOVERS: IntCounterVec = register_int_counter_vec!(
        "signature_failover_total",
        "Failovers by failed and fallback provider",
        &["from_provider", "to_provider"]
    )
    .expect("Failed to register signature_failover_total metric");

    /// Request status transitions
    pub static ref STATUS_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "signature_status_transitions_total",
        "Signature request status transitions",
        &["from_state", "to_state"]
    )
    .expect("Failed to register signature_status_transitions_total metric");

    /// Provider availability (1 = available)
    pub static ref PROVIDER_AVAILABLE: IntGaugeVec = register_int_gauge_vec!(
        "signature_provider_available",
        "Provider availability as last observed",
        &["provider"]
    )
    .expect("Failed to register signature_provider_available metric");

    /// Records written by reconciliation, by source
    pub static ref SYNC_WRITES: IntCounterVec = register_int_counter_vec!(
        "signature_sync_writes_total",
        "Session updates written by status reconciliation",
        &["source"]
    )
    .expect("Failed to register signature_sync_writes_total metric");
}

pub fn record_initiation(provider: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    INITIATION_RESULT.with_label_values(&[provider, result]).inc();
}

pub fn record_failover(from: &str, to: &str) {
    FAILOVERS.with_label_values(&[from, to]).inc();
}

pub fn record_transition(from: &str, to: &str) {
    STATUS_TRANSITIONS.with_label_values(&[from, to]).inc();
}

pub fn set_provider_available(provider: &str, available: bool) {
    PROVIDER_AVAILABLE
        .with_label_values(&[provider])
        .set(i64::from(available));
}

pub fn record_sync_write(source: &str) {
    SYNC_WRITES.with_label_values(&[source]).inc();
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render() {
        record_initiation("pki", true);
        set_provider_available("pki", true);
        let text = gather_text();
        assert!(text.contains("signature_initiation_total"));
        assert!(text.contains("signature_provider_available"));
    }
}
