//! Envelope status vocabulary.

use common::SignatureStatus;

/// Map a remote envelope status onto the shared status vocabulary.
///
/// Unknown statuses (`created`, `correct`, ...) map to `draft`.
pub fn map_envelope_status(remote: &str) -> SignatureStatus {
    match remote.to_ascii_lowercase().as_str() {
        "sent" => SignatureStatus::Sent,
        "delivered" => SignatureStatus::Viewed,
        "completed" => SignatureStatus::Completed,
        "declined" => SignatureStatus::Declined,
        "voided" => SignatureStatus::Expired,
        _ => SignatureStatus::Draft,
    }
}
