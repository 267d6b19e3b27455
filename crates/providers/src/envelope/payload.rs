//! Typed envelope definition sent to the remote e-signature service.

use base64::Engine;
use serde::{Deserialize, Serialize};

use common::{SignatureRequest, SigningDocument, WorkflowMode};

use crate::error::ProviderError;

/// Maximum subject length accepted by the remote service.
pub const MAX_SUBJECT_LEN: usize = 100;

/// Name of the custom field carrying the parent agreement id.
pub const MOU_CUSTOM_FIELD: &str = "mou_id";

/// Envelope status requested at creation. `sent` dispatches immediately.
const SEND_STATUS: &str = "sent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDefinition {
    pub email_subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_blurb: Option<String>,
    pub documents: Vec<EnvelopeDocument>,
    pub recipients: Recipients,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDocument {
    pub document_base64: String,
    pub name: String,
    pub file_extension: String,
    pub document_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipients {
    #[serde(default)]
    pub signers: Vec<Signer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub email: String,
    pub name: String,
    pub recipient_id: String,
    pub routing_order: String,
    pub tabs: Tabs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tabs {
    pub sign_here_tabs: Vec<AnchorTab>,
    pub date_signed_tabs: Vec<AnchorTab>,
}

/// A tab positioned relative to an anchor string in the document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorTab {
    pub anchor_string: String,
    pub anchor_units: String,
    pub anchor_x_offset: String,
    pub anchor_y_offset: String,
}

impl AnchorTab {
    fn at(anchor: String) -> Self {
        Self {
            anchor_string: anchor,
            anchor_units: "pixels".to_string(),
            anchor_x_offset: "0".to_string(),
            anchor_y_offset: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFields {
    pub text_custom_fields: Vec<TextCustomField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextCustomField {
    pub name: String,
    pub value: String,
    pub show: String,
    pub required: String,
}

impl EnvelopeDefinition {
    /// Build and validate the envelope for `request`.
    ///
    /// Sequential workflows get routing orders `1..=n` following the
    /// signatories' `order`; parallel workflows route everyone at `1`.
    pub fn from_request(
        request: &SignatureRequest,
        document: &SigningDocument,
        subject: Option<&str>,
        blurb: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let mut signatories: Vec<_> = request.signatories.iter().collect();
        if request.workflow == WorkflowMode::Sequential {
            signatories.sort_by_key(|s| s.order);
        }

        let signers = signatories
            .iter()
            .enumerate()
            .map(|(index, signatory)| {
                let position = index + 1;
                let routing_order = match request.workflow {
                    WorkflowMode::Sequential => position,
                    WorkflowMode::Parallel => 1,
                };
                Signer {
                    email: signatory.party_id.clone(),
                    name: signatory.party_id.clone(),
                    recipient_id: position.to_string(),
                    routing_order: routing_order.to_string(),
                    tabs: Tabs {
                        sign_here_tabs: vec![AnchorTab::at(format!("/sn{}/", position))],
                        date_signed_tabs: vec![AnchorTab::at(format!("/ds{}/", position))],
                    },
                }
            })
            .collect();

        let custom_fields = request.mou_id.as_ref().map(|mou_id| CustomFields {
            text_custom_fields: vec![TextCustomField {
                name: MOU_CUSTOM_FIELD.to_string(),
                value: mou_id.clone(),
                show: "false".to_string(),
                required: "false".to_string(),
            }],
        });

        let email_subject = subject
            .map(str::to_string)
            .unwrap_or_else(|| format!("Please sign: {}", document.name));

        let definition = Self {
            email_subject,
            email_blurb: blurb.map(str::to_string),
            documents: vec![EnvelopeDocument {
                document_base64: base64::engine::general_purpose::STANDARD
                    .encode(&document.content),
                name: document.name.clone(),
                file_extension: file_extension(&document.name),
                document_id: "1".to_string(),
            }],
            recipients: Recipients { signers },
            custom_fields,
            status: SEND_STATUS.to_string(),
        };

        definition.validate()?;
        Ok(definition)
    }

    /// Reject envelopes the remote service would refuse.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.email_subject.trim().is_empty() {
            return Err(ProviderError::InvalidPayload("empty email subject".into()));
        }
        if self.email_subject.chars().count() > MAX_SUBJECT_LEN {
            return Err(ProviderError::InvalidPayload(format!(
                "email subject longer than {} characters",
                MAX_SUBJECT_LEN
            )));
        }
        if self.documents.is_empty() || self.documents.iter().any(|d| d.document_base64.is_empty())
        {
            return Err(ProviderError::InvalidPayload("envelope has no document content".into()));
        }
        if self.recipients.signers.is_empty() {
            return Err(ProviderError::InvalidPayload("envelope has no signers".into()));
        }
        for signer in &self.recipients.signers {
            if signer.name.trim().is_empty() || !signer.email.contains('@') {
                return Err(ProviderError::InvalidPayload(format!(
                    "signer {} has no usable email address",
                    signer.recipient_id
                )));
            }
        }
        Ok(())
    }
}

fn file_extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Signatory;

    fn request(workflow: WorkflowMode, signatories: Vec<Signatory>) -> SignatureRequest {
        SignatureRequest::new("doc-1", Some("mou-9".to_string()), signatories, workflow).unwrap()
    }

    fn document() -> SigningDocument {
        SigningDocument::new("agreement.pdf", b"%PDF-1.7 body".to_vec())
    }

    fn routing_orders(def: &EnvelopeDefinition) -> Vec<&str> {
        def.recipients
            .signers
            .iter()
            .map(|s| s.routing_order.as_str())
            .collect()
    }

    #[test]
    fn test_sequential_routing_follows_order() {
        let req = request(
            WorkflowMode::Sequential,
            vec![Signatory::new("b@example.org", 2), Signatory::new("a@example.org", 1)],
        );
        let def = EnvelopeDefinition::from_request(&req, &document(), None, None).unwrap();

        assert_eq!(routing_orders(&def), vec!["1", "2"]);
        assert_eq!(def.recipients.signers[0].email, "a@example.org");
        assert_eq!(def.recipients.signers[1].recipient_id, "2");
    }

    #[test]
    fn test_parallel_routing_is_flat() {
        let req = request(
            WorkflowMode::Parallel,
            vec![Signatory::new("a@example.org", 1), Signatory::new("b@example.org", 2)],
        );
        let def = EnvelopeDefinition::from_request(&req, &document(), None, None).unwrap();
        assert_eq!(routing_orders(&def), vec!["1", "1"]);
    }

    #[test]
    fn test_payload_shape() {
        let req = request(WorkflowMode::Parallel, vec![Signatory::new("a@example.org", 1)]);
        let def =
            EnvelopeDefinition::from_request(&req, &document(), Some("Sign the MoU"), None).unwrap();
        let json = serde_json::to_value(&def).unwrap();

        assert_eq!(json["emailSubject"], "Sign the MoU");
        assert_eq!(json["status"], "sent");
        assert_eq!(json["documents"][0]["fileExtension"], "pdf");
        assert_eq!(
            json["documents"][0]["documentBase64"],
            base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7 body")
        );
        let signer = &json["recipients"]["signers"][0];
        assert_eq!(signer["name"], "a@example.org");
        assert_eq!(signer["tabs"]["signHereTabs"][0]["anchorString"], "/sn1/");
        assert_eq!(signer["tabs"]["dateSignedTabs"][0]["anchorString"], "/ds1/");
        assert_eq!(json["customFields"]["textCustomFields"][0]["name"], "mou_id");
        assert_eq!(json["customFields"]["textCustomFields"][0]["value"], "mou-9");
        assert!(json.get("emailBlurb").is_none());
    }

    #[test]
    fn test_validation_rejects_bad_envelopes() {
        let no_signers = request(WorkflowMode::Parallel, vec![]);
        assert!(matches!(
            EnvelopeDefinition::from_request(&no_signers, &document(), None, None),
            Err(ProviderError::InvalidPayload(_))
        ));

        let bad_email = request(WorkflowMode::Parallel, vec![Signatory::new("contact-17", 1)]);
        assert!(EnvelopeDefinition::from_request(&bad_email, &document(), None, None).is_err());

        let ok = request(WorkflowMode::Parallel, vec![Signatory::new("a@example.org", 1)]);
        let empty_doc = SigningDocument::new("empty.pdf", Vec::new());
        assert!(EnvelopeDefinition::from_request(&ok, &empty_doc, None, None).is_err());

        let long_subject = "x".repeat(MAX_SUBJECT_LEN + 1);
        assert!(
            EnvelopeDefinition::from_request(&ok, &document(), Some(&long_subject), None).is_err()
        );
    }
}
