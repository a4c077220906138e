//! Decoding of provider payloads into [`WebhookEvent`].
//!
//! Unknown fields are ignored at every level so provider schema additions
//! never break decoding. Only `type` and `data.id` are mandatory; connectivity
//! test payloads routinely arrive with no email addresses at all.

use serde::Deserialize;

use crate::error::DecodeError;
use crate::types::{EmailCandidate, WebhookEvent};

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

const VERIFIED_STATUS: &str = "verified";

#[derive(Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
    #[serde(default)]
    email_addresses: Option<Vec<EmailAddress>>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    profile_image_url: Option<String>,
}

#[derive(Deserialize)]
struct EmailAddress {
    id: String,
    email_address: String,
    #[serde(default)]
    verification: Option<Verification>,
}

#[derive(Deserialize)]
struct Verification {
    #[serde(default)]
    status: Option<String>,
}

impl From<EmailAddress> for EmailCandidate {
    fn from(email: EmailAddress) -> Self {
        let verified = email
            .verification
            .and_then(|v| v.status)
            .is_some_and(|status| status == VERIFIED_STATUS);
        EmailCandidate {
            address_id: email.id,
            address: email.email_address,
            verified,
        }
    }
}

pub fn decode(raw_body: &[u8]) -> Result<WebhookEvent, DecodeError> {
    let envelope: EventEnvelope = serde_json::from_slice(raw_body)?;

    if envelope.event_type.trim().is_empty() {
        return Err(DecodeError::MalformedPayload("empty event type".to_string()));
    }
    if envelope.data.id.trim().is_empty() {
        return Err(DecodeError::MalformedPayload("empty subject id".to_string()));
    }

    let data = envelope.data;
    Ok(WebhookEvent {
        event_type: envelope.event_type,
        subject_id: data.id,
        email_candidates: data
            .email_addresses
            .unwrap_or_default()
            .into_iter()
            .map(EmailCandidate::from)
            .collect(),
        primary_email_address_id: data.primary_email_address_id,
        first_name: data.first_name,
        last_name: data.last_name,
        avatar_url: data.profile_image_url,
    })
}
