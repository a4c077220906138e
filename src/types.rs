use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The three provider headers a delivery must carry. A missing or
/// non-UTF-8 header is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub event_id: Option<String>,
}

impl WebhookHeaders {
    pub fn new(
        signature: impl Into<String>,
        timestamp: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            signature: Some(signature.into()),
            timestamp: Some(timestamp.into()),
            event_id: Some(event_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCandidate {
    pub address_id: String,
    pub address: String,
    pub verified: bool,
}

/// A decoded provider event. `event_type` stays an open string so new
/// provider event types can be ignored instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_type: String,
    pub subject_id: String,
    pub email_candidates: Vec<EmailCandidate>,
    pub primary_email_address_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Fields written by an upsert, keyed by `external_auth_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub external_auth_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: Option<String>,
    pub email_verified: bool,
}

/// Locally persisted user. Soft-deleted records keep `id` and
/// `external_auth_id`; they are never physically removed by the sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub external_auth_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: Option<String>,
    pub email_verified: bool,
    pub account_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A fresh, enabled record for a previously unseen identity.
    pub fn from_profile(profile: UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_auth_id: profile.external_auth_id,
            email: profile.email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            photo_url: profile.photo_url,
            email_verified: profile.email_verified,
            account_enabled: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Overwrite the synced fields. `updated_at` only moves when something
    /// actually changed, so replaying an event leaves the record untouched.
    /// `account_enabled` and `deleted_at` are left alone.
    pub fn apply_profile(&mut self, profile: &UserProfile, now: DateTime<Utc>) -> bool {
        let changed = self.email != profile.email
            || self.first_name != profile.first_name
            || self.last_name != profile.last_name
            || self.photo_url != profile.photo_url
            || self.email_verified != profile.email_verified;

        if changed {
            self.email = profile.email.clone();
            self.first_name = profile.first_name.clone();
            self.last_name = profile.last_name.clone();
            self.photo_url = profile.photo_url.clone();
            self.email_verified = profile.email_verified;
            self.updated_at = now;
        }
        changed
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
