use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::event::{USER_CREATED, USER_DELETED, USER_UPDATED};
use crate::store::UserStore;
use crate::types::{EmailCandidate, UserProfile, WebhookEvent};

/// What a verified, decoded event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    /// Create/update without any email address, as sent by provider test
    /// deliveries. The store is not touched.
    IgnoredNoEmail,
    IgnoredUnknownType,
    /// Returned whether or not a record existed.
    Deleted,
}

/// The primary address when the provider names one that is present,
/// otherwise the first candidate.
pub fn select_primary_email(event: &WebhookEvent) -> Option<&EmailCandidate> {
    event
        .primary_email_address_id
        .as_deref()
        .and_then(|primary| {
            event
                .email_candidates
                .iter()
                .find(|candidate| candidate.address_id == primary)
        })
        .or_else(|| event.email_candidates.first())
}

/// Apply one event to the store. Replaying the same event converges to the
/// same stored state.
pub async fn apply(
    event: &WebhookEvent,
    store: &dyn UserStore,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    match event.event_type.as_str() {
        USER_CREATED | USER_UPDATED => upsert_user(event, store, now).await,
        USER_DELETED => delete_user(event, store, now).await,
        other => {
            tracing::info!(event_type = other, subject_id = %event.subject_id, "unhandled webhook event type");
            Ok(SyncOutcome::IgnoredUnknownType)
        }
    }
}

async fn upsert_user(
    event: &WebhookEvent,
    store: &dyn UserStore,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    let Some(email) = select_primary_email(event) else {
        tracing::info!(
            subject_id = %event.subject_id,
            "no email address on user event, likely a provider test delivery"
        );
        return Ok(SyncOutcome::IgnoredNoEmail);
    };

    let profile = UserProfile {
        external_auth_id: event.subject_id.clone(),
        email: email.address.clone(),
        first_name: event.first_name.clone().unwrap_or_default(),
        last_name: event.last_name.clone().unwrap_or_default(),
        photo_url: event.avatar_url.clone(),
        email_verified: email.verified,
    };

    let record = store.upsert(profile, now).await?;
    if record.is_deleted() {
        tracing::info!(
            subject_id = %event.subject_id,
            user_id = %record.id,
            "profile refreshed on a soft-deleted user, account stays disabled"
        );
    } else {
        tracing::info!(
            subject_id = %event.subject_id,
            user_id = %record.id,
            "user synchronized"
        );
    }
    Ok(SyncOutcome::Applied)
}

async fn delete_user(
    event: &WebhookEvent,
    store: &dyn UserStore,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    if store.soft_delete(&event.subject_id, now).await? {
        tracing::info!(subject_id = %event.subject_id, "user soft-deleted");
    } else {
        tracing::debug!(subject_id = %event.subject_id, "delete for a user that was never synced");
    }
    Ok(SyncOutcome::Deleted)
}
