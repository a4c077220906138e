use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{UserProfile, UserRecord};

/// Persistence for synced users, keyed by the provider's user id.
///
/// `upsert` must be atomic per `external_auth_id`: two concurrent deliveries
/// for the same identity may never produce two records. Implementations
/// enforce this at the storage layer (a unique key plus a single
/// read-modify-write), since several service instances can share a store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_external_id(
        &self,
        external_auth_id: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create the record or overwrite its profile fields. Never touches
    /// `account_enabled` or `deleted_at` of an existing record.
    async fn upsert(
        &self,
        profile: UserProfile,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError>;

    /// Mark the record disabled and deleted. Returns `false` when no record
    /// exists. A second delete keeps the original `deleted_at`.
    async fn soft_delete(
        &self,
        external_auth_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Process-local store. The write guard spans the whole read-modify-write,
/// which gives the per-id atomicity within one instance.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_external_id(
        &self,
        external_auth_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(external_auth_id).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert(
        &self,
        profile: UserProfile,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&profile.external_auth_id) {
            Some(existing) => {
                existing.apply_profile(&profile, now);
                Ok(existing.clone())
            }
            None => {
                let record = UserRecord::from_profile(profile, now);
                users.insert(record.external_auth_id.clone(), record.clone());
                Ok(record)
            }
        }
    }

    async fn soft_delete(
        &self,
        external_auth_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(external_auth_id) {
            Some(user) => {
                user.account_enabled = false;
                user.deleted_at.get_or_insert(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
