//! Error types for the webhook pipeline and its collaborators.

/// The payload could not be turned into a [`crate::types::WebhookEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::MalformedPayload(err.to_string())
    }
}

/// Failure reported by a [`crate::store::UserStore`] implementation.
///
/// Every variant is treated as transient by the pipeline: the delivery is
/// answered with a 5xx so the provider redelivers it later.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A uniqueness constraint other than the `external_auth_id` upsert key
    /// rejected the write.
    #[error("conflicting record: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The secret is not `whsec_` followed by standard Base64.
    #[error("webhook secret is not valid base64")]
    InvalidSecret(#[source] base64::DecodeError),

    #[error("failed to load configuration: {0}")]
    Env(#[from] envconfig::Error),
}
