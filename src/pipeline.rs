//! Request-level orchestration: verify, decode, apply.
//!
//! Each call is independent and runs start to finish in one pass. The
//! pipeline never retries; a transient store failure is reported so the
//! transport can answer with a 5xx and let the provider redeliver.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::event;
use crate::store::UserStore;
use crate::sync::{self, SyncOutcome};
use crate::types::WebhookHeaders;
use crate::verification::SignatureVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Missing headers, stale timestamp or no matching signature. Which
    /// check failed is not exposed.
    InvalidSignature,
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Rejected(Rejection),
    Processed(SyncOutcome),
    Failed(Failure),
}

/// Coarse classification of an outcome, used for logging and for deciding
/// whether the provider should redeliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    AuthenticationFailure,
    MalformedInput,
    PolicyIgnore,
    TransientStoreFailure,
    Success,
}

impl OutcomeClass {
    pub fn is_retryable(self) -> bool {
        self == OutcomeClass::TransientStoreFailure
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeClass::AuthenticationFailure => "authentication_failure",
            OutcomeClass::MalformedInput => "malformed_input",
            OutcomeClass::PolicyIgnore => "policy_ignore",
            OutcomeClass::TransientStoreFailure => "transient_store_failure",
            OutcomeClass::Success => "success",
        }
    }
}

impl PipelineOutcome {
    pub fn class(&self) -> OutcomeClass {
        match self {
            PipelineOutcome::Rejected(Rejection::InvalidSignature) => {
                OutcomeClass::AuthenticationFailure
            }
            PipelineOutcome::Rejected(Rejection::Malformed) => OutcomeClass::MalformedInput,
            PipelineOutcome::Processed(
                SyncOutcome::IgnoredNoEmail | SyncOutcome::IgnoredUnknownType,
            ) => OutcomeClass::PolicyIgnore,
            PipelineOutcome::Processed(SyncOutcome::Applied | SyncOutcome::Deleted) => {
                OutcomeClass::Success
            }
            PipelineOutcome::Failed(Failure::Internal) => OutcomeClass::TransientStoreFailure,
        }
    }
}

pub struct WebhookPipeline {
    verifier: SignatureVerifier,
    store: Arc<dyn UserStore>,
}

impl WebhookPipeline {
    pub fn new(verifier: SignatureVerifier, store: Arc<dyn UserStore>) -> Self {
        Self { verifier, store }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub async fn handle(
        &self,
        raw_body: &[u8],
        headers: &WebhookHeaders,
        now: DateTime<Utc>,
    ) -> PipelineOutcome {
        let event_id = headers.event_id.as_deref().unwrap_or("-");

        if !self.verifier.verify(raw_body, headers, now) {
            tracing::warn!(
                event_id,
                body_digest = %body_fingerprint(raw_body),
                "rejected webhook: invalid signature"
            );
            return PipelineOutcome::Rejected(Rejection::InvalidSignature);
        }

        let event = match event::decode(raw_body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(event_id, error = %e, "rejected webhook: malformed payload");
                return PipelineOutcome::Rejected(Rejection::Malformed);
            }
        };

        match sync::apply(&event, self.store.as_ref(), now).await {
            Ok(outcome) => {
                let result = PipelineOutcome::Processed(outcome);
                tracing::info!(
                    event_id,
                    event_type = %event.event_type,
                    subject_id = %event.subject_id,
                    outcome = result.class().as_str(),
                    "webhook processed"
                );
                result
            }
            Err(e) => {
                tracing::error!(
                    event_id,
                    event_type = %event.event_type,
                    subject_id = %event.subject_id,
                    error = %e,
                    "webhook processing failed"
                );
                PipelineOutcome::Failed(Failure::Internal)
            }
        }
    }
}

/// Short, non-reversible body identifier for correlating rejected
/// deliveries in logs.
fn body_fingerprint(raw_body: &[u8]) -> String {
    let digest = Sha256::digest(raw_body);
    hex::encode(&digest[..8])
}
