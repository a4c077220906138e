//! Verified identity-provider webhooks, synchronised into a local user store.
//!
//! A delivery flows through [`verification::SignatureVerifier`],
//! [`event::decode`] and [`sync::apply`], orchestrated by
//! [`pipeline::WebhookPipeline`]; [`http_server`] is the axum transport.

pub mod config;
pub mod error;
pub mod event;
pub mod http_server;
pub mod logger;
pub mod pipeline;
pub mod sqlite;
pub mod store;
pub mod sync;
pub mod types;
pub mod verification;

pub use config::{AppConfig, WebhookSecret};
pub use error::{ConfigError, DecodeError, StoreError};
pub use pipeline::{Failure, OutcomeClass, PipelineOutcome, Rejection, WebhookPipeline};
pub use sqlite::SqliteUserStore;
pub use store::{InMemoryUserStore, UserStore};
pub use sync::SyncOutcome;
pub use types::{EmailCandidate, UserProfile, UserRecord, WebhookEvent, WebhookHeaders};
pub use verification::SignatureVerifier;
