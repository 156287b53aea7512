//! # Hub Module
//!
//! Coordination with the other bot processes sharing the same hub. A command
//! is announced with a dispatch request and only runs here once the hub
//! answers `proceed` for this process.

pub mod dispatcher;
pub mod nats;
pub mod schema;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

pub use schema::{DispatchRequest, HubResolution, Topic};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub is not connected")]
    NotConnected,

    #[error("failed to connect to hub: {0}")]
    Connect(String),

    #[error("failed to publish to {subject}: {reason}")]
    Publish { subject: String, reason: String },

    #[error("failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("invalid hub payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Called with the raw payload of every message on a subscribed topic.
pub type PayloadHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Persistent connection to the coordination hub.
///
/// Implementations reconnect on their own; callers treat a disconnected
/// transport as a reason to run commands locally, never as a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn subscribe(&self, topic: &str, handler: PayloadHandler) -> Result<(), HubError>;

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), HubError>;
}

/// Transport used when no hub is configured: always disconnected.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl SyncTransport for OfflineTransport {
    fn is_connected(&self) -> bool {
        false
    }

    async fn subscribe(&self, _topic: &str, _handler: PayloadHandler) -> Result<(), HubError> {
        Ok(())
    }

    async fn publish(&self, _topic: &str, _payload: Bytes) -> Result<(), HubError> {
        Err(HubError::NotConnected)
    }
}
