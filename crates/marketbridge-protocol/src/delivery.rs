//! Delivery capability implemented by chat platform gateways.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Message;

/// Visibility of a newly created thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadVisibility {
    /// Only invited members (and moderators) can see the thread.
    #[default]
    Private,
    /// Everyone who can see the parent channel can see the thread.
    Public,
}

/// Handle to a thread created by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    /// Thread identifier; a valid destination for [`DeliveryGateway::send_message`].
    pub id: String,
    /// Channel the thread was created under.
    pub parent_id: String,
    pub name: String,
}

/// Receipt for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub destination_id: String,
    pub message_id: String,
}

/// Errors a gateway reports for a single delivery operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The destination id is not something the platform can address.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// The destination exists but does not accept this operation.
    #[error("destination {id} does not support {operation}")]
    Unsupported { id: String, operation: String },

    /// The platform refused the call because of rate limiting.
    #[error("rate limited by platform")]
    RateLimited,

    /// The platform rejected or failed the call.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Capability used by the dispatcher to reach a chat platform.
///
/// Every call is a single attempt; implementations must not retry.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Gateway name, for logs.
    fn name(&self) -> &'static str;

    /// Post a message to a channel or thread.
    async fn send_message(
        &self,
        destination_id: &str,
        message: &Message,
    ) -> Result<SentMessage, DeliveryError>;

    /// Create a thread under a channel.
    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        visibility: ThreadVisibility,
    ) -> Result<ThreadHandle, DeliveryError>;

    /// Add a platform user to a thread.
    async fn add_member(&self, thread: &ThreadHandle, user_id: &str) -> Result<(), DeliveryError>;
}
