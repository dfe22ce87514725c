//! Test doubles shared by unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use http_body_util::BodyExt;
use marketbridge_protocol::{
    DeliveryError, DeliveryGateway, Message, SentMessage, ThreadHandle, ThreadVisibility,
};
use serde_json::Value;

use crate::auth::WebhookAuth;
use crate::catalog::CategoryCatalog;
use crate::dispatcher::Dispatcher;
use crate::format::MessageFormatter;
use crate::resolver::DestinationResolver;
use crate::routing::{MemoryRoutingStore, RoutingLookup, RoutingTable};
use crate::server::AppState;

/// Gateway that records every call and fails on request.
#[derive(Default)]
pub struct RecordingGateway {
    fail_sends: HashSet<String>,
    fail_threads: HashSet<String>,
    fail_members: HashSet<String>,
    send_delay: Option<Duration>,
    sent: Mutex<Vec<(String, Message)>>,
    threads: Mutex<Vec<(ThreadHandle, ThreadVisibility)>>,
    members: Mutex<Vec<(String, String)>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to this destination fail.
    pub fn failing_send(mut self, destination: &str) -> Self {
        self.fail_sends.insert(destination.to_string());
        self
    }

    /// Thread creation under this channel fails.
    pub fn failing_thread(mut self, channel: &str) -> Self {
        self.fail_threads.insert(channel.to_string());
        self
    }

    /// Adding this user to a thread fails.
    pub fn failing_member(mut self, user_id: &str) -> Self {
        self.fail_members.insert(user_id.to_string());
        self
    }

    /// Every send waits this long before it is recorded.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|(d, _)| d).collect()
    }

    pub fn threads(&self) -> Vec<(ThreadHandle, ThreadVisibility)> {
        self.threads.lock().unwrap().clone()
    }

    pub fn members(&self) -> Vec<(String, String)> {
        self.members.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_message(
        &self,
        destination_id: &str,
        message: &Message,
    ) -> Result<SentMessage, DeliveryError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        // Failed attempts are recorded too: the attempt happened.
        let mut sent = self.sent.lock().unwrap();
        sent.push((destination_id.to_string(), message.clone()));
        if self.fail_sends.contains(destination_id) {
            return Err(DeliveryError::Platform(format!(
                "missing access to {destination_id}"
            )));
        }
        Ok(SentMessage {
            destination_id: destination_id.to_string(),
            message_id: format!("msg-{}", sent.len()),
        })
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        visibility: ThreadVisibility,
    ) -> Result<ThreadHandle, DeliveryError> {
        if self.fail_threads.contains(channel_id) {
            return Err(DeliveryError::Unsupported {
                id: channel_id.to_string(),
                operation: "create_thread".to_string(),
            });
        }
        let handle = ThreadHandle {
            id: format!("thread-{channel_id}"),
            parent_id: channel_id.to_string(),
            name: name.to_string(),
        };
        self.threads
            .lock()
            .unwrap()
            .push((handle.clone(), visibility));
        Ok(handle)
    }

    async fn add_member(&self, thread: &ThreadHandle, user_id: &str) -> Result<(), DeliveryError> {
        if self.fail_members.contains(user_id) {
            return Err(DeliveryError::Platform(format!("unknown user {user_id}")));
        }
        self.members
            .lock()
            .unwrap()
            .push((thread.id.clone(), user_id.to_string()));
        Ok(())
    }
}

/// Routing lookup that counts reads and never resolves anything.
#[derive(Default)]
pub struct SpyLookup {
    calls: AtomicUsize,
}

impl SpyLookup {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingLookup for SpyLookup {
    async fn resolve(&self, _scope: &str, _category: Option<&str>) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }

    async fn scopes(&self) -> Vec<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }
}

pub const TEST_WEBHOOK_SECRET: &str = "hook-secret";
pub const TEST_ADMIN_TOKEN: &str = "admin-token";

/// Application state over an in-memory routing table seeded with `routes`.
pub async fn test_state(
    gateway: Arc<RecordingGateway>,
    routes: &[(&str, Option<&str>, &str)],
) -> AppState {
    let table = Arc::new(RoutingTable::open(Arc::new(MemoryRoutingStore::default())).await);
    for (scope, category, destination) in routes {
        table.configure(scope, destination, *category).await.unwrap();
    }
    let catalog = Arc::new(CategoryCatalog::builtin());
    let dispatcher = Dispatcher::new(
        DestinationResolver::new(table.clone()),
        MessageFormatter::new("https://market.example", catalog.clone()),
        gateway,
    );
    AppState {
        dispatcher,
        routes: table,
        catalog,
        webhook_auth: WebhookAuth::new("x-webhook-secret", Some(TEST_WEBHOOK_SECRET.to_string())),
        admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
