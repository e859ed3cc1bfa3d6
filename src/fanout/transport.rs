//! Real-time transports. The fanout only needs "deliver to named rooms".

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::Notification;
use crate::fetch::{HttpClient, post};

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn emit(&self, rooms: &[String], event: &str, payload: &Value) -> Result<()>;
}

/// In-process transport; observers subscribe and filter by room.
pub struct BroadcastTransport {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl RealtimeTransport for BroadcastTransport {
    async fn emit(&self, rooms: &[String], event: &str, payload: &Value) -> Result<()> {
        let notification = Notification {
            rooms: rooms.to_vec(),
            event: event.to_string(),
            payload: payload.clone(),
        };
        if self.sender.send(notification).is_err() {
            debug!(event, "No subscribers for notification");
        }
        Ok(())
    }
}

/// Posts each notification to a socket relay over HTTP.
pub struct WebhookTransport<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> WebhookTransport<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> RealtimeTransport for WebhookTransport<C> {
    async fn emit(&self, rooms: &[String], event: &str, payload: &Value) -> Result<()> {
        let body = serde_json::json!({
            "rooms": rooms,
            "event": event,
            "payload": payload,
        });
        post(&self.client, &self.url, &body).await
    }
}

/// Writes notifications to the log; used when no relay is configured.
pub struct LogTransport;

#[async_trait]
impl RealtimeTransport for LogTransport {
    async fn emit(&self, rooms: &[String], event: &str, payload: &Value) -> Result<()> {
        info!(rooms = ?rooms, event, payload = %payload, "Notification");
        Ok(())
    }
}
