//! Route-lifecycle notifications.
//!
//! `publish` only enqueues; a background worker performs the emit. Failures
//! are logged and dropped, so a notification can never hold up or undo the
//! write that caused it.

mod transport;

pub use transport::{BroadcastTransport, LogTransport, RealtimeTransport, WebhookTransport};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{Instrument, warn};

use crate::model::RoutePlan;

pub const DISPATCHER_ROOM: &str = "role:dispatcher";
pub const ADMIN_ROOM: &str = "role:admin";

/// Notifications waiting for the worker before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Assignment,
    Completion,
    Reoptimize,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Assignment => "assignment",
            EventType::Completion => "completion",
            EventType::Reoptimize => "reoptimize",
        };
        f.write_str(s)
    }
}

/// One emit: every room receives the same event and payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub rooms: Vec<String>,
    pub event: String,
    pub payload: Value,
}

/// Role, company and driver rooms for `plan`, without duplicates.
pub fn target_rooms(plan: &RoutePlan) -> Vec<String> {
    let mut rooms = vec![DISPATCHER_ROOM.to_string(), ADMIN_ROOM.to_string()];
    if let Some(company) = &plan.company_id {
        rooms.push(format!("company:{company}"));
    }
    if let Some(driver) = &plan.driver_id {
        rooms.push(format!("user:{driver}"));
    }

    let mut unique = Vec::with_capacity(rooms.len());
    for room in rooms {
        if !unique.contains(&room) {
            unique.push(room);
        }
    }
    unique
}

fn payload(plan: &RoutePlan, event_type: EventType, message: &str) -> Value {
    json!({
        "type": event_type,
        "message": message,
        "routeId": plan.id,
        "status": plan.status,
        "companyId": plan.company_id,
        "driverId": plan.driver_id,
        "generatedBy": plan.generated_by,
        "totalDistance": plan.total_distance,
        "estimatedTime": plan.estimated_time,
        "totalCost": plan.cost_breakdown.total(),
        "timestamp": Utc::now(),
    })
}

#[derive(Clone)]
pub struct NotificationFanout {
    queue: mpsc::Sender<Notification>,
}

impl NotificationFanout {
    /// Starts the delivery worker. It runs until every fanout handle is dropped.
    pub fn spawn(transport: Arc<dyn RealtimeTransport>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(transport, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity(
        transport: Arc<dyn RealtimeTransport>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let worker = tokio::spawn(
            async move {
                while let Some(n) = rx.recv().await {
                    if let Err(e) = transport.emit(&n.rooms, &n.event, &n.payload).await {
                        warn!(event = %n.event, rooms = ?n.rooms, error = %e, "Notification delivery failed");
                    }
                }
            }
            .instrument(tracing::info_span!("fanout_worker")),
        );
        (Self { queue }, worker)
    }

    pub fn publish(&self, plan: &RoutePlan, event_type: EventType, message: &str) {
        let notification = Notification {
            rooms: target_rooms(plan),
            event: format!("route:{event_type}"),
            payload: payload(plan, event_type, message),
        };
        match self.queue.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(route_id = %plan.id, event = %event_type, "Notification queue full, notification dropped");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(route_id = %plan.id, event = %event_type, "Fanout worker stopped, notification dropped");
            }
        }
    }
}
