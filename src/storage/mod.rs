//! Storage collaborator interface.
//!
//! The engine only needs find/insert/update by id plus equality and range
//! filters on status and creation time.

mod memory;

pub use memory::InMemoryRouteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{RealTimeUpdate, RoutePlan, RouteStatus};

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<RoutePlan>>;

    async fn insert(&self, plan: &RoutePlan) -> Result<()>;

    /// Replaces the stored plan with the same id. Errors if it does not exist.
    async fn update(&self, plan: &RoutePlan) -> Result<()>;

    /// Non-archived plans in one of `statuses` created at or after `created_after`.
    async fn candidates(
        &self,
        statuses: &[RouteStatus],
        created_after: DateTime<Utc>,
    ) -> Result<Vec<RoutePlan>>;

    async fn record_update(&self, update: &RealTimeUpdate) -> Result<()>;

    async fn updates_for(&self, route_id: Uuid) -> Result<Vec<RealTimeUpdate>>;
}
