use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RouteStore;
use crate::model::{RealTimeUpdate, RoutePlan, RouteStatus};

/// Process-local store, used by the CLI and tests.
#[derive(Default)]
pub struct InMemoryRouteStore {
    plans: RwLock<HashMap<Uuid, RoutePlan>>,
    updates: RwLock<Vec<RealTimeUpdate>>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn find(&self, id: Uuid) -> Result<Option<RoutePlan>> {
        Ok(self.plans.read().await.get(&id).cloned())
    }

    async fn insert(&self, plan: &RoutePlan) -> Result<()> {
        let mut plans = self.plans.write().await;
        if plans.contains_key(&plan.id) {
            return Err(anyhow!("route {} already exists", plan.id));
        }
        plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn update(&self, plan: &RoutePlan) -> Result<()> {
        let mut plans = self.plans.write().await;
        match plans.get_mut(&plan.id) {
            Some(stored) => {
                *stored = plan.clone();
                Ok(())
            }
            None => Err(anyhow!("route {} does not exist", plan.id)),
        }
    }

    async fn candidates(
        &self,
        statuses: &[RouteStatus],
        created_after: DateTime<Utc>,
    ) -> Result<Vec<RoutePlan>> {
        let plans = self.plans.read().await;
        let mut found: Vec<RoutePlan> = plans
            .values()
            .filter(|p| !p.archived && statuses.contains(&p.status) && p.created_at >= created_after)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn record_update(&self, update: &RealTimeUpdate) -> Result<()> {
        self.updates.write().await.push(update.clone());
        Ok(())
    }

    async fn updates_for(&self, route_id: Uuid) -> Result<Vec<RealTimeUpdate>> {
        Ok(self
            .updates
            .read()
            .await
            .iter()
            .filter(|u| u.route_id == route_id)
            .cloned()
            .collect())
    }
}
