//! Operator-facing route lifecycle.
//!
//! Every write takes the per-route lock, so an edit never interleaves with a
//! background re-optimization of the same route.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::RouteError;
use crate::fanout::{EventType, NotificationFanout};
use crate::locks::RouteLocks;
use crate::model::{DeliveryStop, RouteConstraints, RoutePlan, RouteStatus, VehicleProfile};
use crate::storage::RouteStore;
use crate::synthesis::SynthesisEngine;

#[derive(Clone)]
pub struct RouteService {
    synthesis: Arc<SynthesisEngine>,
    store: Arc<dyn RouteStore>,
    fanout: NotificationFanout,
    locks: Arc<RouteLocks>,
}

impl RouteService {
    pub fn new(
        synthesis: Arc<SynthesisEngine>,
        store: Arc<dyn RouteStore>,
        fanout: NotificationFanout,
        locks: Arc<RouteLocks>,
    ) -> Self {
        Self {
            synthesis,
            store,
            fanout,
            locks,
        }
    }

    /// Synthesizes and persists a new draft. Nothing is stored if any stop
    /// fails to geocode.
    #[tracing::instrument(skip_all, fields(stops = deliveries.len()))]
    pub async fn create_route(
        &self,
        deliveries: Vec<DeliveryStop>,
        vehicle: VehicleProfile,
        constraints: RouteConstraints,
        company_id: Option<String>,
    ) -> Result<RoutePlan, RouteError> {
        let priced = self
            .synthesis
            .synthesize(&deliveries, &vehicle, &constraints)
            .await?;
        let mut plan = RoutePlan::draft(deliveries, vehicle, constraints, priced);
        plan.company_id = company_id;

        self.store.insert(&plan).await?;
        info!(route_id = %plan.id, "Route created");
        self.fanout.publish(&plan, EventType::Create, "New route created");
        Ok(plan)
    }

    /// Replaces deliveries, vehicle and constraints and re-synthesizes.
    #[tracing::instrument(skip(self, deliveries, vehicle, constraints))]
    pub async fn edit_route(
        &self,
        id: Uuid,
        deliveries: Vec<DeliveryStop>,
        vehicle: VehicleProfile,
        constraints: RouteConstraints,
    ) -> Result<RoutePlan, RouteError> {
        let _lock = self.locks.acquire(id).await;
        let mut plan = self.load(id).await?;
        if plan.status.is_terminal() {
            return Err(RouteError::InvalidTransition {
                id,
                from: plan.status,
                to: plan.status,
            });
        }

        let priced = self
            .synthesis
            .synthesize(&deliveries, &vehicle, &constraints)
            .await?;
        plan.deliveries = deliveries;
        plan.vehicle = vehicle;
        plan.constraints = constraints;
        plan.apply(priced);

        self.store.update(&plan).await?;
        self.fanout.publish(&plan, EventType::Update, "Route updated");
        Ok(plan)
    }

    pub async fn assign_driver(&self, id: Uuid, driver_id: &str) -> Result<RoutePlan, RouteError> {
        let plan = self
            .modify(id, |plan| {
                plan.driver_id = Some(driver_id.to_string());
                Ok(())
            })
            .await?;
        self.fanout.publish(
            &plan,
            EventType::Assignment,
            &format!("Route assigned to driver {driver_id}"),
        );
        Ok(plan)
    }

    pub async fn update_status(&self, id: Uuid, status: RouteStatus) -> Result<RoutePlan, RouteError> {
        let plan = self
            .modify(id, |plan| {
                if !plan.status.can_transition_to(status) {
                    return Err(RouteError::InvalidTransition {
                        id,
                        from: plan.status,
                        to: status,
                    });
                }
                plan.status = status;
                Ok(())
            })
            .await?;

        let event = if status == RouteStatus::Completed {
            EventType::Completion
        } else {
            EventType::Update
        };
        self.fanout
            .publish(&plan, event, &format!("Route status changed to {status}"));
        Ok(plan)
    }

    /// The vehicle left for `leg`. An active route becomes in-progress.
    pub async fn record_departure(&self, id: Uuid, leg: usize) -> Result<RoutePlan, RouteError> {
        let plan = self
            .modify(id, |plan| {
                if plan.status.is_terminal() {
                    return Err(RouteError::InvalidTransition {
                        id,
                        from: plan.status,
                        to: RouteStatus::InProgress,
                    });
                }
                if plan.status == RouteStatus::Active {
                    plan.status = RouteStatus::InProgress;
                }
                plan.active_leg = leg.min(plan.route.len().saturating_sub(1));
                plan.is_stationary = false;
                plan.last_departed_at = Some(Utc::now());
                Ok(())
            })
            .await?;
        self.fanout.publish(&plan, EventType::Update, "Vehicle departed");
        Ok(plan)
    }

    pub async fn mark_stationary(&self, id: Uuid) -> Result<RoutePlan, RouteError> {
        self.modify(id, |plan| {
            plan.is_stationary = true;
            Ok(())
        })
        .await
    }

    /// Soft delete. Archived routes are never picked up by the sweep.
    pub async fn archive(&self, id: Uuid) -> Result<RoutePlan, RouteError> {
        let plan = self
            .modify(id, |plan| {
                plan.archived = true;
                Ok(())
            })
            .await?;
        self.fanout.publish(&plan, EventType::Update, "Route archived");
        Ok(plan)
    }

    async fn load(&self, id: Uuid) -> Result<RoutePlan, RouteError> {
        self.store.find(id).await?.ok_or(RouteError::NotFound(id))
    }

    async fn modify<F>(&self, id: Uuid, change: F) -> Result<RoutePlan, RouteError>
    where
        F: FnOnce(&mut RoutePlan) -> Result<(), RouteError>,
    {
        let _lock = self.locks.acquire(id).await;
        let mut plan = self.load(id).await?;
        change(&mut plan)?;
        plan.updated_at = Utc::now();
        self.store.update(&plan).await?;
        Ok(plan)
    }
}
