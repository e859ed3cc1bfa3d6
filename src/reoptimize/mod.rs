//! Background re-optimization loop.
//!
//! Every sweep selects recent, non-terminal routes, samples traffic and
//! weather at each route's next stop, and only re-runs synthesis when the
//! advisor and the local telemetry agree that conditions changed.

pub mod signal;
pub mod state;

use anyhow::{Result, anyhow};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, warn};

use crate::advisor::{self, prompt};
use crate::config::DecisionConfig;
use crate::fanout::{EventType, NotificationFanout};
use crate::locks::RouteLocks;
use crate::model::{RealTimeUpdate, RoutePlan, RouteStatus};
use crate::output::append_update;
use crate::providers::WeatherQuery;
use crate::storage::RouteStore;
use crate::synthesis::SynthesisEngine;
use signal::{GateDecision, HoldReason, SignificanceSignal, gate};
use state::RouteMonitor;

/// Statuses the sweep considers live.
pub const CANDIDATE_STATUSES: [RouteStatus; 3] =
    [RouteStatus::Draft, RouteStatus::Active, RouteStatus::InProgress];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Another check or an operator edit holds the route.
    Busy,
    Held(HoldReason),
    Reoptimized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub candidates: usize,
    pub reoptimized: usize,
    pub held: usize,
    pub busy: usize,
    pub failed: usize,
}

struct Inner {
    synthesis: Arc<SynthesisEngine>,
    store: Arc<dyn RouteStore>,
    fanout: NotificationFanout,
    locks: Arc<RouteLocks>,
    monitor: Arc<RouteMonitor>,
    config: DecisionConfig,
    history_csv: Option<String>,
}

#[derive(Clone)]
pub struct DecisionEngine {
    inner: Arc<Inner>,
}

impl DecisionEngine {
    pub fn new(
        synthesis: Arc<SynthesisEngine>,
        store: Arc<dyn RouteStore>,
        fanout: NotificationFanout,
        locks: Arc<RouteLocks>,
        config: DecisionConfig,
    ) -> Self {
        Self::build(synthesis, store, fanout, locks, config, None)
    }

    /// Also appends every history record to a CSV file at `path`.
    pub fn with_history_csv(self, path: impl Into<String>) -> Self {
        let inner = &self.inner;
        Self::build(
            inner.synthesis.clone(),
            inner.store.clone(),
            inner.fanout.clone(),
            inner.locks.clone(),
            inner.config.clone(),
            Some(path.into()),
        )
    }

    fn build(
        synthesis: Arc<SynthesisEngine>,
        store: Arc<dyn RouteStore>,
        fanout: NotificationFanout,
        locks: Arc<RouteLocks>,
        config: DecisionConfig,
        history_csv: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                synthesis,
                store,
                fanout,
                locks,
                monitor: Arc::new(RouteMonitor::new()),
                config,
                history_csv,
            }),
        }
    }

    pub fn monitor(&self) -> &Arc<RouteMonitor> {
        &self.inner.monitor
    }

    /// Runs sweeps on the configured interval. `max_sweeps == 0` runs forever.
    #[tracing::instrument(skip(self), fields(interval_secs = self.inner.config.interval_secs))]
    pub async fn run(&self, max_sweeps: usize) {
        let mut ticker = tokio::time::interval(self.inner.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep_count = 0;

        loop {
            if max_sweeps > 0 && sweep_count >= max_sweeps {
                break;
            }
            ticker.tick().await;
            sweep_count += 1;

            let summary = self.sweep().await;
            info!(
                sweep = sweep_count,
                candidates = summary.candidates,
                reoptimized = summary.reoptimized,
                held = summary.held,
                busy = summary.busy,
                failed = summary.failed,
                "Sweep finished"
            );
        }
    }

    /// One pass over all candidate routes with bounded concurrency. A failing
    /// candidate is logged and counted, never propagated.
    pub async fn sweep(&self) -> SweepSummary {
        let since = Utc::now() - ChronoDuration::hours(self.inner.config.lookback_hours);
        let candidates = match self.inner.store.candidates(&CANDIDATE_STATUSES, since).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Failed to load candidate routes");
                return SweepSummary::default();
            }
        };

        let mut summary = SweepSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        let semaphore = Arc::new(Semaphore::new(self.inner.config.concurrency.max(1)));
        let mut tasks = Vec::with_capacity(candidates.len());

        for plan in candidates {
            let engine = self.clone();
            let sem = semaphore.clone();
            let span = tracing::info_span!("check_route", route_id = %plan.id, status = %plan.status);

            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();
                    engine.reoptimize_if_needed(plan).await
                }
                .instrument(span),
            ));
        }

        for task in tasks {
            match task.await {
                Ok(Ok(Outcome::Reoptimized)) => summary.reoptimized += 1,
                Ok(Ok(Outcome::Held(_))) => summary.held += 1,
                Ok(Ok(Outcome::Busy)) => summary.busy += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "Route check failed, skipping");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Route check task panicked");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Checks one route and re-runs synthesis if the gate opens.
    pub async fn reoptimize_if_needed(&self, plan: RoutePlan) -> Result<Outcome> {
        let inner = &self.inner;
        let Some(check) = inner.monitor.begin_check(plan.id) else {
            debug!("Route already being checked");
            return Ok(Outcome::Busy);
        };
        let Some(_lock) = inner.locks.try_acquire(plan.id) else {
            debug!("Route locked by another writer");
            return Ok(Outcome::Busy);
        };

        let at = plan
            .next_stop()
            .and_then(|stop| stop.coordinates)
            .ok_or_else(|| anyhow!("route {} has no resolved stops", plan.id))?;

        let adapters = inner.synthesis.adapters();
        let weather_query = WeatherQuery::At(at);
        let (traffic, weather) = tokio::join!(adapters.traffic(at), adapters.weather(&weather_query));
        let (traffic, weather) = (traffic.value, weather.value);
        let signal = SignificanceSignal::evaluate(&traffic, &weather, inner.config.delay_speed_ratio);

        let prompt = prompt::reoptimization_prompt(&plan, &traffic, &weather);
        let advice = advisor::advise_reoptimization(
            inner.synthesis.advisor().as_ref(),
            &prompt,
            inner.synthesis.config().advisor.timeout(),
        )
        .await
        .verified();

        let decision = gate(advice.as_ref(), &signal);
        debug!(
            speed_ratio = signal.speed_ratio,
            significant_delay = signal.significant_delay,
            severe_weather = signal.severe_weather,
            decision = ?decision,
            "Gate evaluated"
        );

        let mut update = RealTimeUpdate {
            route_id: plan.id,
            timestamp: Utc::now(),
            traffic,
            weather,
            significant_delay: signal.significant_delay,
            severe_weather: signal.severe_weather,
            advisor_reason: advice.map(|a| a.reason).unwrap_or_default(),
            reoptimized: false,
        };

        let outcome = match decision {
            GateDecision::Hold(reason) => Outcome::Held(reason),
            GateDecision::Reoptimize => {
                check.reoptimizing();
                if let Err(e) = self.commit(plan).await {
                    self.record(&update).await;
                    return Err(e);
                }
                update.reoptimized = true;
                Outcome::Reoptimized
            }
        };

        self.record(&update).await;
        Ok(outcome)
    }

    /// Re-synthesizes from the stored copy so edits made since the sweep
    /// loaded its candidates are not lost.
    async fn commit(&self, plan: RoutePlan) -> Result<()> {
        let inner = &self.inner;
        let mut current = inner.store.find(plan.id).await?.unwrap_or(plan);
        if current.status.is_terminal() || current.archived {
            return Err(anyhow!("route {} is no longer live", current.id));
        }

        let priced = inner
            .synthesis
            .synthesize(&current.deliveries, &current.vehicle, &current.constraints)
            .await?;
        current.apply(priced);
        // a recomputed path restarts the active phase, even mid-delivery
        current.status = RouteStatus::Active;
        inner.store.update(&current).await?;

        info!(
            distance_km = current.total_distance,
            total_cost = current.cost_breakdown.total(),
            "Route re-optimized"
        );
        inner.fanout.publish(
            &current,
            EventType::Reoptimize,
            "Route re-optimized for current traffic and weather",
        );
        Ok(())
    }

    async fn record(&self, update: &RealTimeUpdate) {
        if let Err(e) = self.inner.store.record_update(update).await {
            warn!(error = %e, "Failed to persist real-time update");
        }
        if let Some(path) = &self.inner.history_csv {
            if let Err(e) = append_update(path, update) {
                warn!(path, error = %e, "Failed to append history record");
            }
        }
    }
}
