use anyhow::{Result, anyhow};
use async_trait::async_trait;
use route_reoptimizer::advisor::Advisor;
use route_reoptimizer::config::EngineConfig;
use route_reoptimizer::error::{RouteError, SynthesisError};
use route_reoptimizer::fanout::{BroadcastTransport, Notification, NotificationFanout};
use route_reoptimizer::geo::{haversine_km, path_distance_km};
use route_reoptimizer::locks::RouteLocks;
use route_reoptimizer::model::{
    Coordinates, DeliveryStop, GeneratedBy, PricedRoute, RouteConstraints, RouteStats, RouteStatus,
    TrafficFlow, VehicleClass, VehicleProfile, WeatherReading,
};
use route_reoptimizer::providers::{
    MappingProvider, PlaceMatch, ProviderAdapters, WeatherProvider, WeatherQuery,
};
use route_reoptimizer::reoptimize::DecisionEngine;
use route_reoptimizer::routes::RouteService;
use route_reoptimizer::storage::{InMemoryRouteStore, RouteStore};
use route_reoptimizer::synthesis::SynthesisEngine;
use route_reoptimizer::synthesis::cost::wage;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const PLACES: [(&str, f64, f64); 5] = [
    ("alpha depot", 18.5204, 73.8567),
    ("bravo market", 18.5913, 73.7389),
    ("charlie yard", 18.4575, 73.8677),
    ("origin", 0.0, 0.0),
    ("east point", 0.0, 0.45),
];

/// Answers route prompts and re-plan prompts from fixed scripts. `None` means offline.
#[derive(Default, Clone)]
struct ScriptedAdvisor {
    route: Option<String>,
    decision: Option<String>,
    delay: Option<Duration>,
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = if prompt.contains("re-planned") {
            &self.decision
        } else {
            &self.route
        };
        answer.clone().ok_or_else(|| anyhow!("advisor offline"))
    }
}

struct StubMapping {
    traffic: TrafficFlow,
}

#[async_trait]
impl MappingProvider for StubMapping {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        if query.starts_with("nowhere") {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(PLACES
            .iter()
            .find(|(name, _, _)| query.starts_with(name))
            .map(|(_, lat, lng)| Coordinates::new(*lat, *lng)))
    }

    async fn reverse_geocode(&self, _at: Coordinates) -> Result<Option<String>> {
        Ok(None)
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<PlaceMatch>> {
        Ok(Vec::new())
    }

    async fn traffic_flow(&self, _at: Coordinates) -> Result<TrafficFlow> {
        Ok(self.traffic)
    }

    async fn route_stats(
        &self,
        _points: &[Coordinates],
        _class: VehicleClass,
    ) -> Result<Option<RouteStats>> {
        Ok(None)
    }
}

struct StubWeather {
    condition: &'static str,
}

#[async_trait]
impl WeatherProvider for StubWeather {
    async fn current(&self, _query: &WeatherQuery) -> Result<WeatherReading> {
        Ok(WeatherReading {
            condition: self.condition.to_string(),
            temperature_c: 24.0,
            wind_speed: 4.0,
            humidity: 70.0,
            pressure: 1008.0,
            visibility: 8000.0,
        })
    }
}

struct Harness {
    synthesis: Arc<SynthesisEngine>,
    service: RouteService,
    engine: DecisionEngine,
    store: Arc<InMemoryRouteStore>,
    locks: Arc<RouteLocks>,
    events: broadcast::Receiver<Notification>,
}

fn harness(advisor: ScriptedAdvisor, traffic: TrafficFlow, condition: &'static str) -> Harness {
    let config = EngineConfig::default();
    let adapters = Arc::new(ProviderAdapters::new(
        Arc::new(StubMapping { traffic }),
        Arc::new(StubWeather { condition }),
        config.providers.clone(),
    ));
    let synthesis = Arc::new(SynthesisEngine::new(Arc::new(advisor), adapters, config.clone()));
    let store = Arc::new(InMemoryRouteStore::new());
    let locks = Arc::new(RouteLocks::new());

    let transport = Arc::new(BroadcastTransport::new(16));
    let events = transport.subscribe();
    let (fanout, _worker) = NotificationFanout::spawn(transport);

    let service = RouteService::new(synthesis.clone(), store.clone(), fanout.clone(), locks.clone());
    let engine = DecisionEngine::new(
        synthesis.clone(),
        store.clone(),
        fanout,
        locks.clone(),
        config.decision,
    );

    Harness {
        synthesis,
        service,
        engine,
        store,
        locks,
        events,
    }
}

async fn next_event(events: &mut broadcast::Receiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("notification within a second")
        .expect("channel open")
}

fn two_stops() -> Vec<DeliveryStop> {
    vec![DeliveryStop::new("Alpha Depot"), DeliveryStop::new("Bravo Market")]
}

fn assert_cost_adds_up(priced: &PricedRoute) {
    let cost = &priced.cost_breakdown;
    assert_eq!(
        cost.total(),
        cost.fuel() + cost.time() + cost.maintenance() + cost.tolls()
    );
}

const KEEP_ORDER: &str = r#"{"optimizedOrder": [1, 2], "totalDistanceKm": 20, "estimatedTimeMin": 40}"#;

#[derive(Deserialize)]
struct PlanRequest {
    deliveries: Vec<DeliveryStop>,
    vehicle: VehicleProfile,
    constraints: RouteConstraints,
}

fn fixture_request() -> PlanRequest {
    serde_json::from_str(include_str!("fixtures/deliveries.json")).expect("valid fixture")
}

#[tokio::test]
async fn test_implausible_advisor_distance_is_replaced() {
    let advisor = ScriptedAdvisor {
        route: Some(
            r#"{"optimizedOrder": [2, 1], "totalDistanceKm": 5, "estimatedTimeMin": 8, "reasoning": "short hop"}"#
                .to_string(),
        ),
        ..Default::default()
    };
    let h = harness(advisor, TrafficFlow::from_speeds(40.0, 40.0), "Clear");
    let deliveries = vec![DeliveryStop::new("Origin"), DeliveryStop::new("East Point")];

    let priced = h
        .synthesis
        .synthesize(&deliveries, &VehicleProfile::default(), &RouteConstraints::default())
        .await
        .unwrap();

    let great_circle = haversine_km(Coordinates::new(0.0, 0.45), Coordinates::new(0.0, 0.0));
    assert!((great_circle - 50.0).abs() < 0.1);
    assert_eq!(priced.route[0].address, "East Point");
    assert_eq!(priced.route[1].address, "Origin");
    assert!((priced.total_distance - great_circle * 1.35).abs() < 1e-9);
    assert!((priced.total_distance - 67.5).abs() < 0.1);
    assert!(priced.total_distance >= 0.9 * great_circle);
    assert_eq!(priced.generated_by, GeneratedBy::PlausibilityOverride);
    assert!(priced.reasoning.starts_with("[plausibility-override]"));
    assert_cost_adds_up(&priced);
}

#[tokio::test]
async fn test_advisor_prose_response_is_verified() {
    let advisor = ScriptedAdvisor {
        route: Some(include_str!("fixtures/advisor_route.txt").to_string()),
        ..Default::default()
    };
    let h = harness(advisor, TrafficFlow::from_speeds(30.0, 40.0), "Clear");
    let request = fixture_request();

    let priced = h
        .synthesis
        .synthesize(&request.deliveries, &request.vehicle, &request.constraints)
        .await
        .unwrap();

    let order: Vec<_> = priced.route.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(order, ["Charlie Yard", "Alpha Depot", "Bravo Market"]);
    assert_eq!(priced.generated_by, GeneratedBy::AdvisorVerified);
    assert_eq!(priced.total_distance, 48.2);
    assert_eq!(priced.estimated_time, 95.0);
    assert_eq!(priced.route_legs.len(), 2);
    assert_eq!(priced.cost_breakdown.tolls(), 0.0);
    assert!(priced.constraints_alert.is_none());
    assert_cost_adds_up(&priced);
}

#[tokio::test]
async fn test_reordering_keeps_every_stop_intact() {
    let advisor = ScriptedAdvisor {
        route: Some(
            r#"{"optimizedOrder": [2, 3, 1], "totalDistanceKm": 40, "estimatedTimeMin": 80}"#
                .to_string(),
        ),
        ..Default::default()
    };
    let h = harness(advisor, TrafficFlow::from_speeds(30.0, 40.0), "Clear");
    let request = fixture_request();

    let priced = h
        .synthesis
        .synthesize(&request.deliveries, &request.vehicle, &request.constraints)
        .await
        .unwrap();

    assert_eq!(priced.route.len(), request.deliveries.len());
    for (stop, input) in priced.route.iter().zip([1, 2, 0]) {
        assert!(
            stop.same_delivery(&request.deliveries[input]),
            "{} lost its delivery details",
            stop.address
        );
        assert!(stop.coordinates.is_some());
    }
}

#[tokio::test]
async fn test_unreachable_advisor_falls_back_to_input_order() {
    let h = harness(ScriptedAdvisor::default(), TrafficFlow::from_speeds(40.0, 40.0), "Clear");
    let request = fixture_request();

    let priced = h
        .synthesis
        .synthesize(&request.deliveries, &request.vehicle, &request.constraints)
        .await
        .unwrap();

    let order: Vec<_> = priced.route.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(order, ["Alpha Depot", "Bravo Market", "Charlie Yard"]);

    let points: Vec<_> = priced.route.iter().filter_map(|s| s.coordinates).collect();
    let great_circle = path_distance_km(&points);
    assert!((priced.total_distance - great_circle * 1.35).abs() < 1e-9);
    assert!((priced.estimated_time - priced.total_distance / 40.0 * 60.0).abs() < 1e-9);

    let config = EngineConfig::default();
    assert_eq!(priced.cost_breakdown.time(), wage(&config.cost, priced.estimated_time));
    assert_eq!(priced.cost_breakdown.time(), 1200.0);
    assert_eq!(priced.generated_by, GeneratedBy::Fallback);
    assert!(priced.reasoning.starts_with("[fallback]"));
    assert_cost_adds_up(&priced);
}

#[tokio::test]
async fn test_empty_delivery_list_is_a_fallback_route() {
    let h = harness(
        ScriptedAdvisor {
            route: Some(KEEP_ORDER.to_string()),
            ..Default::default()
        },
        TrafficFlow::from_speeds(40.0, 40.0),
        "Clear",
    );

    let priced = h
        .synthesis
        .synthesize(&[], &VehicleProfile::default(), &RouteConstraints::default())
        .await
        .unwrap();

    assert!(priced.route.is_empty());
    assert!(priced.route_legs.is_empty());
    assert_eq!(priced.total_distance, 0.0);
    assert_eq!(priced.generated_by, GeneratedBy::Fallback);
    assert_cost_adds_up(&priced);
}

#[tokio::test(start_paused = true)]
async fn test_slow_advisor_times_out_into_fallback() {
    let advisor = ScriptedAdvisor {
        route: Some(KEEP_ORDER.to_string()),
        delay: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let h = harness(advisor, TrafficFlow::from_speeds(40.0, 40.0), "Clear");
    let deliveries = fixture_request().deliveries;

    let priced = h
        .synthesis
        .synthesize(&deliveries, &VehicleProfile::default(), &RouteConstraints::default())
        .await
        .unwrap();

    assert_eq!(priced.route.len(), deliveries.len());
    assert_eq!(priced.generated_by, GeneratedBy::Fallback);
    assert_cost_adds_up(&priced);
}

#[tokio::test]
async fn test_unresolvable_stop_persists_nothing() {
    let mut h = harness(ScriptedAdvisor::default(), TrafficFlow::from_speeds(40.0, 40.0), "Clear");
    let deliveries = vec![DeliveryStop::new("Alpha Depot"), DeliveryStop::new("Nowhere Lane")];

    let result = h
        .service
        .create_route(deliveries, VehicleProfile::default(), RouteConstraints::default(), None)
        .await;

    match result {
        Err(RouteError::Synthesis(SynthesisError::LocationUnresolvable { address })) => {
            assert_eq!(address, "Nowhere Lane")
        }
        other => panic!("expected LocationUnresolvable, got {other:?}"),
    }
    assert!(h.store.is_empty().await);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.events.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_sweep_holds_when_advisor_declines() {
    let advisor = ScriptedAdvisor {
        route: Some(KEEP_ORDER.to_string()),
        decision: Some(r#"{"shouldReoptimize": false, "reason": "jam is clearing"}"#.to_string()),
        ..Default::default()
    };
    let h = harness(advisor, TrafficFlow::from_speeds(15.0, 50.0), "Clear");
    let plan = h
        .service
        .create_route(two_stops(), VehicleProfile::default(), RouteConstraints::default(), None)
        .await
        .unwrap();

    let summary = h.engine.sweep().await;
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.held, 1);
    assert_eq!(summary.reoptimized, 0);

    let stored = h.store.find(plan.id).await.unwrap().unwrap();
    assert_eq!(stored, plan);

    let history = h.store.updates_for(plan.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].significant_delay);
    assert!(!history[0].reoptimized);
    assert_eq!(history[0].advisor_reason, "jam is clearing");
}

#[tokio::test]
async fn test_sweep_reoptimizes_in_storm() {
    let advisor = ScriptedAdvisor {
        route: Some(KEEP_ORDER.to_string()),
        decision: Some(r#"{"shouldReoptimize": true, "reason": "storm over the ring road"}"#.to_string()),
        ..Default::default()
    };
    let mut h = harness(advisor, TrafficFlow::from_speeds(40.0, 40.0), "Thunderstorm");
    let history_csv = std::env::temp_dir().join(format!("history-{}.csv", Uuid::new_v4()));
    let engine = h.engine.clone().with_history_csv(history_csv.to_string_lossy());

    let plan = h
        .service
        .create_route(
            two_stops(),
            VehicleProfile::default(),
            RouteConstraints::default(),
            Some("acme".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(next_event(&mut h.events).await.event, "route:create");

    let summary = engine.sweep().await;
    assert_eq!(summary.reoptimized, 1);

    let stored = h.store.find(plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RouteStatus::Active);
    assert_eq!(stored.route.len(), 2);
    assert!(stored.updated_at >= plan.updated_at);

    let history = h.store.updates_for(plan.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].reoptimized);
    assert!(history[0].severe_weather);
    assert!(!history[0].significant_delay);

    let event = next_event(&mut h.events).await;
    assert_eq!(event.event, "route:reoptimize");
    assert!(event.rooms.contains(&"role:dispatcher".to_string()));
    assert!(event.rooms.contains(&"company:acme".to_string()));
    assert_eq!(event.payload["type"], "reoptimize");

    let csv = std::fs::read_to_string(&history_csv).unwrap();
    assert_eq!(csv.lines().count(), 2);
    std::fs::remove_file(&history_csv).unwrap();
}

#[tokio::test]
async fn test_sweep_isolates_failing_candidate() {
    let h = harness(
        ScriptedAdvisor {
            route: Some(KEEP_ORDER.to_string()),
            ..Default::default()
        },
        TrafficFlow::from_speeds(40.0, 40.0),
        "Clear",
    );
    let plan = h
        .service
        .create_route(two_stops(), VehicleProfile::default(), RouteConstraints::default(), None)
        .await
        .unwrap();

    let mut broken = plan.clone();
    broken.id = Uuid::new_v4();
    broken.route.clear();
    h.store.insert(&broken).await.unwrap();

    let summary = h.engine.sweep().await;
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.held, 1);
    assert_eq!(h.store.updates_for(plan.id).await.unwrap().len(), 1);
    assert!(h.store.updates_for(broken.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_skips_route_under_edit() {
    let h = harness(
        ScriptedAdvisor {
            route: Some(KEEP_ORDER.to_string()),
            ..Default::default()
        },
        TrafficFlow::from_speeds(40.0, 40.0),
        "Clear",
    );
    let plan = h
        .service
        .create_route(two_stops(), VehicleProfile::default(), RouteConstraints::default(), None)
        .await
        .unwrap();

    let guard = h.locks.acquire(plan.id).await;
    let summary = h.engine.sweep().await;
    assert_eq!(summary.busy, 1);
    assert!(h.store.updates_for(plan.id).await.unwrap().is_empty());

    drop(guard);
    assert_eq!(h.engine.sweep().await.held, 1);
}

#[tokio::test]
async fn test_route_lifecycle() {
    let mut h = harness(
        ScriptedAdvisor {
            route: Some(KEEP_ORDER.to_string()),
            ..Default::default()
        },
        TrafficFlow::from_speeds(40.0, 40.0),
        "Clear",
    );
    let plan = h
        .service
        .create_route(two_stops(), VehicleProfile::default(), RouteConstraints::default(), None)
        .await
        .unwrap();
    assert_eq!(plan.status, RouteStatus::Draft);
    assert_eq!(next_event(&mut h.events).await.event, "route:create");

    let err = h
        .service
        .update_status(plan.id, RouteStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::InvalidTransition { .. }));

    h.service.assign_driver(plan.id, "driver-7").await.unwrap();
    let event = next_event(&mut h.events).await;
    assert_eq!(event.event, "route:assignment");
    assert!(event.rooms.contains(&"user:driver-7".to_string()));

    h.service.update_status(plan.id, RouteStatus::Active).await.unwrap();
    assert_eq!(next_event(&mut h.events).await.event, "route:update");

    let moving = h.service.record_departure(plan.id, 1).await.unwrap();
    assert_eq!(moving.status, RouteStatus::InProgress);
    assert_eq!(moving.active_leg, 1);
    assert!(!moving.is_stationary);
    assert!(moving.last_departed_at.is_some());
    assert_eq!(next_event(&mut h.events).await.event, "route:update");

    let parked = h.service.mark_stationary(plan.id).await.unwrap();
    assert!(parked.is_stationary);

    h.service.update_status(plan.id, RouteStatus::Completed).await.unwrap();
    assert_eq!(next_event(&mut h.events).await.event, "route:completion");

    assert_eq!(h.engine.sweep().await.candidates, 0);

    let missing = Uuid::new_v4();
    assert!(matches!(
        h.service.archive(missing).await,
        Err(RouteError::NotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn test_edit_route_resynthesizes() {
    let mut h = harness(
        ScriptedAdvisor {
            route: Some(KEEP_ORDER.to_string()),
            ..Default::default()
        },
        TrafficFlow::from_speeds(40.0, 40.0),
        "Clear",
    );
    let plan = h
        .service
        .create_route(two_stops(), VehicleProfile::default(), RouteConstraints::default(), None)
        .await
        .unwrap();
    next_event(&mut h.events).await;

    let mut deliveries = two_stops();
    deliveries.push(DeliveryStop::new("Charlie Yard"));
    let edited = h
        .service
        .edit_route(plan.id, deliveries, VehicleProfile::of_kind("truck"), RouteConstraints::default())
        .await
        .unwrap();

    assert_eq!(edited.id, plan.id);
    assert_eq!(edited.route.len(), 3);
    assert_eq!(edited.vehicle.kind, "truck");
    assert_eq!(next_event(&mut h.events).await.event, "route:update");

    h.service.archive(plan.id).await.unwrap();
    assert_eq!(h.engine.sweep().await.candidates, 0);
}
