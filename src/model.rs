//! Domain types shared by synthesis, re-optimization and fanout.
//!
//! Field names serialize in camelCase so plans round-trip with the JSON the
//! dispatch front-end already consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAttributes {
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

fn default_time_window() -> String {
    "anytime".to_string()
}

/// One stop in a delivery list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStop {
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_time_window")]
    pub time_window: String,
    #[serde(default)]
    pub package: PackageAttributes,
}

impl DeliveryStop {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            coordinates: None,
            priority: Priority::default(),
            time_window: default_time_window(),
            package: PackageAttributes::default(),
        }
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.coordinates = Some(Coordinates::new(lat, lng));
        self
    }

    /// True when both stops describe the same delivery, ignoring resolved coordinates.
    pub fn same_delivery(&self, other: &DeliveryStop) -> bool {
        self.address == other.address
            && self.priority == other.priority
            && self.time_window == other.time_window
            && self.package == other.package
    }
}

fn default_vehicle_type() -> String {
    "van".to_string()
}

fn default_capacity() -> f64 {
    1000.0
}

fn default_fuel_efficiency() -> f64 {
    25.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleProfile {
    #[serde(default = "default_vehicle_type", rename = "type")]
    pub kind: String,
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    #[serde(default = "default_fuel_efficiency")]
    pub fuel_efficiency: f64,
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self {
            kind: default_vehicle_type(),
            capacity: default_capacity(),
            fuel_efficiency: default_fuel_efficiency(),
        }
    }
}

impl VehicleProfile {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Road-routing profile implied by the free-text vehicle type.
    pub fn vehicle_class(&self) -> VehicleClass {
        let kind = self.kind.to_lowercase();
        let heavy = ["truck", "lorry", "trailer", "tanker", "hgv", "tempo"];
        if heavy.iter().any(|h| kind.contains(h)) {
            VehicleClass::Truck
        } else {
            VehicleClass::Car
        }
    }
}

/// Road-routing vehicle profile understood by the mapping provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Truck,
    Car,
}

impl VehicleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Truck => "truck",
            VehicleClass::Car => "car",
        }
    }
}

/// Caller-supplied planning hints passed through to the advisor prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConstraints {
    #[serde(default)]
    pub avoid_tolls: bool,
    #[serde(default)]
    pub departure: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStatus {
    Draft,
    Active,
    InProgress,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Cancelled)
    }

    /// Forward-only lifecycle; cancellation is allowed from any non-terminal state.
    pub fn can_transition_to(&self, next: RouteStatus) -> bool {
        use RouteStatus::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (Draft, Active) => true,
            (Active, InProgress) | (Active, Completed) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteStatus::Draft => "draft",
            RouteStatus::Active => "active",
            RouteStatus::InProgress => "in-progress",
            RouteStatus::Completed => "completed",
            RouteStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which synthesis path produced the numbers on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratedBy {
    AdvisorVerified,
    PlausibilityOverride,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    pub time_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CostParts")]
pub struct CostBreakdown {
    fuel: f64,
    time: f64,
    maintenance: f64,
    tolls: f64,
    total: f64,
}

#[derive(Deserialize)]
struct CostParts {
    #[serde(default)]
    fuel: f64,
    #[serde(default)]
    time: f64,
    #[serde(default)]
    maintenance: f64,
    #[serde(default)]
    tolls: f64,
}

impl From<CostParts> for CostBreakdown {
    fn from(p: CostParts) -> Self {
        CostBreakdown::new(p.fuel, p.time, p.maintenance, p.tolls)
    }
}

impl CostBreakdown {
    /// Components are rounded to whole currency units and the total is their sum.
    pub fn new(fuel: f64, time: f64, maintenance: f64, tolls: f64) -> Self {
        let fuel = fuel.round();
        let time = time.round();
        let maintenance = maintenance.round();
        let tolls = tolls.round();
        Self {
            fuel,
            time,
            maintenance,
            tolls,
            total: fuel + time + maintenance + tolls,
        }
    }

    pub fn fuel(&self) -> f64 {
        self.fuel
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn maintenance(&self) -> f64 {
        self.maintenance
    }

    pub fn tolls(&self) -> f64 {
        self.tolls
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

impl Default for CostBreakdown {
    fn default() -> Self {
        CostBreakdown::new(0.0, 0.0, 0.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Congestion {
    Low,
    Moderate,
    High,
}

impl Congestion {
    pub fn from_speed_ratio(ratio: f64) -> Self {
        if ratio >= 0.8 {
            Congestion::Low
        } else if ratio >= 0.5 {
            Congestion::Moderate
        } else {
            Congestion::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficAnalysis {
    pub delay_min: f64,
    pub average_speed_kmh: f64,
    pub congestion: Congestion,
}

/// Live traffic at a single point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficFlow {
    pub current_speed_kmh: f64,
    pub free_flow_speed_kmh: f64,
    pub congestion: Congestion,
}

impl TrafficFlow {
    pub fn from_speeds(current_speed_kmh: f64, free_flow_speed_kmh: f64) -> Self {
        let mut flow = Self {
            current_speed_kmh,
            free_flow_speed_kmh,
            congestion: Congestion::Moderate,
        };
        flow.congestion = Congestion::from_speed_ratio(flow.speed_ratio());
        flow
    }

    /// `current / free_flow`, or 1.0 when the free-flow speed is unknown.
    pub fn speed_ratio(&self) -> f64 {
        if self.free_flow_speed_kmh <= 0.0 {
            1.0
        } else {
            self.current_speed_kmh / self.free_flow_speed_kmh
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReading {
    pub condition: String,
    pub temperature_c: f64,
    pub wind_speed: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub visibility: f64,
}

/// Road-routing statistics for an ordered list of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    pub distance_km: f64,
    pub time_min: f64,
    pub has_tolls: bool,
}

/// Output of one synthesis run, before it is attached to a [`RoutePlan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedRoute {
    pub route: Vec<DeliveryStop>,
    pub route_legs: Vec<RouteLeg>,
    pub total_distance: f64,
    pub estimated_time: f64,
    pub fuel_required_litres: f64,
    pub diesel_price_used: f64,
    pub cost_breakdown: CostBreakdown,
    pub traffic_analysis: TrafficAnalysis,
    pub reasoning: String,
    pub constraints_alert: Option<String>,
    pub generated_by: GeneratedBy,
}

/// The aggregate root persisted by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub id: Uuid,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    pub deliveries: Vec<DeliveryStop>,
    #[serde(default)]
    pub vehicle: VehicleProfile,
    #[serde(default)]
    pub constraints: RouteConstraints,
    pub route: Vec<DeliveryStop>,
    pub route_legs: Vec<RouteLeg>,
    pub total_distance: f64,
    pub estimated_time: f64,
    pub fuel_required_litres: f64,
    pub diesel_price_used: f64,
    pub cost_breakdown: CostBreakdown,
    pub traffic_analysis: TrafficAnalysis,
    pub reasoning: String,
    #[serde(default)]
    pub constraints_alert: Option<String>,
    pub status: RouteStatus,
    #[serde(default)]
    pub active_leg: usize,
    #[serde(default = "default_stationary")]
    pub is_stationary: bool,
    #[serde(default)]
    pub last_departed_at: Option<DateTime<Utc>>,
    pub generated_by: GeneratedBy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

fn default_stationary() -> bool {
    true
}

impl RoutePlan {
    /// Builds a new draft plan from a synthesis result.
    pub fn draft(
        deliveries: Vec<DeliveryStop>,
        vehicle: VehicleProfile,
        constraints: RouteConstraints,
        priced: PricedRoute,
    ) -> Self {
        let now = Utc::now();
        let mut plan = Self {
            id: Uuid::new_v4(),
            company_id: None,
            driver_id: None,
            deliveries,
            vehicle,
            constraints,
            route: Vec::new(),
            route_legs: Vec::new(),
            total_distance: 0.0,
            estimated_time: 0.0,
            fuel_required_litres: 0.0,
            diesel_price_used: 0.0,
            cost_breakdown: CostBreakdown::default(),
            traffic_analysis: priced.traffic_analysis,
            reasoning: String::new(),
            constraints_alert: None,
            status: RouteStatus::Draft,
            active_leg: 0,
            is_stationary: true,
            last_departed_at: None,
            generated_by: priced.generated_by,
            created_at: now,
            updated_at: now,
            archived: false,
        };
        plan.apply(priced);
        plan
    }

    /// Overwrites path, totals, cost and reasoning with a fresh synthesis result.
    pub fn apply(&mut self, priced: PricedRoute) {
        self.route = priced.route;
        self.route_legs = priced.route_legs;
        self.total_distance = priced.total_distance;
        self.estimated_time = priced.estimated_time;
        self.fuel_required_litres = priced.fuel_required_litres;
        self.diesel_price_used = priced.diesel_price_used;
        self.cost_breakdown = priced.cost_breakdown;
        self.traffic_analysis = priced.traffic_analysis;
        self.reasoning = priced.reasoning;
        self.constraints_alert = priced.constraints_alert;
        self.generated_by = priced.generated_by;
        self.active_leg = self.active_leg.min(self.route.len().saturating_sub(1));
        self.updated_at = Utc::now();
    }

    /// The stop the vehicle is heading to, falling back to the first stop.
    pub fn next_stop(&self) -> Option<&DeliveryStop> {
        self.route.get(self.active_leg).or_else(|| self.route.first())
    }
}

/// History record written for every candidate the decision engine evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeUpdate {
    pub route_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub traffic: TrafficFlow,
    pub weather: WeatherReading,
    pub significant_delay: bool,
    pub severe_weather: bool,
    pub advisor_reason: String,
    pub reoptimized: bool,
}
