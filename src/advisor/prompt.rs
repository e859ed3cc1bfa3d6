//! Prompt builders. Both prompts ask for a bare JSON object so the response
//! parser has a single shape to validate.

use std::fmt::Write;

use crate::model::{
    DeliveryStop, RouteConstraints, RoutePlan, TrafficFlow, VehicleClass, VehicleProfile,
    WeatherReading,
};

fn vehicle_framing(vehicle: &VehicleProfile) -> &'static str {
    match vehicle.vehicle_class() {
        VehicleClass::Truck => {
            "The vehicle is a heavy goods vehicle: prefer highways and ring roads, avoid narrow inner-city streets and respect truck entry restrictions."
        }
        VehicleClass::Car => {
            "The vehicle is a light commercial vehicle: inner-city shortcuts are acceptable."
        }
    }
}

pub fn synthesis_prompt(
    deliveries: &[DeliveryStop],
    vehicle: &VehicleProfile,
    constraints: &RouteConstraints,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are a logistics route planner. Order the following {} delivery stops into an efficient route.",
        deliveries.len()
    );
    let _ = writeln!(
        prompt,
        "Vehicle: type={}, capacity={}, fuel efficiency={}.",
        vehicle.kind, vehicle.capacity, vehicle.fuel_efficiency
    );
    let _ = writeln!(prompt, "{}", vehicle_framing(vehicle));
    if constraints.avoid_tolls {
        let _ = writeln!(prompt, "Avoid toll roads where possible.");
    }
    if let Some(departure) = &constraints.departure {
        let _ = writeln!(prompt, "Departure: {departure}.");
    }
    if let Some(notes) = &constraints.notes {
        let _ = writeln!(prompt, "Dispatcher notes: {notes}");
    }

    let _ = writeln!(prompt, "\nStops:");
    for (i, stop) in deliveries.iter().enumerate() {
        let _ = write!(
            prompt,
            "{}. {} | priority={:?} | window={} | weight={}",
            i + 1,
            stop.address,
            stop.priority,
            stop.time_window,
            stop.package.weight
        );
        if let Some(c) = stop.coordinates {
            let _ = write!(prompt, " | at {:.5},{:.5}", c.lat, c.lng);
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "\nRespond with only a JSON object of this shape:\n\
         {\"optimizedOrder\": [1-based stop numbers], \"totalDistanceKm\": number, \
         \"estimatedTimeMin\": number, \"reasoning\": string, \"constraintsAlert\": string or null}\n\
         Every stop number must appear exactly once.",
    );
    prompt
}

pub fn reoptimization_prompt(
    plan: &RoutePlan,
    traffic: &TrafficFlow,
    weather: &WeatherReading,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "A delivery route with {} stops is currently {}. Its planned distance is {:.1} km and planned time {:.0} min.",
        plan.route.len(),
        plan.status,
        plan.total_distance,
        plan.estimated_time
    );
    if let Some(next) = plan.next_stop() {
        let _ = writeln!(prompt, "Next stop: {}.", next.address);
    }
    let _ = writeln!(
        prompt,
        "Live traffic near the next stop: current speed {:.0} km/h, free-flow speed {:.0} km/h, congestion {:?}.",
        traffic.current_speed_kmh, traffic.free_flow_speed_kmh, traffic.congestion
    );
    let _ = writeln!(
        prompt,
        "Weather: {}, {:.0}°C, wind {:.1} m/s, visibility {:.0} m.",
        weather.condition, weather.temperature_c, weather.wind_speed, weather.visibility
    );
    prompt.push_str(
        "Should the remaining route be re-planned? Respond with only a JSON object: \
         {\"shouldReoptimize\": boolean, \"reason\": string}. \
         Use the word \"critical\" or \"major\" in the reason only for conditions that seriously affect delivery.",
    );
    prompt
}
