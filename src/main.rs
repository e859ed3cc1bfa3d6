//! CLI entry point for the route re-optimizer.
//!
//! Provides subcommands for planning a route from a delivery list, running
//! provider lookups, and monitoring stored routes for re-optimization.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use route_reoptimizer::advisor::gemini::{DEFAULT_MODEL, GeminiClient};
use route_reoptimizer::config::EngineConfig;
use route_reoptimizer::fanout::{
    LogTransport, NotificationFanout, RealtimeTransport, WebhookTransport,
};
use route_reoptimizer::fetch::BasicClient;
use route_reoptimizer::locks::RouteLocks;
use route_reoptimizer::model::{Coordinates, DeliveryStop, RouteConstraints, RoutePlan, VehicleProfile};
use route_reoptimizer::output::write_json;
use route_reoptimizer::providers::openweather::OpenWeatherClient;
use route_reoptimizer::providers::tomtom::TomTomClient;
use route_reoptimizer::providers::ProviderAdapters;
use route_reoptimizer::reoptimize::DecisionEngine;
use route_reoptimizer::storage::{InMemoryRouteStore, RouteStore};
use route_reoptimizer::synthesis::SynthesisEngine;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "route_reoptimizer")]
#[command(about = "Plan delivery routes and keep them optimal under live conditions", long_about = None)]
struct Cli {
    /// JSON file with engine tunables
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a priced route from a delivery list
    Plan {
        /// JSON file with deliveries, vehicle and constraints
        #[arg(short, long)]
        input: String,

        /// Override the vehicle type from the input file
        #[arg(long)]
        vehicle_type: Option<String>,

        /// Write the route here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Resolve an address to coordinates
    Geocode { address: String },
    /// Resolve coordinates to an address
    Reverse {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lng: f64,
    },
    /// Free-text place search
    Search {
        query: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Watch stored routes and re-optimize when conditions change
    Monitor {
        /// JSON file with an array of route plans
        #[arg(short, long)]
        routes: String,

        /// Seconds between sweeps
        #[arg(long)]
        interval: Option<u64>,

        /// Maximum routes checked at once
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Number of sweeps to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        sweeps: usize,

        /// CSV file to append real-time updates to
        #[arg(long)]
        history_csv: Option<String>,

        /// HTTP relay that forwards notifications to connected clients
        #[arg(long)]
        relay_url: Option<String>,
    },
}

#[derive(Deserialize)]
struct PlanRequest {
    deliveries: Vec<DeliveryStop>,
    #[serde(default)]
    vehicle: VehicleProfile,
    #[serde(default)]
    constraints: RouteConstraints,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/route_reoptimizer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("route_reoptimizer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Plan {
            input,
            vehicle_type,
            output,
        } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {input}"))?;
            let mut request: PlanRequest =
                serde_json::from_str(&raw).with_context(|| format!("failed to parse {input}"))?;
            if let Some(kind) = vehicle_type {
                request.vehicle.kind = kind;
            }

            let engine = synthesis_engine(&config)?;
            let priced = engine
                .synthesize(&request.deliveries, &request.vehicle, &request.constraints)
                .await?;
            write_json(&priced, output.as_deref())?;
        }
        Commands::Geocode { address } => {
            let lookup = adapters(&config)?.geocode(&address).await;
            info!(from_cache = lookup.from_cache, "Geocode finished");
            write_json(&lookup.value, None)?;
        }
        Commands::Reverse { lat, lng } => {
            let lookup = adapters(&config)?
                .reverse_geocode(Coordinates::new(lat, lng))
                .await;
            write_json(&lookup.value, None)?;
        }
        Commands::Search { query, limit } => {
            let lookup = adapters(&config)?.search(&query, limit).await;
            write_json(&lookup.value, None)?;
        }
        Commands::Monitor {
            routes,
            interval,
            concurrency,
            sweeps,
            history_csv,
            relay_url,
        } => {
            let mut config = config;
            if let Some(secs) = interval {
                config.decision.interval_secs = secs;
            }
            if let Some(n) = concurrency {
                config.decision.concurrency = n;
            }
            monitor(config, &routes, sweeps, history_csv, relay_url).await?;
        }
    }

    Ok(())
}

fn env_key(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn adapters(config: &EngineConfig) -> Result<Arc<ProviderAdapters>> {
    let timeout = config.providers.timeout();
    let mapping = TomTomClient::new(&env_key("TOMTOM_API_KEY")?, timeout)?;
    let weather = OpenWeatherClient::new(&env_key("OPENWEATHER_API_KEY")?, timeout)?;
    Ok(Arc::new(ProviderAdapters::new(
        Arc::new(mapping),
        Arc::new(weather),
        config.providers.clone(),
    )))
}

fn synthesis_engine(config: &EngineConfig) -> Result<Arc<SynthesisEngine>> {
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let advisor = GeminiClient::new(&env_key("GEMINI_API_KEY")?, &model)?;
    Ok(Arc::new(SynthesisEngine::new(
        Arc::new(advisor),
        adapters(config)?,
        config.clone(),
    )))
}

/// Loads routes into the in-memory store and runs the decision loop.
#[tracing::instrument(skip(config, history_csv, relay_url))]
async fn monitor(
    config: EngineConfig,
    routes_file: &str,
    sweeps: usize,
    history_csv: Option<String>,
    relay_url: Option<String>,
) -> Result<()> {
    let raw = std::fs::read_to_string(routes_file)
        .with_context(|| format!("failed to read {routes_file}"))?;
    let plans: Vec<RoutePlan> =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {routes_file}"))?;

    let store = Arc::new(InMemoryRouteStore::new());
    for plan in &plans {
        if let Err(e) = store.insert(plan).await {
            warn!(route_id = %plan.id, error = %e, "Skipping route");
        }
    }
    info!(routes = store.len().await, "Routes loaded");

    let transport: Arc<dyn RealtimeTransport> = match relay_url {
        Some(url) => {
            info!(relay = %url, "Forwarding notifications to relay");
            let client = BasicClient::new(config.providers.timeout())?;
            Arc::new(WebhookTransport::new(client, url))
        }
        None => Arc::new(LogTransport),
    };
    let (fanout, worker) = NotificationFanout::spawn(transport);

    let mut engine = DecisionEngine::new(
        synthesis_engine(&config)?,
        store,
        fanout,
        Arc::new(RouteLocks::new()),
        config.decision.clone(),
    );
    if let Some(path) = history_csv {
        engine = engine.with_history_csv(path);
    }

    if sweeps == 0 {
        info!("Monitoring indefinitely. Press Ctrl+C to stop.");
    }
    engine.run(sweeps).await;

    // closes the queue so the worker drains and exits
    drop(engine);
    if let Err(e) = worker.await {
        warn!(error = %e, "Fanout worker ended abnormally");
    }
    Ok(())
}
