//! buswatch - transit stop alert daemon.
//!
//! This is the entry point of the daemon. It wires the stop catalogue, the
//! alert store, the live departures client, the geofence gateway and the
//! notification dispatcher together, resumes monitoring for alerts that
//! survived a restart, and then runs until terminated.
//!
//! # Configuration
//!
//! Create a `config.yaml` file with your settings:
//!
//! ```yaml
//! live_times:
//!   url: "https://bustimes.example.com"
//!   api_key: "secret"
//!   poll_interval: 60
//!
//! notifications:
//!   webhook_url: "https://ntfy.example.com/buswatch"
//!
//! stops:
//!   catalogue: "stops.json"
//! ```
//!
//! Values can be overridden with `BUSWATCH_` prefixed environment
//! variables, e.g. `BUSWATCH_LIVE_TIMES__API_KEY`.
//!
//! # Usage
//!
//! ```bash
//! buswatch --config config.yaml --data ./buswatch-data
//! ```
//!
//! # Runtime Behavior
//!
//! While arrival alerts exist, the daemon polls the live departures API
//! every `poll_interval` seconds. While proximity alerts exist, it keeps a
//! geofence armed per alert and reacts to entered events. Alerts are
//! persisted to the data directory every minute so they survive restarts.
//! Both monitors pause themselves while they have nothing to do.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;

use buswatch::alerts::{
    AlertLoader, AlertsCoordinator, AreaEnteredHandler, ArrivalAlertMonitor, MemoryAlertStore,
    ProximityAlertReconciler,
};
use buswatch::config::Config;
use buswatch::geofence::SoftwareGeofenceGateway;
use buswatch::livetimes::BusTimesClient;
use buswatch::notify::WebhookDispatcher;
use buswatch::stops::StopCatalogue;

/// Capacity of the channel carrying geofence entered events.
const ENTERED_EVENTS_CAPACITY: usize = 16;

/// Command-line arguments for the buswatch daemon.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    ///
    /// See the `config` module for the expected format. Values can be
    /// overridden with `BUSWATCH_` prefixed environment variables.
    #[arg(short, long)]
    config: String,

    /// Path to the directory for storing persistent data.
    ///
    /// This directory will contain `alerts.json`, the snapshot of active
    /// alerts written every minute.
    #[arg(short, long)]
    data: String,
}

/// Main entry point for the buswatch daemon.
///
/// Initializes logging, loads the configuration and the stop catalogue,
/// wires the alert subsystem together, resumes monitoring of persisted
/// alerts and waits for a termination signal.
///
/// # Error Handling
///
/// Configuration and catalogue errors are logged and end the process;
/// everything after startup is handled inside the monitors and never
/// terminates the daemon.
#[tokio::main]
async fn main() {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("starting buswatch {}...", env!("CARGO_PKG_VERSION"));

    // Parse command line arguments
    let args = Args::parse();

    // Load configuration from YAML file with environment variable overrides
    let mut config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load config file: {:#}", e);
            return;
        }
    };

    // Normalize the live times URL by removing a trailing slash if present
    if config.live_times.url.ends_with('/') {
        config.live_times.url.pop();
    }

    // The stop catalogue is required: without locations no proximity alert
    // can ever be armed
    let catalogue = match StopCatalogue::load(&config.stops.catalogue).await {
        Ok(catalogue) => Arc::new(catalogue),
        Err(e) => {
            error!("failed to load stop catalogue: {:#}", e);
            return;
        }
    };

    // Restore persisted alerts and keep persisting them periodically
    let alerts_path = Path::new(&args.data).join("alerts.json");
    let loader = AlertLoader::new(alerts_path.to_string_lossy().into_owned());
    let store = Arc::new(MemoryAlertStore::with_loader(loader).await);
    store.start_persistence_task();

    let live_times = Arc::new(BusTimesClient::new(
        &config.live_times.url,
        &config.live_times.api_key,
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(&config.notifications.webhook_url));

    let (entered_tx, mut entered_rx) = mpsc::channel(ENTERED_EVENTS_CAPACITY);
    let gateway = Arc::new(SoftwareGeofenceGateway::new(entered_tx));

    let arrival_monitor = Arc::new(ArrivalAlertMonitor::new(
        Arc::clone(&store),
        live_times,
        Arc::clone(&dispatcher),
        Duration::from_secs(config.live_times.poll_interval),
    ));
    let proximity_reconciler = Arc::new(ProximityAlertReconciler::new(
        Arc::clone(&store),
        catalogue,
        Arc::clone(&gateway),
    ));

    // Forward entered events from the gateway into the alert layer
    let entered_handler =
        AreaEnteredHandler::new(Arc::clone(&store), Arc::clone(&dispatcher), gateway);
    tokio::spawn(async move {
        while let Some(id) = entered_rx.recv().await {
            entered_handler.handle_area_entered(id).await;
        }
    });

    let coordinator =
        AlertsCoordinator::new(store, dispatcher, arrival_monitor, proximity_reconciler);

    // Create the alerts declared in the configuration file
    for entry in &config.alerts.arrival {
        coordinator
            .add_arrival_alert(&entry.stop, entry.services.clone(), entry.minutes)
            .await;
    }
    for entry in &config.alerts.proximity {
        coordinator
            .add_proximity_alert(&entry.stop, entry.radius_meters)
            .await;
    }

    // Resume monitoring for alerts restored from disk
    coordinator.ensure_monitoring_if_alerts_exist().await;

    info!("buswatch is running, press ctrl-c to stop");
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for the shutdown signal: {}", e);
    }
    info!("shutting down");
}
