mod condition;
mod config;
mod consumer;
mod entry;
mod event;
mod feed;
mod mail;
mod manager;
mod router;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::{load_config, Config};
use crate::consumer::{AnyConsumer, MailConsumer, PersistenceConsumer};
use crate::entry::EntryData;
use crate::feed::SimulatedFeed;
use crate::mail::MailClient;
use crate::manager::Manager;
use crate::store::{GroupData, Store, StoreError};

fn init_json_logging() {
    if let Err(error) = tracing_log::LogTracer::init() {
        eprintln!(
            "logging bridge initialization failed (continuing with existing logger): {}",
            error
        );
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .finish();

    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("global logger initialization failed: {}", error);
    }
}

const CONFIG_PATH: &str = "config.toml";

/// Provision a small demo configuration so a fresh store has something to
/// monitor in simulation mode. The wave generator crosses both conditions
/// on its excursion rounds.
fn seed_demo_entries(store: &Store, recipient: &str) -> Result<(), StoreError> {
    store.insert_group(&GroupData {
        id: "demo".to_string(),
        name: "demo".to_string(),
        enabled: true,
        description: "seeded simulation group".to_string(),
    })?;
    store.insert_entry(&EntryData {
        id: "demo-1".to_string(),
        point: "SIM:Wave1".to_string(),
        recipients: vec![recipient.to_string()],
        condition: "superior than".to_string(),
        alarm_values: "75".to_string(),
        unit: "u".to_string(),
        warning: "simulated value exceeded its limit".to_string(),
        subject: "telemail demo alarm".to_string(),
        cooldown_secs: 60.0,
        group: "demo".to_string(),
    })?;
    store.insert_entry(&EntryData {
        id: "demo-2".to_string(),
        point: "SIM:Wave2".to_string(),
        recipients: vec![recipient.to_string()],
        condition: "out of range".to_string(),
        alarm_values: "10:90".to_string(),
        unit: "u".to_string(),
        warning: "simulated value left its range".to_string(),
        subject: "telemail demo alarm".to_string(),
        cooldown_secs: 60.0,
        group: "demo".to_string(),
    })?;
    Ok(())
}

#[cfg(unix)]
fn spawn_manual_trigger_listener(manager: &Manager) {
    use tokio::signal::unix::{signal, SignalKind};

    let router = manager.router().clone();
    let running = manager.running_flag();
    tokio::spawn(async move {
        let mut stream = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(error) => {
                log::error!("manual_trigger_listener_failed error={}", error);
                return;
            }
        };
        while stream.recv().await.is_some() {
            if !running.load(std::sync::atomic::Ordering::Relaxed) {
                break;
            }
            let triggered = router.trigger_all();
            log::info!("manual_trigger signal=SIGUSR1 points={}", triggered);
        }
    });
}

#[tokio::main]
async fn main() {
    init_json_logging();

    let config: Config = match load_config(CONFIG_PATH) {
        Ok(config) => config,
        Err(error) => {
            log::error!("Configuration error: {}", error);
            return;
        }
    };

    log::info!("telemail alarm server is starting...");

    let store = match Store::open(&config.store.path) {
        Ok(store) => Arc::new(store),
        Err(error) => {
            log::error!(
                "CRITICAL: failed to open store at {}: {}",
                config.store.path,
                error
            );
            return;
        }
    };
    log::info!(
        "store_opened path={} archived_events={}",
        config.store.path,
        store.archived_events().len()
    );

    let mail_client = match MailClient::new(&config.smtp, &config.mail) {
        Ok(client) => client,
        Err(error) => {
            log::error!("CRITICAL: invalid smtp configuration: {}", error);
            return;
        }
    };

    // The only feed backend shipped today; config validation rejects any
    // other mode. A live protocol backend plugs in behind TelemetryFeed.
    let feed = Arc::new(SimulatedFeed::new());
    log::warn!(
        "simulation_mode_enabled source=telemetry_feed sample_interval_secs={}",
        config.feed.sample_interval_secs
    );

    let consumers = vec![
        AnyConsumer::Mail(MailConsumer::new(mail_client)),
        AnyConsumer::Persistence(PersistenceConsumer::new(store.clone())),
    ];
    let mut manager = Manager::new(&config, store.clone(), feed.clone(), consumers);

    let mut loaded = match manager.load_entries() {
        Ok(loaded) => loaded,
        Err(error) => {
            log::error!("CRITICAL: failed to load entries from store: {}", error);
            return;
        }
    };

    if loaded == 0 {
        log::warn!(
            "store_empty path={} seeding demo entries for simulation",
            config.store.path
        );
        match seed_demo_entries(&store, config.smtp.sender()) {
            Ok(()) => match manager.load_entries() {
                Ok(reloaded) => loaded = reloaded,
                Err(error) => {
                    log::error!("CRITICAL: failed to load seeded entries: {}", error);
                    return;
                }
            },
            Err(error) => log::error!("demo_seed_failed error={}", error),
        }
    }

    log::info!(
        "entries_loaded count={} points={}",
        loaded,
        manager.router().point_count()
    );

    manager.start();
    #[cfg(unix)]
    spawn_manual_trigger_listener(&manager);

    let generator = feed.spawn_generator(
        Duration::from_secs(config.feed.sample_interval_secs),
        manager.running_flag(),
        manager.shutdown_notify(),
    );

    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("signal_wait_failed error={}", error);
    }
    log::info!("shutdown_requested signal=SIGINT");

    manager.shutdown().await;
    if let Err(error) = generator.await {
        log::error!("generator_join_failed error={}", error);
    }
    log::info!("telemail alarm server stopped");
}
