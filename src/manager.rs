use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::Config;
use crate::consumer::{AnyConsumer, ConsumerHandle};
use crate::entry::{Entry, Group};
use crate::event::AlarmEvent;
use crate::feed::TelemetryFeed;
use crate::router::SubscriptionRouter;
use crate::store::{Store, StoreError};

/// Orchestrates the pipeline: loads entries from the store, wires them into
/// the router, and runs the two long-lived loops (periodic tick, event
/// dispatch) plus one worker per consumer.
pub struct Manager {
    store: Arc<Store>,
    router: Arc<SubscriptionRouter>,
    event_tx: mpsc::Sender<AlarmEvent>,
    event_rx: Option<mpsc::Receiver<AlarmEvent>>,
    pending_consumers: Vec<AnyConsumer>,
    tick_interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    loops: Vec<JoinHandle<()>>,
}

impl Manager {
    pub fn new(
        config: &Config,
        store: Arc<Store>,
        feed: Arc<dyn TelemetryFeed>,
        consumers: Vec<AnyConsumer>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);
        Self {
            store,
            router: Arc::new(SubscriptionRouter::new(feed)),
            event_tx,
            event_rx: Some(event_rx),
            pending_consumers: consumers,
            tick_interval: Duration::from_secs(config.tick_interval_secs),
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
            loops: Vec::new(),
        }
    }

    pub fn router(&self) -> &Arc<SubscriptionRouter> {
        &self.router
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn shutdown_notify(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Load every configured entry from the store and register it with the
    /// router. Entries with a broken condition configuration or a missing
    /// group are skipped and logged; the rest of the system proceeds.
    pub fn load_entries(&self) -> Result<usize, StoreError> {
        let mut groups: HashMap<String, Arc<Group>> = HashMap::new();
        let mut loaded = 0;

        for data in self.store.get_entries()? {
            let group = match groups.get(&data.group) {
                Some(group) => group.clone(),
                None => match self.store.get_group(&data.group) {
                    Ok(group_data) => {
                        log::info!(
                            "group_loaded id={} name={} enabled={} description={}",
                            group_data.id,
                            group_data.name,
                            group_data.enabled,
                            group_data.description
                        );
                        let group =
                            Arc::new(Group::new(group_data.name, group_data.enabled));
                        groups.insert(data.group.clone(), group.clone());
                        group
                    }
                    Err(error) => {
                        log::error!(
                            "entry_load_failed id={} point={} error={}",
                            data.id,
                            data.point,
                            error
                        );
                        continue;
                    }
                },
            };

            let entry_id = data.id.clone();
            let point = data.point.clone();
            match Entry::new(data, group, self.event_tx.clone()) {
                Ok(entry) => {
                    if let Err(error) = self.router.register(Arc::new(entry)) {
                        log::error!(
                            "entry_load_failed id={} point={} error={}",
                            entry_id,
                            point,
                            error
                        );
                        continue;
                    }
                    log::info!("entry_loaded id={} point={}", entry_id, point);
                    loaded += 1;
                }
                Err(error) => {
                    log::error!(
                        "entry_load_failed id={} point={} error={}",
                        entry_id,
                        point,
                        error
                    );
                }
            }
        }

        Ok(loaded)
    }

    /// Start consumers, the tick loop and the event loop.
    pub fn start(&mut self) {
        self.running.store(true, Ordering::Relaxed);

        let consumers: Vec<ConsumerHandle> = self
            .pending_consumers
            .drain(..)
            .map(ConsumerHandle::spawn)
            .collect();

        self.loops.push(self.spawn_tick_loop());
        if let Some(event_rx) = self.event_rx.take() {
            self.loops.push(self.spawn_event_loop(event_rx, consumers));
        } else {
            log::error!("event_loop_already_started start() called twice?");
        }
    }

    fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let router = self.router.clone();
        let running = self.running.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.tick_interval;

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = sleep(interval) => {
                        router.tick();
                        tracing::debug!(
                            target: "manager",
                            points = router.point_count(),
                            "tick_replayed"
                        );
                    }
                    _ = shutdown.notified() => break,
                }
            }
            log::info!("tick_loop_stopped");
        })
    }

    fn spawn_event_loop(
        &self,
        mut event_rx: mpsc::Receiver<AlarmEvent>,
        consumers: Vec<ConsumerHandle>,
    ) -> JoinHandle<()> {
        let running = self.running.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                tokio::select! {
                    received = event_rx.recv() => {
                        let Some(event) = received else { break };
                        tracing::info!(
                            target: "manager",
                            point = %event.point,
                            condition = %event.condition,
                            value = %event.value_measured,
                            "event_dispatched"
                        );
                        for consumer in &consumers {
                            consumer.add(event.clone());
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
            // Let each worker drain what it already accepted, then stop.
            for consumer in consumers {
                consumer.join().await;
            }
            log::info!("event_loop_stopped");
        })
    }

    /// Cooperative shutdown: flip the running flag, wake both loops, then
    /// wait for them (and, transitively, the consumers) to finish.
    pub async fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown.notify_waiters();
        for handle in self.loops.drain(..) {
            if let Err(error) = handle.await {
                log::error!("loop_join_failed error={}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::Config;
    use crate::consumer::{AnyConsumer, PersistenceConsumer, RecordingConsumer};
    use crate::entry::EntryData;
    use crate::event::AlarmEvent;
    use crate::feed::{PointValue, SimulatedFeed};
    use crate::store::{GroupData, Store};

    use super::Manager;

    fn test_config() -> Config {
        toml::from_str(
            r#"
            tick_interval_secs = 1
            [smtp]
            host = "smtp.example.org"
            login = "alarms@example.org"
            password = "secret"
            "#,
        )
        .expect("config should parse")
    }

    fn seed_store(store: &Store) {
        store
            .insert_group(&GroupData {
                id: "g1".to_string(),
                name: "vacuum".to_string(),
                enabled: true,
                description: String::new(),
            })
            .expect("seed group");
        store
            .insert_entry(&EntryData {
                id: "e1".to_string(),
                point: "VAC:Pressure1".to_string(),
                recipients: vec!["ops@example.org".to_string()],
                condition: "superior than".to_string(),
                alarm_values: "10".to_string(),
                unit: "mbar".to_string(),
                warning: "pressure too high".to_string(),
                subject: "vacuum warning".to_string(),
                cooldown_secs: 0.0,
                group: "vacuum".to_string(),
            })
            .expect("seed entry");
        store
            .insert_entry(&EntryData {
                id: "e2".to_string(),
                point: "VAC:Pressure2".to_string(),
                recipients: vec!["ops@example.org".to_string()],
                condition: "out of range".to_string(),
                alarm_values: "nonsense".to_string(),
                unit: "mbar".to_string(),
                warning: "pressure out of range".to_string(),
                subject: "vacuum warning".to_string(),
                cooldown_secs: 0.0,
                group: "vacuum".to_string(),
            })
            .expect("seed broken entry");
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipeline_moves_events_from_feed_to_consumers() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(Store::open(&temp.path().to_string_lossy()).expect("open store"));
        seed_store(&store);

        let feed = Arc::new(SimulatedFeed::new());
        let seen: Arc<Mutex<Vec<AlarmEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let consumers = vec![
            AnyConsumer::Recording(RecordingConsumer { seen: seen.clone() }),
            AnyConsumer::Persistence(PersistenceConsumer::new(store.clone())),
        ];

        let mut manager = Manager::new(&test_config(), store.clone(), feed.clone(), consumers);

        // The broken entry is skipped, the valid one loads.
        let loaded = manager.load_entries().expect("load entries");
        assert_eq!(loaded, 1);
        assert_eq!(manager.router().point_count(), 1);

        manager.start();

        feed.push("VAC:Pressure1", Some(PointValue::Float(12.5)));

        wait_for("event to reach both consumers", || {
            !seen.lock().unwrap().is_empty() && !store.archived_events().is_empty()
        })
        .await;

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen[0].point, "VAC:Pressure1");
            assert_eq!(seen[0].value_measured, "12.50");
        }
        let archived = store.archived_events();
        assert_eq!(archived[0].point, "VAC:Pressure1");

        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_stops_both_loops() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(Store::open(&temp.path().to_string_lossy()).expect("open store"));
        let feed = Arc::new(SimulatedFeed::new());

        let mut manager = Manager::new(&test_config(), store, feed, Vec::new());
        manager.start();
        manager.shutdown().await;
    }
}
