use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;

use super::{
    ConnectionChanged, FeedError, PointSubscription, PointValue, SampleObserver, TelemetryFeed,
    ValueChanged,
};

const SIMULATED_HOST: &str = "simulated:0";

/// In-process telemetry source. Caches the last value per point, replays it
/// on demand, and can drive subscribed points with deterministic wave-shaped
/// values. Used in simulation mode and throughout the test suite, where
/// samples are injected with [`SimulatedFeed::push`].
#[derive(Default)]
pub struct SimulatedFeed {
    points: Mutex<HashMap<String, Arc<SimulatedPoint>>>,
}

struct SimulatedPoint {
    name: String,
    observers: Mutex<Vec<Arc<dyn SampleObserver>>>,
    last: Mutex<Option<ValueChanged>>,
    connected: AtomicBool,
}

struct SimulatedSubscription {
    point: Arc<SimulatedPoint>,
}

impl SimulatedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a sample to every observer of `point` and cache it for replay.
    pub fn push(&self, point: &str, value: Option<PointValue>) {
        let Some(state) = self.point(point) else {
            log::debug!("simulated_push_ignored point={} reason=no_subscribers", point);
            return;
        };
        let sample = ValueChanged {
            point: state.name.clone(),
            value,
            status: 0,
            host: SIMULATED_HOST.to_string(),
            severity: 0,
        };
        *lock(&state.last) = Some(sample.clone());
        for observer in lock(&state.observers).iter() {
            observer.value_changed(&sample);
        }
    }

    /// Flip a point's connection state, notifying observers of the change.
    pub fn set_connected(&self, point: &str, connected: bool) {
        let Some(state) = self.point(point) else {
            return;
        };
        state.connected.store(connected, Ordering::Relaxed);
        let change = ConnectionChanged {
            point: state.name.clone(),
            connected,
        };
        for observer in lock(&state.observers).iter() {
            observer.connection_changed(&change);
        }
    }

    /// Drive every subscribed point with a deterministic wave, one round per
    /// `interval`. Runs until `running` is cleared; `shutdown` shortens the
    /// final sleep.
    pub fn spawn_generator(
        self: Arc<Self>,
        interval: Duration,
        running: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut round: u64 = 0;
            while running.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = shutdown.notified() => break,
                }
                round = round.wrapping_add(1);
                self.generate_round(round);
            }
            log::info!("simulated_feed_generator_stopped rounds={}", round);
        })
    }

    fn generate_round(&self, round: u64) {
        let names: Vec<String> = lock(&self.points).keys().cloned().collect();
        for (index, name) in names.iter().enumerate() {
            let phase = (round as f64 + index as f64 * 7.0) / 8.0;
            let mut value = 50.0 + phase.sin() * 30.0;
            // Periodic excursions well outside any sane limit, so alarm
            // paths are exercised even with wide condition ranges.
            if round % 29 == 0 {
                value = 5_000.0;
            }
            self.push(name, Some(PointValue::Float(value)));
        }
    }

    fn point(&self, name: &str) -> Option<Arc<SimulatedPoint>> {
        lock(&self.points).get(name).cloned()
    }
}

impl TelemetryFeed for SimulatedFeed {
    fn subscribe(
        &self,
        point: &str,
        observer: Arc<dyn SampleObserver>,
    ) -> Result<Box<dyn PointSubscription>, FeedError> {
        if point.trim().is_empty() {
            return Err(FeedError::Subscribe {
                point: point.to_string(),
                reason: "point name must not be empty".to_string(),
            });
        }
        let state = {
            let mut points = lock(&self.points);
            points
                .entry(point.to_string())
                .or_insert_with(|| {
                    Arc::new(SimulatedPoint {
                        name: point.to_string(),
                        observers: Mutex::new(Vec::new()),
                        last: Mutex::new(None),
                        connected: AtomicBool::new(true),
                    })
                })
                .clone()
        };
        lock(&state.observers).push(observer);
        Ok(Box::new(SimulatedSubscription { point: state }))
    }
}

impl PointSubscription for SimulatedSubscription {
    fn replay_last_value(&self) {
        let last = lock(&self.point.last).clone();
        let Some(sample) = last else {
            return;
        };
        for observer in lock(&self.point.observers).iter() {
            observer.value_changed(&sample);
        }
    }

    fn is_connected(&self) -> bool {
        self.point.connected.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::super::{
        ConnectionChanged, PointValue, SampleObserver, TelemetryFeed, ValueChanged,
    };
    use super::SimulatedFeed;

    #[derive(Default)]
    struct RecordingObserver {
        values: Mutex<Vec<Option<PointValue>>>,
        connections: Mutex<Vec<bool>>,
    }

    impl SampleObserver for RecordingObserver {
        fn value_changed(&self, sample: &ValueChanged) {
            self.values.lock().unwrap().push(sample.value.clone());
        }

        fn connection_changed(&self, change: &ConnectionChanged) {
            self.connections.lock().unwrap().push(change.connected);
        }
    }

    #[test]
    fn push_delivers_to_observers_and_caches_for_replay() {
        let feed = SimulatedFeed::new();
        let observer = Arc::new(RecordingObserver::default());
        let subscription = feed
            .subscribe("SIM:Temp1", observer.clone())
            .expect("subscribe");

        subscription.replay_last_value();
        assert!(observer.values.lock().unwrap().is_empty());

        feed.push("SIM:Temp1", Some(PointValue::Float(1.5)));
        subscription.replay_last_value();

        let seen = observer.values.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
    }

    #[test]
    fn connection_changes_reach_observers() {
        let feed = SimulatedFeed::new();
        let observer = Arc::new(RecordingObserver::default());
        let subscription = feed
            .subscribe("SIM:Temp1", observer.clone())
            .expect("subscribe");

        assert!(subscription.is_connected());
        feed.set_connected("SIM:Temp1", false);
        assert!(!subscription.is_connected());
        assert_eq!(*observer.connections.lock().unwrap(), vec![false]);
    }

    #[test]
    fn pushes_to_unknown_points_are_ignored() {
        let feed = SimulatedFeed::new();
        feed.push("SIM:Nothing", Some(PointValue::Int(1)));
    }

    #[test]
    fn empty_point_names_cannot_be_subscribed() {
        let feed = SimulatedFeed::new();
        let observer = Arc::new(RecordingObserver::default());
        assert!(feed.subscribe("  ", observer).is_err());
    }
}
