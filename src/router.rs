use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::entry::Entry;
use crate::feed::{
    ConnectionChanged, FeedError, PointSubscription, SampleObserver, TelemetryFeed, ValueChanged,
};

/// Demultiplexes the telemetry feed: one upstream subscription per distinct
/// point name, shared by every entry monitoring that point. Samples are
/// fanned out synchronously in the feed's delivery context; anything slow
/// belongs downstream of the event queue.
pub struct SubscriptionRouter {
    feed: Arc<dyn TelemetryFeed>,
    points: Mutex<HashMap<String, PointRoute>>,
}

struct PointRoute {
    fanout: Arc<PointFanout>,
    subscription: Box<dyn PointSubscription>,
}

/// Observer for one point, dispatching each sample to all registered
/// entries. Caches the last sample so a manual trigger can re-evaluate it.
struct PointFanout {
    point: String,
    entries: Mutex<Vec<Arc<Entry>>>,
    last_sample: Mutex<Option<ValueChanged>>,
}

impl SubscriptionRouter {
    pub fn new(feed: Arc<dyn TelemetryFeed>) -> Self {
        Self {
            feed,
            points: Mutex::new(HashMap::new()),
        }
    }

    /// Register an entry, creating the upstream subscription for its point
    /// on first reference.
    pub fn register(&self, entry: Arc<Entry>) -> Result<(), FeedError> {
        let mut points = lock(&self.points);

        if let Some(route) = points.get(entry.point()) {
            route.fanout.add_entry(entry);
            return Ok(());
        }

        let fanout = Arc::new(PointFanout {
            point: entry.point().to_string(),
            entries: Mutex::new(vec![entry.clone()]),
            last_sample: Mutex::new(None),
        });
        let observer: Arc<dyn SampleObserver> = fanout.clone();
        let subscription = self.feed.subscribe(entry.point(), observer)?;
        if !subscription.is_connected() {
            log::warn!("point_subscribed_disconnected point={}", entry.point());
        }

        points.insert(
            entry.point().to_string(),
            PointRoute {
                fanout,
                subscription,
            },
        );
        Ok(())
    }

    /// Replay the last known value of every subscribed point through the
    /// normal handler path, so entries re-check conditions even when the
    /// feed has pushed nothing new.
    pub fn tick(&self) {
        for route in lock(&self.points).values() {
            route.subscription.replay_last_value();
        }
    }

    /// Re-evaluate every point against its cached sample, bypassing the
    /// cooldown gate. Operator action for forcing a fresh round of
    /// notifications.
    pub fn trigger_all(&self) -> usize {
        let names: Vec<String> = lock(&self.points).keys().cloned().collect();
        names
            .iter()
            .filter(|name| self.trigger_point(name))
            .count()
    }

    /// Re-evaluate one point's entries against its cached sample, bypassing
    /// the cooldown gate. Returns false when the point is unknown or has no
    /// cached sample yet.
    pub fn trigger_point(&self, point: &str) -> bool {
        let fanout = {
            let points = lock(&self.points);
            match points.get(point) {
                Some(route) => route.fanout.clone(),
                None => return false,
            }
        };
        fanout.trigger()
    }

    pub fn point_count(&self) -> usize {
        lock(&self.points).len()
    }
}

impl PointFanout {
    fn add_entry(&self, entry: Arc<Entry>) {
        lock(&self.entries).push(entry);
    }

    fn trigger(&self) -> bool {
        let Some(sample) = lock(&self.last_sample).clone() else {
            return false;
        };
        for entry in lock(&self.entries).iter() {
            if let Err(error) = entry.trigger(&sample) {
                log::error!(
                    "trigger_failed entry={} point={} error={}",
                    entry.id(),
                    self.point,
                    error
                );
            }
        }
        true
    }
}

impl SampleObserver for PointFanout {
    fn value_changed(&self, sample: &ValueChanged) {
        log::debug!(
            "sample_received point={} host={} status={} severity={}",
            sample.point,
            sample.host,
            sample.status,
            sample.severity
        );
        *lock(&self.last_sample) = Some(sample.clone());
        for entry in lock(&self.entries).iter() {
            if let Err(error) = entry.handle_value_changed(sample) {
                // One misrouted or failing entry must not starve the rest
                // of the fan-out.
                log::error!(
                    "sample_dispatch_failed entry={} point={} error={}",
                    entry.id(),
                    self.point,
                    error
                );
            }
        }
    }

    fn connection_changed(&self, change: &ConnectionChanged) {
        for entry in lock(&self.entries).iter() {
            entry.handle_connection_changed(change);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::entry::{Entry, EntryData, Group};
    use crate::event::AlarmEvent;
    use crate::feed::{PointValue, SimulatedFeed};

    use super::SubscriptionRouter;

    fn entry_for(
        id: &str,
        point: &str,
        group: &Arc<Group>,
        tx: mpsc::Sender<AlarmEvent>,
    ) -> Arc<Entry> {
        let data = EntryData {
            id: id.to_string(),
            point: point.to_string(),
            recipients: vec!["ops@example.org".to_string()],
            condition: "superior than".to_string(),
            alarm_values: "10".to_string(),
            unit: "A".to_string(),
            warning: "current too high".to_string(),
            subject: "current warning".to_string(),
            cooldown_secs: 0.0,
            group: group.name().to_string(),
        };
        Arc::new(Entry::new(data, group.clone(), tx).expect("entry should build"))
    }

    #[test]
    fn entries_on_the_same_point_share_one_subscription() {
        let feed = Arc::new(SimulatedFeed::new());
        let router = SubscriptionRouter::new(feed.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let group = Arc::new(Group::new("g1".to_string(), true));

        router
            .register(entry_for("e1", "RF:Current", &group, tx.clone()))
            .expect("register e1");
        router
            .register(entry_for("e2", "RF:Current", &group, tx))
            .expect("register e2");
        assert_eq!(router.point_count(), 1);

        feed.push("RF:Current", Some(PointValue::Float(25.0)));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tick_replays_cached_values_through_the_cooldown_gate() {
        let feed = Arc::new(SimulatedFeed::new());
        let router = SubscriptionRouter::new(feed.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let group = Arc::new(Group::new("g1".to_string(), true));
        router
            .register(entry_for("e1", "RF:Current", &group, tx))
            .expect("register");

        // Nothing cached yet: tick is a no-op.
        router.tick();
        assert!(rx.try_recv().is_err());

        feed.push("RF:Current", Some(PointValue::Float(25.0)));
        assert!(rx.try_recv().is_ok());

        // Cooldown is zero, so the replayed value fires again.
        router.tick();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn trigger_point_reuses_the_cached_sample() {
        let feed = Arc::new(SimulatedFeed::new());
        let router = SubscriptionRouter::new(feed.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let group = Arc::new(Group::new("g1".to_string(), true));
        router
            .register(entry_for("e1", "RF:Current", &group, tx))
            .expect("register");

        assert!(!router.trigger_point("RF:Current"));
        assert!(!router.trigger_point("RF:Unknown"));

        feed.push("RF:Current", Some(PointValue::Float(25.0)));
        assert!(rx.try_recv().is_ok());

        assert!(router.trigger_point("RF:Current"));
        assert!(rx.try_recv().is_ok());

        assert_eq!(router.trigger_all(), 1);
        assert!(rx.try_recv().is_ok());
    }
}
