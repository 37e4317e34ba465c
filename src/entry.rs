use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::condition::{Condition, ConditionError, ConditionKind};
use crate::event::{format_measured, AlarmEvent, Timestamp};
use crate::feed::{ConnectionChanged, ValueChanged};

/// Operator-togglable collection of entries sharing one enabled flag.
/// The flag is read on every sample from the feed's delivery context and
/// written from wherever an operator flips it, hence the guarded field.
#[derive(Debug)]
pub struct Group {
    name: String,
    enabled: Mutex<bool>,
}

impl Group {
    pub fn new(name: String, enabled: bool) -> Self {
        Self {
            name,
            enabled: Mutex::new(enabled),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        *lock(&self.enabled)
    }

    pub fn set_enabled(&self, enabled: bool) {
        *lock(&self.enabled) = enabled;
    }
}

/// Immutable snapshot of one monitored-point configuration row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryData {
    pub id: String,
    pub point: String,
    pub recipients: Vec<String>,
    pub condition: String,
    pub alarm_values: String,
    pub unit: String,
    pub warning: String,
    pub subject: String,
    pub cooldown_secs: f64,
    pub group: String,
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry {entry_id} monitors '{expected}' but received a sample for '{received}'")]
    PointMismatch {
        entry_id: String,
        expected: String,
        received: String,
    },
    #[error(transparent)]
    Condition(#[from] ConditionError),
}

struct EntryState {
    condition: Condition,
    /// None until the first dispatched event, so the cooldown can never
    /// suppress the very first check after startup.
    last_event_time: Option<Instant>,
}

/// Runtime monitor for one point: applies group gating and the cooldown,
/// evaluates the condition, and pushes qualifying events into the bounded
/// dispatcher queue.
pub struct Entry {
    id: String,
    point: String,
    recipients: Vec<String>,
    unit: String,
    warning: String,
    subject: String,
    cooldown: Duration,
    group: Arc<Group>,
    events: mpsc::Sender<AlarmEvent>,
    state: Mutex<EntryState>,
}

impl Entry {
    pub fn new(
        data: EntryData,
        group: Arc<Group>,
        events: mpsc::Sender<AlarmEvent>,
    ) -> Result<Self, EntryError> {
        let kind = ConditionKind::parse(&data.condition)
            .ok_or_else(|| ConditionError::UnknownKind(data.condition.clone()))?;
        let condition = Condition::new(kind, &data.alarm_values)?;

        Ok(Self {
            id: data.id,
            point: data.point,
            recipients: data.recipients,
            unit: data.unit,
            warning: data.warning,
            subject: data.subject,
            cooldown: Duration::from_secs_f64(data.cooldown_secs.max(0.0)),
            group,
            events,
            state: Mutex::new(EntryState {
                condition,
                last_event_time: None,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn point(&self) -> &str {
        &self.point
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    pub fn condition_kind(&self) -> ConditionKind {
        lock(&self.state).condition.kind()
    }

    /// The raw limit string the running condition was built from.
    pub fn alarm_values(&self) -> String {
        lock(&self.state).condition.limits().to_string()
    }

    pub fn handle_value_changed(&self, sample: &ValueChanged) -> Result<(), EntryError> {
        self.evaluate(sample, Instant::now(), false)
    }

    /// Re-evaluate a cached sample bypassing the cooldown gate. Manual
    /// operation; the periodic tick replays through the normal handler.
    pub fn trigger(&self, sample: &ValueChanged) -> Result<(), EntryError> {
        self.evaluate(sample, Instant::now(), true)
    }

    pub fn handle_connection_changed(&self, change: &ConnectionChanged) {
        if change.point != self.point {
            log::warn!(
                "connection_event_mismatch entry={} expected={} received={}",
                self.id,
                self.point,
                change.point
            );
            return;
        }

        if change.connected {
            log::info!("point_reconnected point={}", self.point);
        } else {
            // Deliberately not an alarm source: routine network blips would
            // storm the queue.
            log::warn!("point_disconnected point={}", self.point);
        }
    }

    #[cfg(test)]
    pub(crate) fn handle_value_changed_at(
        &self,
        sample: &ValueChanged,
        now: Instant,
    ) -> Result<(), EntryError> {
        self.evaluate(sample, now, false)
    }

    fn evaluate(
        &self,
        sample: &ValueChanged,
        now: Instant,
        bypass_cooldown: bool,
    ) -> Result<(), EntryError> {
        if sample.point != self.point {
            return Err(EntryError::PointMismatch {
                entry_id: self.id.clone(),
                expected: self.point.clone(),
                received: sample.point.clone(),
            });
        }

        if !self.group.enabled() {
            log::debug!(
                "sample_skipped entry={} reason=group_disabled group={}",
                self.id,
                self.group.name()
            );
            return Ok(());
        }

        let Some(value) = &sample.value else {
            return Ok(());
        };

        // Cooldown check, condition evaluation and enqueue happen under one
        // lock: two concurrent samples must not both pass the cooldown gate,
        // and the cooldown must only advance when the queue accepted the
        // event. The enqueue is non-blocking, so holding the lock across it
        // is safe.
        let mut state = lock(&self.state);

        if !bypass_cooldown && self.cooldown_active(&state, now) {
            log::info!(
                "sample_skipped entry={} reason=cooldown_active point={}",
                self.id,
                self.point
            );
            return Ok(());
        }

        let Some(number) = value.as_f64() else {
            log::warn!(
                "non_numeric_sample entry={} point={} value={:?}",
                self.id,
                self.point,
                value
            );
            return Ok(());
        };

        let Some(specified_range) = state.condition.check(number) else {
            return Ok(());
        };

        let event = AlarmEvent {
            point: self.point.clone(),
            condition: state.condition.kind(),
            specified_range,
            unit: self.unit.clone(),
            subject: self.subject.clone(),
            recipients: self.recipients.clone(),
            warning: self.warning.clone(),
            value_measured: format_measured(value),
            timestamp: Timestamp::now(),
        };

        match self.events.try_send(event) {
            Ok(()) => {
                state.last_event_time = Some(now);
                log::info!(
                    "alarm_dispatched entry={} point={} condition={} value={}",
                    self.id,
                    self.point,
                    state.condition.kind(),
                    number
                );
            }
            // Dropping here leaves the cooldown untouched: the alarm is
            // reconsidered on the next sample instead of being silenced for
            // a full window by a transient full queue.
            Err(TrySendError::Full(_)) => {
                log::error!(
                    "event_queue_full entry={} point={} event dropped",
                    self.id,
                    self.point
                );
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("event_queue_closed entry={} shutting down?", self.id);
            }
        }

        Ok(())
    }

    fn cooldown_active(&self, state: &EntryState, now: Instant) -> bool {
        match state.last_event_time {
            Some(last) => now.saturating_duration_since(last) < self.cooldown,
            None => false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
