use std::sync::Arc;

use thiserror::Error;

mod simulated;
pub use simulated::SimulatedFeed;

/// Payload of one telemetry sample. Only numeric variants can satisfy an
/// alarm condition; text values are logged and discarded by the entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PointValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl PointValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }
}

/// Value-changed notification delivered by a point subscription.
#[derive(Debug, Clone)]
pub struct ValueChanged {
    pub point: String,
    pub value: Option<PointValue>,
    pub status: i32,
    pub host: String,
    pub severity: i32,
}

#[derive(Debug, Clone)]
pub struct ConnectionChanged {
    pub point: String,
    pub connected: bool,
}

/// Receiver side of a point subscription. Invoked synchronously in the
/// feed's delivery context; implementations must be fast and reentrant-safe.
pub trait SampleObserver: Send + Sync {
    fn value_changed(&self, sample: &ValueChanged);
    fn connection_changed(&self, change: &ConnectionChanged);
}

/// Handle to one upstream subscription for a single point name.
pub trait PointSubscription: Send + Sync {
    /// Re-deliver the most recently cached value to every observer of the
    /// point. No-op when no value has arrived yet.
    fn replay_last_value(&self);

    fn is_connected(&self) -> bool;
}

/// A live-value source keyed by point name.
pub trait TelemetryFeed: Send + Sync {
    fn subscribe(
        &self,
        point: &str,
        observer: Arc<dyn SampleObserver>,
    ) -> Result<Box<dyn PointSubscription>, FeedError>;
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to subscribe to point '{point}': {reason}")]
    Subscribe { point: String, reason: String },
}
