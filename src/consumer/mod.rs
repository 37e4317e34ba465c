use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::AlarmEvent;
use crate::mail::MailClient;
use crate::store::Store;

/// A sink for dispatched alarm events. Implementations own their failure
/// policy: errors are handled (logged) inside `handle`, never surfaced to
/// the dispatcher or to sibling consumers.
pub trait EventConsumer: Send + 'static {
    fn name(&self) -> &'static str;
    async fn handle(&mut self, event: AlarmEvent);
}

/// The closed set of consumers the dispatcher fans out to.
pub enum AnyConsumer {
    Mail(MailConsumer),
    Persistence(PersistenceConsumer),
    #[cfg(test)]
    Recording(RecordingConsumer),
}

impl EventConsumer for AnyConsumer {
    fn name(&self) -> &'static str {
        match self {
            AnyConsumer::Mail(consumer) => consumer.name(),
            AnyConsumer::Persistence(consumer) => consumer.name(),
            #[cfg(test)]
            AnyConsumer::Recording(consumer) => consumer.name(),
        }
    }

    async fn handle(&mut self, event: AlarmEvent) {
        match self {
            AnyConsumer::Mail(consumer) => consumer.handle(event).await,
            AnyConsumer::Persistence(consumer) => consumer.handle(event).await,
            #[cfg(test)]
            AnyConsumer::Recording(consumer) => consumer.handle(event).await,
        }
    }
}

/// Worker task plus the private queue feeding it. Each consumer drains its
/// own queue at its own pace; a slow consumer never blocks its siblings.
pub struct ConsumerHandle {
    name: &'static str,
    queue: mpsc::UnboundedSender<AlarmEvent>,
    worker: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn spawn(mut consumer: AnyConsumer) -> Self {
        let (queue, mut events) = mpsc::unbounded_channel::<AlarmEvent>();
        let name = consumer.name();
        let worker = tokio::spawn(async move {
            log::info!("consumer_started name={}", name);
            while let Some(event) = events.recv().await {
                consumer.handle(event).await;
            }
            log::info!("consumer_stopped name={}", name);
        });
        Self {
            name,
            queue,
            worker,
        }
    }

    pub fn add(&self, event: AlarmEvent) {
        if self.queue.send(event).is_err() {
            log::error!(
                "consumer_enqueue_failed name={} reason=worker_gone",
                self.name
            );
        }
    }

    /// Close the queue and wait for the worker to drain what it already
    /// accepted.
    pub async fn join(self) {
        drop(self.queue);
        if let Err(error) = self.worker.await {
            log::error!("consumer_join_failed name={} error={}", self.name, error);
        }
    }
}

/// Sends one notification per event; send failures are logged and the event
/// dropped. No retry: a repeating alarm will re-fire after its cooldown.
pub struct MailConsumer {
    client: MailClient,
}

impl MailConsumer {
    pub fn new(client: MailClient) -> Self {
        Self { client }
    }
}

impl EventConsumer for MailConsumer {
    fn name(&self) -> &'static str {
        "mail"
    }

    async fn handle(&mut self, event: AlarmEvent) {
        if let Err(error) = self.client.send(&event).await {
            log::error!(
                "mail_send_failed point={} recipients={} error={}",
                event.point,
                event.recipients.len(),
                error
            );
        }
    }
}

/// Archives each event into the store.
pub struct PersistenceConsumer {
    store: Arc<Store>,
}

impl PersistenceConsumer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl EventConsumer for PersistenceConsumer {
    fn name(&self) -> &'static str {
        "persistence"
    }

    async fn handle(&mut self, event: AlarmEvent) {
        if let Err(error) = self.store.persist_event(&event) {
            log::error!(
                "event_persist_failed point={} error={}",
                event.point,
                error
            );
        }
    }
}

#[cfg(test)]
pub struct RecordingConsumer {
    pub seen: Arc<std::sync::Mutex<Vec<AlarmEvent>>>,
}

#[cfg(test)]
impl EventConsumer for RecordingConsumer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn handle(&mut self, event: AlarmEvent) {
        self.seen.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::condition::ConditionKind;
    use crate::event::{AlarmEvent, Timestamp};

    use super::{AnyConsumer, ConsumerHandle, RecordingConsumer};

    fn event(value: &str) -> AlarmEvent {
        AlarmEvent {
            point: "TEST:PV".to_string(),
            condition: ConditionKind::SuperiorThan,
            specified_range: "value required to be lower than 10".to_string(),
            unit: "A".to_string(),
            subject: "current warning".to_string(),
            recipients: vec!["ops@example.org".to_string()],
            warning: "current too high".to_string(),
            value_measured: value.to_string(),
            timestamp: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn worker_drains_its_queue_in_fifo_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = ConsumerHandle::spawn(AnyConsumer::Recording(RecordingConsumer {
            seen: seen.clone(),
        }));

        handle.add(event("11.00"));
        handle.add(event("12.00"));
        handle.add(event("13.00"));
        handle.join().await;

        let seen = seen.lock().unwrap();
        let values: Vec<&str> = seen.iter().map(|e| e.value_measured.as_str()).collect();
        assert_eq!(values, vec!["11.00", "12.00", "13.00"]);
    }

    #[tokio::test]
    async fn join_closes_an_idle_worker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = ConsumerHandle::spawn(AnyConsumer::Recording(RecordingConsumer {
            seen: seen.clone(),
        }));
        handle.join().await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
