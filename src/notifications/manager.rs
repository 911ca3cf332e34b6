//! AsyncNotificationManager implementation

use crate::notifications::error::NotificationError;
use crate::notifications::event::{Event, EventFilter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// Receiving end handed to subscribers
pub type EventReceiver = UnboundedReceiver<Event>;

struct SubscriberInfo {
    filter: EventFilter,
    source: String,
    sender: UnboundedSender<Event>,
    delivered: usize,
}

/// Fan-out of events to filtered subscribers
pub struct AsyncNotificationManager {
    subscribers: HashMap<String, SubscriberInfo>,
}

impl Default for AsyncNotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncNotificationManager {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    pub fn subscribe(
        &mut self,
        subscriber_id: String,
        filter: EventFilter,
        source: String,
    ) -> EventReceiver {
        let (sender, receiver) = unbounded_channel();

        let subscriber_info = SubscriberInfo {
            filter,
            source: source.clone(),
            sender,
            delivered: 0,
        };

        if let Some(existing) = self.subscribers.insert(subscriber_id.clone(), subscriber_info) {
            log::warn!(
                "Subscriber '{}' replaced existing subscription (source: {} -> {})",
                subscriber_id,
                existing.source,
                source
            );
        }

        receiver
    }

    pub fn unsubscribe(&mut self, subscriber_id: &str) -> bool {
        self.subscribers.remove(subscriber_id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_subscriber(&self, subscriber_id: &str) -> bool {
        self.subscribers.contains_key(subscriber_id)
    }

    /// Number of events delivered to a subscriber so far
    pub fn delivered_count(&self, subscriber_id: &str) -> Option<usize> {
        self.subscribers.get(subscriber_id).map(|info| info.delivered)
    }

    /// Deliver an event to every subscriber whose filter accepts it
    ///
    /// Subscribers whose receiver has been dropped are removed and reported
    /// in the returned error; delivery to the others still happens.
    pub async fn publish(&mut self, event: Event) -> Result<(), NotificationError> {
        let mut failed_subscribers = Vec::new();

        for (subscriber_id, subscriber_info) in self.subscribers.iter_mut() {
            if !subscriber_info.filter.accepts(&event) {
                continue;
            }
            if subscriber_info.sender.send(event.clone()).is_err() {
                failed_subscribers.push(subscriber_id.clone());
            } else {
                subscriber_info.delivered += 1;
            }
        }

        for subscriber_id in &failed_subscribers {
            self.subscribers.remove(subscriber_id);
        }

        if !failed_subscribers.is_empty() {
            return Err(NotificationError::PublishFailed {
                event_type: event.kind().to_string(),
                failed_subscribers,
            });
        }

        Ok(())
    }
}

/// Shared handle used by pipeline stages to publish events
#[derive(Clone, Default)]
pub struct Notifier {
    manager: Arc<Mutex<AsyncNotificationManager>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(
        &self,
        subscriber_id: String,
        filter: EventFilter,
        source: String,
    ) -> EventReceiver {
        self.manager
            .lock()
            .await
            .subscribe(subscriber_id, filter, source)
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) -> bool {
        self.manager.lock().await.unsubscribe(subscriber_id)
    }

    /// Publish an event; delivery problems are logged, never returned
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.manager.lock().await.publish(event).await {
            log::debug!("Notification delivery incomplete: {}", e);
        }
    }
}
