//! # Event Bus
//!
//! In-process pub/sub broker connecting the agents. Every publish is
//! recorded in a bounded history before any handler runs; handlers for a
//! topic run concurrently and the bus waits for all of them to settle, so
//! one slow or failing handler never blocks its siblings. Queued messages
//! are drained by a single in-order worker.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::{AgentMessage, EventPayload, MessageType};

/// Default bounded history size
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Future returned by an event handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type Handler = std::sync::Arc<dyn Fn(EventPayload) -> HandlerFuture + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`] to remove the handler.
#[derive(Debug, Clone)]
pub struct SubscriptionToken {
    topic: String,
    id: u64,
}

struct Subscriber {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<AgentMessage>,
    draining: bool,
}

/// Criteria for narrowing [`EventBus::message_history`]
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub message_type: Option<MessageType>,
    pub since: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn matches(&self, message: &AgentMessage) -> bool {
        if let Some(sender) = &self.sender {
            if &message.sender != sender {
                return false;
            }
        }
        if let Some(recipient) = &self.recipient {
            if &message.recipient != recipient {
                return false;
            }
        }
        if let Some(message_type) = self.message_type {
            if message.message_type != message_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if message.timestamp <= since {
                return false;
            }
        }
        true
    }
}

/// Central pub/sub broker with bounded message history
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_subscriber_id: AtomicU64,
    history: Mutex<VecDeque<AgentMessage>>,
    history_capacity: usize,
    queue: Mutex<QueueState>,
}

impl EventBus {
    /// Create a bus with the given history capacity.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
            history_capacity,
            queue: Mutex::new(QueueState::default()),
        }
    }

    /// Register a handler for a topic.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Result<SubscriptionToken>
    where
        F: Fn(EventPayload) -> HandlerFuture + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.lock_subscribers()?;
        subscribers
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                id,
                handler: std::sync::Arc::new(handler),
            });
        Ok(SubscriptionToken {
            topic: topic.to_string(),
            id,
        })
    }

    /// Remove a handler. Idempotent: unknown or already-removed tokens are
    /// a no-op, and removal never disturbs a publish already in flight.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> Result<()> {
        let mut subscribers = self.lock_subscribers()?;
        if let Some(entries) = subscribers.get_mut(&token.topic) {
            entries.retain(|s| s.id != token.id);
        }
        Ok(())
    }

    /// Publish a payload on a topic, awaiting every handler.
    ///
    /// The envelope is recorded in history before any handler runs. A
    /// handler failure is logged and does not prevent siblings from
    /// completing.
    pub async fn publish(&self, topic: &str, payload: EventPayload) -> Result<()> {
        debug!(topic, "publishing event");
        let message = AgentMessage::broadcast(payload.clone());
        self.record(message)?;
        self.dispatch(topic, payload).await
    }

    /// Queue an envelope for in-order routing to `"{sender}.{message_type}"`.
    ///
    /// Only one drain loop runs at a time: a call arriving while another
    /// drain is active appends to the queue and returns, and the active
    /// loop picks the message up.
    pub async fn publish_message(&self, message: AgentMessage) -> Result<()> {
        self.record(message.clone())?;
        {
            let mut queue = self.lock_queue()?;
            queue.messages.push_back(message);
            if queue.draining {
                return Ok(());
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = self.lock_queue()?;
                match queue.messages.pop_front() {
                    Some(message) => message,
                    None => {
                        queue.draining = false;
                        break;
                    }
                }
            };
            let topic = format!("{}.{}", next.sender, next.message_type.as_str());
            if let Err(e) = self.dispatch(&topic, next.payload).await {
                warn!(topic, error = %e, "failed to route queued message");
            }
        }
        Ok(())
    }

    /// Run all handlers for a topic concurrently and wait for them to settle.
    async fn dispatch(&self, topic: &str, payload: EventPayload) -> Result<()> {
        let handlers: Vec<Handler> = {
            let subscribers = self.lock_subscribers()?;
            subscribers
                .get(topic)
                .map(|entries| entries.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(topic, "no subscribers for event");
            return Ok(());
        }

        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                let payload = payload.clone();
                tokio::spawn(async move { handler(payload).await })
            })
            .collect();

        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(topic, error = %e, "event handler failed"),
                Err(e) => warn!(topic, error = %e, "event handler panicked"),
            }
        }
        Ok(())
    }

    /// Ordered history of every published envelope, optionally filtered.
    pub fn message_history(&self, filter: Option<&HistoryFilter>) -> Result<Vec<AgentMessage>> {
        let history = self.lock_history()?;
        Ok(history
            .iter()
            .filter(|m| filter.map(|f| f.matches(m)).unwrap_or(true))
            .cloned()
            .collect())
    }

    pub fn clear_history(&self) -> Result<()> {
        self.lock_history()?.clear();
        Ok(())
    }

    /// Number of handlers currently registered for a topic.
    pub fn subscriber_count(&self, topic: &str) -> Result<usize> {
        let subscribers = self.lock_subscribers()?;
        Ok(subscribers.get(topic).map(|e| e.len()).unwrap_or(0))
    }

    /// All topics with at least one registration.
    pub fn topics(&self) -> Result<Vec<String>> {
        let subscribers = self.lock_subscribers()?;
        Ok(subscribers.keys().cloned().collect())
    }

    fn record(&self, message: AgentMessage) -> Result<()> {
        let mut history = self.lock_history()?;
        history.push_back(message);
        while history.len() > self.history_capacity {
            history.pop_front();
        }
        Ok(())
    }

    fn lock_subscribers(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<Subscriber>>>> {
        self.subscribers
            .lock()
            .map_err(|e| anyhow::anyhow!("subscriber lock poisoned: {}", e))
    }

    fn lock_history(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<AgentMessage>>> {
        self.history
            .lock()
            .map_err(|e| anyhow::anyhow!("history lock poisoned: {}", e))
    }

    fn lock_queue(&self) -> Result<std::sync::MutexGuard<'_, QueueState>> {
        self.queue
            .lock()
            .map_err(|e| anyhow::anyhow!("queue lock poisoned: {}", e))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn scan_request() -> EventPayload {
        EventPayload::ScanRequest {
            requested_by: "operator".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        bus.subscribe("manual.scan_request", move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();

        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_event() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = hits.clone();
            bus.subscribe("manual.scan_request", move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .unwrap();
        }

        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_siblings() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe("manual.scan_request", |_| {
            Box::pin(async { anyhow::bail!("handler exploded") })
        })
        .unwrap();

        let counter = hits.clone();
        bus.subscribe("manual.scan_request", move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();

        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let token = bus
            .subscribe("manual.scan_request", move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .unwrap();

        bus.unsubscribe(&token).unwrap();
        bus.unsubscribe(&token).unwrap();

        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("manual.scan_request").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_records_every_publish() {
        let bus = EventBus::default();
        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();
        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();

        let history = bus.message_history(None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message_type, MessageType::ScanRequest);

        bus.clear_history().unwrap();
        assert!(bus.message_history(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_evicts_oldest_beyond_capacity() {
        let bus = EventBus::new(2);
        for _ in 0..3 {
            bus.publish("manual.scan_request", scan_request())
                .await
                .unwrap();
        }
        assert_eq!(bus.message_history(None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_history_filter_by_type() {
        let bus = EventBus::default();
        bus.publish("manual.scan_request", scan_request())
            .await
            .unwrap();
        bus.publish(
            "implementation.status",
            EventPayload::ImplementationStatus {
                plan_id: "PLAN-1".to_string(),
                status: "completed".to_string(),
                completed_tasks: vec![],
            },
        )
        .await
        .unwrap();

        let filter = HistoryFilter {
            message_type: Some(MessageType::Status),
            ..Default::default()
        };
        let history = bus.message_history(Some(&filter)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message_type, MessageType::Status);
    }

    #[tokio::test]
    async fn test_queued_message_routes_by_sender_and_type() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        bus.subscribe("operator.scan_request", move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();

        let message =
            crate::types::AgentMessage::addressed("operator", "broadcast", scan_request());
        bus.publish_message(message).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // Queued publishes land in history exactly once.
        assert_eq!(bus.message_history(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_topics_lists_registrations() {
        let bus = EventBus::default();
        bus.subscribe("a.finding", |_| Box::pin(async { Ok(()) }))
            .unwrap();
        bus.subscribe("b.status", |_| Box::pin(async { Ok(()) }))
            .unwrap();

        let mut topics = bus.topics().unwrap();
        topics.sort();
        assert_eq!(topics, vec!["a.finding", "b.status"]);
    }
}
