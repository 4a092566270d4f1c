//! Topic-addressed publish/subscribe event bus.
//!
//! Every [`Subscription`] owns its own unbounded Tokio mpsc queue, so a slow
//! observer never makes a publisher wait and never loses events to lag.
//! Fan-out happens inline in [`EventBus::publish`]: the event is cloned once
//! per live subscriber of its topic and the publisher never suspends.
//!
//! # Lifecycle
//!
//! | State | `publish` | `subscribe` | outstanding subscriptions |
//! |---|---|---|---|
//! | never started | `Err(NotStarted)` | ok | wait |
//! | running | fan-out | ok | receive |
//! | stopped | `Err(NotStarted)` | ok (for the next run) | end (`None`) |
//!
//! `stop()` does not drain: events queued for a subscriber but not yet
//! received when the bus stops are discarded.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), aegis_types::AegisError> {
//! use aegis_middleware::{EventBus, topics};
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! bus.start();
//! let mut sub = bus.subscribe(topics::DECISION_MADE);
//!
//! assert_eq!(bus.publish(topics::DECISION_MADE, json!({"trace_id": "t-1"}))?, 1);
//! let event = sub.recv().await.unwrap();
//! assert_eq!(event.payload["trace_id"], "t-1");
//!
//! bus.stop();
//! assert!(sub.recv().await.is_none());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use aegis_types::{AegisError, Event};
use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Well-known topics published by the governor.
pub mod topics {
    pub const SYSTEM_START: &str = "aegis.system.start";
    pub const SYSTEM_STOP: &str = "aegis.system.stop";
    pub const DECISION_MADE: &str = "aegis.decision.made";
}

type Senders = HashMap<String, Vec<mpsc::UnboundedSender<Event>>>;

#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    /// Bumped by every `stop()`; subscriptions from an older generation are over.
    generation: AtomicU64,
    topics: Mutex<Senders>,
}

impl Shared {
    fn topics(&self) -> MutexGuard<'_, Senders> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared event bus handle. Clones share the same topics and lifecycle.
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    /// A stopped bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin accepting publishes. A no-op when already running.
    pub fn start(&self) {
        if !self.shared.running.swap(true, Ordering::SeqCst) {
            info!("event bus started");
        }
    }

    /// Stop accepting publishes and end every outstanding subscription.
    /// A no-op when not running.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let dropped: usize = {
            let mut topics = self.shared.topics();
            let count = topics.values().map(Vec::len).sum();
            topics.clear();
            count
        };
        info!(subscriptions = dropped, "event bus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Register interest in `topic`.
    ///
    /// The subscription sees only events published after this call.  It may
    /// be created before [`start`](Self::start); it ends at the next
    /// [`stop`](Self::stop).
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.shared.topics().entry(topic.clone()).or_default().push(tx);
        debug!(topic = %topic, "subscribed");
        Subscription {
            topic,
            receiver: rx,
            generation,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Deliver a new [`Event`] for `topic` to each of its current subscribers.
    ///
    /// Returns the number of subscribers the event was handed to; `Ok(0)`
    /// when nobody listens.  Subscriptions dropped since the last publish are
    /// pruned here.
    ///
    /// # Errors
    ///
    /// [`AegisError::NotStarted`] when the bus is not running.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<usize, AegisError> {
        if !self.is_running() {
            return Err(AegisError::NotStarted("EventBus".to_string()));
        }
        let event = Event::new(topic, payload);

        let mut topics = self.shared.topics();
        let Some(senders) = topics.get_mut(topic) else {
            debug!(topic, "no subscribers");
            return Ok(0);
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = senders.len();
        if delivered == 0 {
            topics.remove(topic);
        }
        debug!(topic, event_id = %event.id, delivered, "event published");
        Ok(delivered)
    }

    /// Live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared
            .topics()
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }
}

/// Lazy, unbounded sequence of events for one topic.
///
/// Yields `None` once the bus has been stopped.  Dropping a subscription
/// unregisters it.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<Event>,
    generation: u64,
    shared: Arc<Shared>,
}

impl Subscription {
    /// Wait for the next event; `None` after the bus stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        std::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn is_stale(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) != self.generation
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        if self.is_stale() {
            self.receiver.close();
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            // Queued before a stop that raced this poll.
            Poll::Ready(Some(_)) if self.is_stale() => {
                self.receiver.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().poll_event(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(50);

    fn running_bus() -> EventBus {
        let bus = EventBus::new();
        bus.start();
        bus
    }

    #[tokio::test]
    async fn publish_before_start_fails() {
        let bus = EventBus::new();
        let err = bus.publish("test.topic", json!({})).unwrap_err();
        assert_eq!(err, AegisError::NotStarted("EventBus".to_string()));
        assert_eq!(err.to_string(), "EventBus not started");
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut sub = bus.subscribe("test.topic");

        bus.publish("test.topic", json!({"data": "test"}))?;

        let event = timeout(WAIT, sub.recv()).await?.ok_or("no event")?;
        assert_eq!(event.topic, "test.topic");
        assert_eq!(event.payload["data"], "test");
        Ok(())
    }

    #[tokio::test]
    async fn every_subscriber_receives_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut subs: Vec<Subscription> = (0..3).map(|_| bus.subscribe("fan.out")).collect();

        assert_eq!(bus.publish("fan.out", json!(1))?, 3);

        for sub in &mut subs {
            let event = timeout(WAIT, sub.recv()).await?.ok_or("no event")?;
            assert_eq!(event.payload, json!(1));
            assert!(timeout(WAIT, sub.recv()).await.is_err(), "delivered twice");
        }
        Ok(())
    }

    #[tokio::test]
    async fn topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut a = bus.subscribe("topic.a");
        let mut b = bus.subscribe("topic.b");

        bus.publish("topic.b", json!("for b"))?;

        assert!(timeout(WAIT, a.recv()).await.is_err(), "topic.a saw a topic.b event");
        let event = timeout(WAIT, b.recv()).await?.ok_or("no event")?;
        assert_eq!(event.topic, "topic.b");
        Ok(())
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        assert_eq!(bus.publish("late", json!("early"))?, 0);

        let mut sub = bus.subscribe("late");
        bus.publish("late", json!("after"))?;

        let event = timeout(WAIT, sub.recv()).await?.ok_or("no event")?;
        assert_eq!(event.payload, json!("after"));
        Ok(())
    }

    #[tokio::test]
    async fn stop_ends_waiting_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut sub = bus.subscribe("waiting");

        let waiter = tokio::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;
        bus.stop();

        let received = timeout(Duration::from_secs(1), waiter).await??;
        assert!(received.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stop_discards_undelivered_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut sub = bus.subscribe("pending");
        bus.publish("pending", json!(1))?;
        bus.publish("pending", json!(2))?;

        bus.stop();

        assert!(timeout(WAIT, sub.recv()).await?.is_none());
        assert!(!bus.is_running());
        assert!(bus.publish("pending", json!(3)).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn restart_serves_new_subscriptions_only() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut old = bus.subscribe("cycle");
        bus.stop();
        bus.start();
        let mut new = bus.subscribe("cycle");

        assert_eq!(bus.publish("cycle", json!("second run"))?, 1);
        assert!(timeout(WAIT, old.recv()).await?.is_none());
        assert!(timeout(WAIT, new.recv()).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn subscribe_before_start_receives_after_start() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(topics::SYSTEM_START);
        bus.start();

        bus.publish(topics::SYSTEM_START, json!({}))?;
        assert!(timeout(WAIT, sub.recv()).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let keep = bus.subscribe("prune");
        let gone = bus.subscribe("prune");
        assert_eq!(bus.subscriber_count("prune"), 2);

        drop(gone);
        assert_eq!(bus.subscriber_count("prune"), 1);
        assert_eq!(bus.publish("prune", json!(null))?, 1);

        drop(keep);
        assert_eq!(bus.publish("prune", json!(null))?, 0);
        assert_eq!(bus.subscriber_count("prune"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn subscription_is_a_stream() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let sub = bus.subscribe("stream");
        for n in 0..3 {
            bus.publish("stream", json!(n))?;
        }
        bus.publish("other", json!("ignored"))?;

        let events: Vec<Event> = timeout(WAIT, sub.take(3).collect()).await?;
        let payloads: Vec<_> = events.into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
        Ok(())
    }

    #[tokio::test]
    async fn stream_terminates_on_stop() -> Result<(), Box<dyn std::error::Error>> {
        let bus = running_bus();
        let mut sub = bus.subscribe("stream.stop");
        let clone = bus.clone();
        clone.stop();
        assert!(timeout(WAIT, sub.next()).await?.is_none());
        Ok(())
    }
}
