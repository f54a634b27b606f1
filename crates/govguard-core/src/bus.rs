//! In-process publish/subscribe event bus.
//!
//! Topic-addressed, at-least-once delivery to every subscriber registered on a
//! topic at publish time. Delivery is synchronous: `publish` awaits each
//! subscriber in registration order before returning, which gives FIFO
//! ordering per topic and subscriber for publishes issued from one task. No
//! ordering is promised across topics.
//!
//! A subscriber that returns an error or panics never stops delivery to the
//! others and never reaches the publisher; the failure is counted in the
//! [`PublishReport`], handed to every [`BusObserver`] and then dropped.
//!
//! Subscribers may publish from inside `handle`; the nested publish is
//! delivered completely before the outer delivery continues.
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! let token = bus.subscribe(topics::DEPLOY_APPROVED, Arc::new(MyDeployer));
//! bus.publish(envelope).await;
//! bus.unsubscribe(&token);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;

use crate::domain::Result;
use crate::events::EventEnvelope;
use crate::metrics::METRICS;

/// Receives events for the topics it is subscribed to.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;
}

/// Why a subscriber did not accept an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberFailure {
    Error(String),
    Panic(String),
}

impl std::fmt::Display for SubscriberFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberFailure::Error(e) => write!(f, "error: {e}"),
            SubscriberFailure::Panic(msg) => write!(f, "panic: {msg}"),
        }
    }
}

/// Sees every published event and every subscriber failure.
///
/// Observers are fire-and-forget: they cannot fail a publish, and a panicking
/// observer is contained.
pub trait BusObserver: Send + Sync {
    fn on_published(&self, event: &EventEnvelope);

    fn on_subscriber_failed(
        &self,
        event: &EventEnvelope,
        subscriber: &str,
        failure: &SubscriberFailure,
    );
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    id: u64,
    topic: String,
}

impl SubscriptionToken {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Handle returned by [`EventBus::add_observer`]; pass it back to remove the
/// observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken {
    id: u64,
}

/// Delivery summary for one `publish` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

impl PublishReport {
    /// True when nobody was subscribed to the topic.
    pub fn is_unrouted(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

#[derive(Clone)]
struct Subscription {
    id: u64,
    subscriber: Arc<dyn EventSubscriber>,
}

/// Topic-addressed dispatcher. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    observers: RwLock<Vec<(u64, Arc<dyn BusObserver>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` on `topic`. Subscribers on the same topic are
    /// delivered to in registration order.
    pub fn subscribe(&self, topic: &str, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionToken {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.entry(topic.to_string())
            .or_default()
            .push(Subscription { id, subscriber });
        SubscriptionToken {
            id,
            topic: topic.to_string(),
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subs.get_mut(&token.topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != token.id);
        before != list.len()
    }

    pub fn add_observer(&self, observer: Arc<dyn BusObserver>) -> ObserverToken {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        ObserverToken { id }
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn remove_observer(&self, token: &ObserverToken) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(id, _)| *id != token.id);
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every current subscriber of its topic.
    pub async fn publish(&self, event: EventEnvelope) -> PublishReport {
        let subscribers = self.subscribers_for(&event.topic);
        let observers = self.observer_list();

        METRICS.inc_events_published();
        for observer in &observers {
            notify(|| observer.on_published(&event));
        }

        let mut report = PublishReport::default();
        for sub in subscribers {
            let outcome = AssertUnwindSafe(sub.subscriber.handle(&event))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => SubscriberFailure::Error(e.to_string()),
                Err(panic) => SubscriberFailure::Panic(panic_message(panic.as_ref())),
            };
            report.failed += 1;
            METRICS.inc_subscriber_failures();
            for observer in &observers {
                notify(|| observer.on_subscriber_failed(&event, sub.subscriber.name(), &failure));
            }
        }
        report
    }

    fn subscribers_for(&self, topic: &str) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    fn observer_list(&self) -> Vec<Arc<dyn BusObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }
}

fn notify(f: impl FnOnce()) {
    // Observer panics are swallowed; observability is never on the critical path.
    let _ = std::panic::catch_unwind(AssertUnwindSafe(f));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateId, GovError};
    use std::sync::Mutex;

    struct Collect {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventSubscriber for Collect {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.payload["n"]));
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl EventSubscriber for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            Err(GovError::PolicyConfig("boom".to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl EventSubscriber for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            panic!("subscriber exploded");
        }
    }

    #[derive(Default)]
    struct FailureLog(Mutex<Vec<(String, SubscriberFailure)>>);

    impl BusObserver for FailureLog {
        fn on_published(&self, _event: &EventEnvelope) {}

        fn on_subscriber_failed(
            &self,
            _event: &EventEnvelope,
            subscriber: &str,
            failure: &SubscriberFailure,
        ) {
            self.0
                .lock()
                .unwrap()
                .push((subscriber.to_string(), failure.clone()));
        }
    }

    fn envelope(topic: &str, n: u32) -> EventEnvelope {
        EventEnvelope::new(topic, CandidateId::from("rc"), serde_json::json!({ "n": n }))
    }

    fn collector(name: &str, seen: &Arc<Mutex<Vec<String>>>) -> Arc<dyn EventSubscriber> {
        Arc::new(Collect {
            name: name.to_string(),
            seen: seen.clone(),
        })
    }

    #[tokio::test]
    async fn delivers_in_registration_order_and_fifo() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("t", collector("a", &seen));
        bus.subscribe("t", collector("b", &seen));

        for n in 0..3 {
            bus.publish(envelope("t", n)).await;
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:0", "b:0", "a:1", "b:1", "a:2", "b:2"]
        );
    }

    #[tokio::test]
    async fn other_topics_are_not_delivered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("t", collector("a", &seen));

        let report = bus.publish(envelope("u", 1)).await;
        assert!(report.is_unrouted());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_and_panicking_subscribers_are_isolated() {
        let bus = EventBus::new();
        let log = Arc::new(FailureLog::default());
        bus.add_observer(log.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("t", Arc::new(Fails));
        bus.subscribe("t", Arc::new(Panics));
        bus.subscribe("t", collector("ok", &seen));

        let report = bus.publish(envelope("t", 7)).await;

        assert_eq!(report, PublishReport { delivered: 1, failed: 2 });
        assert_eq!(*seen.lock().unwrap(), vec!["ok:7"]);
        let failures = log.0.lock().unwrap();
        assert_eq!(failures[0].0, "fails");
        assert!(matches!(failures[0].1, SubscriberFailure::Error(_)));
        assert_eq!(
            failures[1],
            (
                "panics".to_string(),
                SubscriberFailure::Panic("subscriber exploded".to_string())
            )
        );
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = bus.subscribe("t", collector("a", &seen));
        assert_eq!(bus.subscriber_count("t"), 1);

        assert!(bus.unsubscribe(&token));
        assert!(!bus.unsubscribe(&token));
        bus.publish(envelope("t", 1)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(token.topic(), "t");
    }

    struct PanickyObserver;

    impl BusObserver for PanickyObserver {
        fn on_published(&self, _event: &EventEnvelope) {
            panic!("observer down");
        }

        fn on_subscriber_failed(&self, _: &EventEnvelope, _: &str, _: &SubscriberFailure) {}
    }

    #[tokio::test]
    async fn observer_panic_does_not_block_delivery() {
        let bus = EventBus::new();
        bus.add_observer(Arc::new(PanickyObserver));
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("t", collector("a", &seen));

        let report = bus.publish(envelope("t", 1)).await;
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn removed_observer_sees_nothing_further() {
        let bus = EventBus::new();
        let log = Arc::new(FailureLog::default());
        let token = bus.add_observer(log.clone());
        bus.add_observer(Arc::new(PanickyObserver));
        bus.subscribe("t", Arc::new(Fails));
        assert_eq!(bus.observer_count(), 2);

        bus.publish(envelope("t", 1)).await;
        assert!(bus.remove_observer(&token));
        assert!(!bus.remove_observer(&token));
        bus.publish(envelope("t", 2)).await;

        assert_eq!(bus.observer_count(), 1);
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }
}
