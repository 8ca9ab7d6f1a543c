//! In-process event bus
//!
//! Synchronous pub/sub over [`ForgeEvent`]. Handlers run on the emitting
//! thread, in registration order, after the subscription lock has been
//! released. A panicking handler is caught and logged; it never reaches
//! sibling handlers or the emitter.

use forge_domain::{ForgeEvent, Topic};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, trace};

/// Callback invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&ForgeEvent) + Send + Sync>;

/// Handle returned by the subscribe methods, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every topic
    topic: Option<Topic>,
    once: bool,
    handler: EventHandler,
}

impl Subscription {
    fn matches(&self, topic: Topic) -> bool {
        self.topic.is_none_or(|t| t == topic)
    }
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&ForgeEvent) + Send + Sync + 'static,
    {
        self.add(Some(topic), false, Arc::new(handler))
    }

    /// Subscribe to a topic for a single delivery.
    pub fn once<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&ForgeEvent) + Send + Sync + 'static,
    {
        self.add(Some(topic), true, Arc::new(handler))
    }

    /// Subscribe to every topic.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ForgeEvent) + Send + Sync + 'static,
    {
        self.add(None, false, Arc::new(handler))
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn emit(&self, event: ForgeEvent) {
        let topic = event.topic();
        let handlers: Vec<EventHandler> = {
            let mut subs = self.lock();
            let handlers = subs
                .iter()
                .filter(|s| s.matches(topic))
                .map(|s| Arc::clone(&s.handler))
                .collect();
            subs.retain(|s| !(s.once && s.matches(topic)));
            handlers
        };

        trace!(topic = %topic, subscribers = handlers.len(), "Emitting event");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(topic = %topic, "Event handler panicked");
            }
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().iter().filter(|s| s.matches(topic)).count()
    }

    fn add(&self, topic: Option<Topic>, once: bool, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            topic,
            once,
            handler,
        });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_domain::AgentId;

    fn deregistered(id: &str) -> ForgeEvent {
        ForgeEvent::AgentDeregistered {
            agent_id: AgentId::new(id),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |name: &str| -> EventHandler {
                let log = Arc::clone(&log);
                let name = name.to_string();
                Arc::new(move |_: &ForgeEvent| log.lock().unwrap().push(name.clone()))
            }
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        let first = make("first");
        let second = make("second");
        let third = make("third");
        bus.subscribe(Topic::AgentDeregistered, move |e| first(e));
        bus.subscribe_all(move |e| second(e));
        bus.subscribe(Topic::AgentDeregistered, move |e| third(e));

        bus.emit(deregistered("a"));

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_other_topics_are_not_delivered() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let handler = make("registered");
        bus.subscribe(Topic::AgentRegistered, move |e| handler(e));

        bus.emit(deregistered("a"));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let handler = make("once");
        bus.once(Topic::AgentDeregistered, move |e| handler(e));

        bus.emit(deregistered("a"));
        bus.emit(deregistered("b"));

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(bus.subscriber_count(Topic::AgentDeregistered), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let handler = make("gone");
        let id = bus.subscribe(Topic::AgentDeregistered, move |e| handler(e));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(deregistered("a"));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_handler_does_not_stop_siblings() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let after = make("after");

        bus.subscribe(Topic::AgentDeregistered, |_| panic!("handler bug"));
        bus.subscribe(Topic::AgentDeregistered, move |e| after(e));

        bus.emit(deregistered("a"));

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_handler_may_emit_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let (log, make) = recorder();
        let inner = make("inner");
        bus.subscribe(Topic::AgentRegistered, move |e| inner(e));

        let weak = Arc::downgrade(&bus);
        bus.subscribe(Topic::AgentDeregistered, move |_| {
            if let Some(bus) = weak.upgrade() {
                bus.emit(ForgeEvent::AgentRegistered {
                    agent_id: AgentId::new("b"),
                    kind: forge_domain::AgentKind::Model,
                });
            }
        });

        bus.emit(deregistered("a"));

        assert_eq!(*log.lock().unwrap(), vec!["inner"]);
    }
}
