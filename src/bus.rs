//! Process-local topic-based message bus.
//!
//! Delivery is at-most-once, in publish order per subscriber, and
//! asynchronous: each subscription owns a channel drained by its own worker
//! task, so a slow or failing handler never blocks the publisher or its
//! sibling subscribers. There is no replay and no persistence.
//!
//! Topics are dotted strings (`reddit.crawl`, `crawler.complete`); patterns
//! may end in a wildcard segment (`crawler.*`) matching any remainder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::Result;
use crate::investigation::InvestigationId;

/// Stable topic names used across the system.
pub mod topics {
    pub const INVESTIGATION_START: &str = "investigation.start";
    pub const NEWS_CRAWL: &str = "news.crawl";
    pub const REDDIT_CRAWL: &str = "reddit.crawl";
    pub const DOCUMENT_CRAWL: &str = "document.crawl";
    pub const WEB_CRAWL: &str = "web.crawl";
    pub const CRAWLER_COMPLETE: &str = "crawler.complete";
    pub const CRAWLER_FAILED: &str = "crawler.failed";
    pub const CONTEXT_UPDATE: &str = "context.update";
    pub const CLASSIFICATION_COMPLETE: &str = "classification.complete";
    pub const VERIFICATION_FACT_VERIFIED: &str = "verification.fact_verified";
    pub const VERIFICATION_BATCH_COMPLETE: &str = "verification.batch_complete";
}

/// A message delivered to subscribers.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Value,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Correlation key carried by every well-formed payload.
    pub fn investigation_id(&self) -> Option<InvestigationId> {
        self.payload
            .get("investigation_id")
            .and_then(Value::as_str)
            .and_then(InvestigationId::parse)
    }
}

/// Async message handler. Errors are logged and isolated to the subscriber.
pub type Handler = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handle identifying a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    tx: mpsc::UnboundedSender<BusMessage>,
    worker: JoinHandle<()>,
}

/// The hub. One instance per process, injected into every component that
/// publishes or subscribes; cloning shares the same hub.
#[derive(Clone)]
pub struct MessageBus {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe a handler to a topic pattern. The handler runs on its own
    /// worker task; messages for this subscriber are processed one at a
    /// time, in publish order.
    pub fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> SubscriptionId {
        let pattern = pattern.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::unbounded_channel::<BusMessage>();

        let worker_pattern = pattern.clone();
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let topic = message.topic.clone();
                if let Err(e) = handler(message).await {
                    warn!(
                        pattern = %worker_pattern,
                        topic = %topic,
                        error = %e,
                        "bus handler failed"
                    );
                }
            }
        });

        let mut subscriptions = self.subscriptions.lock().expect("bus lock poisoned");
        subscriptions.push(Subscription {
            id,
            pattern,
            tx,
            worker,
        });
        id
    }

    /// Subscribe an async closure. Convenience wrapper over [`subscribe`].
    ///
    /// [`subscribe`]: MessageBus::subscribe
    pub fn subscribe_fn<F, Fut>(&self, pattern: impl Into<String>, f: F) -> SubscriptionId
    where
        F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |message| Box::pin(f(message)));
        self.subscribe(pattern, handler)
    }

    /// Remove a subscription. The worker drains its queue and exits.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscriptions = self.subscriptions.lock().expect("bus lock poisoned");
        subscriptions.retain(|s| s.id != id);
    }

    /// Publish a message. Never blocks on handlers; returns the number of
    /// subscribers the message was enqueued to.
    pub fn publish(&self, topic: impl Into<String>, payload: Value) -> usize {
        let message = BusMessage::new(topic, payload);
        let subscriptions = self.subscriptions.lock().expect("bus lock poisoned");
        let mut delivered = 0;
        for sub in subscriptions.iter() {
            if topic_matches(&sub.pattern, &message.topic) && sub.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop all subscriptions and stop their workers.
    pub fn teardown(&self) {
        let mut subscriptions = self.subscriptions.lock().expect("bus lock poisoned");
        for sub in subscriptions.drain(..) {
            drop(sub.tx);
            sub.worker.abort();
        }
    }
}

/// Match a dotted topic against a pattern with an optional trailing `*`
/// segment. `crawler.*` matches `crawler.complete` and `crawler.failed`;
/// `*` alone matches every topic.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == topic || pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return topic
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    #[test]
    fn pattern_matching_rules() {
        assert!(topic_matches("crawler.complete", "crawler.complete"));
        assert!(topic_matches("crawler.*", "crawler.complete"));
        assert!(topic_matches("crawler.*", "crawler.failed"));
        assert!(topic_matches("*", "anything.at.all"));
        assert!(!topic_matches("crawler.*", "crawler"));
        assert!(!topic_matches("crawler.*", "verification.fact_verified"));
        assert!(!topic_matches("crawler.complete", "crawler.failed"));
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        bus.subscribe_fn(topics::CRAWLER_COMPLETE, move |msg| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().unwrap().push(msg.payload["n"].as_u64().unwrap());
                Ok(())
            }
        });

        for n in 0..20u64 {
            bus.publish(topics::CRAWLER_COMPLETE, json!({ "n": n }));
        }

        sleep(Duration::from_millis(50)).await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        bus.teardown();
    }

    #[tokio::test]
    async fn handler_failure_does_not_affect_siblings() {
        let bus = MessageBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe_fn("classification.complete", |_msg| async {
            Err(crate::error::Error::validation("boom"))
        });
        let counter = Arc::clone(&delivered);
        bus.subscribe_fn("classification.complete", move |_msg| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let enqueued = bus.publish("classification.complete", json!({}));
        assert_eq!(enqueued, 2);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        bus.teardown();
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = MessageBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);

        let id = bus.subscribe_fn("news.crawl", move |_msg| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        bus.publish("news.crawl", json!({}));
        sleep(Duration::from_millis(30)).await;
        bus.unsubscribe(id);
        let enqueued = bus.publish("news.crawl", json!({}));

        assert_eq!(enqueued, 0);
        sleep(Duration::from_millis(30)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn correlation_key_is_extracted() {
        let inv = InvestigationId::new();
        let msg = BusMessage::new(
            topics::CRAWLER_FAILED,
            json!({ "investigation_id": inv.to_string(), "source": "news" }),
        );
        assert_eq!(msg.investigation_id(), Some(inv));
    }
}
