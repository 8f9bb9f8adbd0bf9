//! trc-hub
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Per-run publish/subscribe for stream events.
//!
//! Emitters post into bounded per-subscriber buffers with a non-blocking
//! send. A subscriber that falls behind is detached rather than ever blocking
//! the emitter; a disconnected subscriber is cleaned up on the next emit.
//! New subscribers receive no history — the ledger is the replay source.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::warn;
use trc_core::StreamEvent;
use uuid::Uuid;

/// Buffered events per subscriber before it is considered too slow.
const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<StreamEvent>,
}

/// A live subscription to one run's events.
pub struct Subscription {
    /// Subscriber identity, used by [`RunEventHub::detach`].
    pub id: Uuid,
    /// Receiving end of the event buffer.
    pub rx: mpsc::Receiver<StreamEvent>,
    run_id: Uuid,
}

impl Subscription {
    /// The run this subscription watches.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

/// The hub. Clone freely; topics are shared.
#[derive(Clone, Default)]
pub struct RunEventHub {
    topics: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl RunEventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new subscriber to a run.
    pub async fn attach(&self, run_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.topics
            .write()
            .await
            .entry(run_id)
            .or_default()
            .push(Subscriber { id, tx });
        Subscription { id, rx, run_id }
    }

    /// Detach a subscriber. Dropping the [`Subscription`] has the same
    /// effect on the next emit.
    pub async fn detach(&self, run_id: Uuid, subscriber_id: Uuid) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(&run_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                topics.remove(&run_id);
            }
        }
    }

    /// Deliver an event to every current subscriber of its run, in emission
    /// order. Never blocks: a full or closed subscriber is detached.
    pub async fn emit(&self, event: StreamEvent) {
        let run_id = event.run_id();
        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(&run_id) else {
            return;
        };
        subscribers.retain(|subscriber| match subscriber.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%run_id, subscriber = %subscriber.id, "subscriber too slow; detaching");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            topics.remove(&run_id);
        }
    }

    /// Number of live subscribers for a run. Exposed for tests.
    pub async fn subscriber_count(&self, run_id: Uuid) -> usize {
        self.topics
            .read()
            .await
            .get(&run_id)
            .map_or(0, |subs| subs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anomaly(run_id: Uuid, reason: &str) -> StreamEvent {
        StreamEvent::Anomaly {
            run_id,
            reason: reason.into(),
            action: "paused".into(),
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let hub = RunEventHub::new();
        let run_id = Uuid::new_v4();
        let mut sub = hub.attach(run_id).await;

        for i in 0..5 {
            hub.emit(anomaly(run_id, &format!("r{i}"))).await;
        }
        for i in 0..5 {
            match sub.rx.recv().await.unwrap() {
                StreamEvent::Anomaly { reason, .. } => assert_eq!(reason, format!("r{i}")),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn no_history_for_new_subscribers() {
        let hub = RunEventHub::new();
        let run_id = Uuid::new_v4();
        hub.emit(anomaly(run_id, "before")).await;

        let mut sub = hub.attach(run_id).await;
        hub.emit(anomaly(run_id, "after")).await;

        match sub.rx.recv().await.unwrap() {
            StreamEvent::Anomaly { reason, .. } => assert_eq!(reason, "after"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_are_isolated_per_run() {
        let hub = RunEventHub::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        let mut sub_a = hub.attach(run_a).await;
        let _sub_b = hub.attach(run_b).await;

        hub.emit(anomaly(run_b, "other run")).await;
        hub.emit(anomaly(run_a, "mine")).await;

        match sub_a.rx.recv().await.unwrap() {
            StreamEvent::Anomaly { reason, .. } => assert_eq!(reason, "mine"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_emitters() {
        let hub = RunEventHub::new();
        let run_id = Uuid::new_v4();
        let sub = hub.attach(run_id).await;
        drop(sub);

        hub.emit(anomaly(run_id, "nobody listening")).await;
        assert_eq!(hub.subscriber_count(run_id).await, 0);
    }

    #[tokio::test]
    async fn slow_subscriber_is_detached_on_overflow() {
        let hub = RunEventHub::new();
        let run_id = Uuid::new_v4();
        // Never read from this subscription.
        let _sub = hub.attach(run_id).await;

        for i in 0..(SUBSCRIBER_BUFFER + 1) {
            hub.emit(anomaly(run_id, &format!("r{i}"))).await;
        }
        assert_eq!(hub.subscriber_count(run_id).await, 0);
    }

    #[tokio::test]
    async fn detach_removes_only_the_named_subscriber() {
        let hub = RunEventHub::new();
        let run_id = Uuid::new_v4();
        let sub_a = hub.attach(run_id).await;
        let mut sub_b = hub.attach(run_id).await;

        hub.detach(run_id, sub_a.id).await;
        assert_eq!(hub.subscriber_count(run_id).await, 1);

        hub.emit(anomaly(run_id, "still flowing")).await;
        assert!(sub_b.rx.recv().await.is_some());
    }
}
