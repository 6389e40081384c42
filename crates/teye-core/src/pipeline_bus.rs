use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use teye_types::{PipelineEvent, PipelineEventKind};

/// How many past events a newly-subscribing observer gets replayed before it
/// starts receiving live events (spec §4.6).
const RING_BUFFER_CAPACITY: usize = 256;

/// Per-subscriber bounded queue depth. A subscriber slower than this falls
/// behind and starts missing events — `Subscription::recv` surfaces that as
/// a `dropped: true` marker on the next event it does receive, rather than
/// blocking the publisher or the other subscribers (spec §4.6's
/// slowest-consumer policy: the slow one drops, nobody else pays for it).
const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

struct Topic {
    tx: broadcast::Sender<PipelineEvent>,
    ring: Arc<Mutex<VecDeque<PipelineEvent>>>,
    seq: AtomicU64,
}

impl Topic {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_QUEUE_DEPTH);
        Self {
            tx,
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(RING_BUFFER_CAPACITY))),
            seq: AtomicU64::new(0),
        }
    }
}

#[derive(Clone)]
pub struct PipelineBus {
    topics: Arc<RwLock<HashMap<String, Arc<Topic>>>>,
}

/// A live subscription to one session's topic, holding the replay snapshot
/// taken at subscribe time plus the live receiver.
pub struct Subscription {
    pub replay: Vec<PipelineEvent>,
    rx: broadcast::Receiver<PipelineEvent>,
}

impl Subscription {
    /// Awaits the next live event. A lag on the underlying channel (the
    /// subscriber fell behind by more than `SUBSCRIBER_QUEUE_DEPTH` events)
    /// is folded into the next successfully received event by setting
    /// `dropped: true`, rather than returned as an error — callers always
    /// get an event, just with a flag that some were skipped.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        let mut missed = false;
        loop {
            match self.rx.recv().await {
                Ok(mut event) => {
                    if missed {
                        event.dropped = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    missed = true;
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl PipelineBus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn topic_for(&self, session_id: &str) -> Arc<Topic> {
        if let Some(topic) = self.topics.read().await.get(session_id) {
            return topic.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Topic::new()))
            .clone()
    }

    /// Publishes a new event, assigning it the next sequence number for this
    /// session. Returns the sequence number assigned.
    pub async fn publish(&self, session_id: &str, ts_ms: u64, kind: PipelineEventKind) -> u64 {
        let topic = self.topic_for(session_id).await;
        let seq = topic.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut event = PipelineEvent::new(session_id, ts_ms, kind);
        event.seq = seq;

        let mut ring = topic.ring.lock().await;
        if ring.len() >= RING_BUFFER_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(event.clone());
        drop(ring);

        let _ = topic.tx.send(event);
        seq
    }

    /// Subscribes to a session's topic, returning the ring-buffer replay
    /// (oldest first) and a live subscription for everything published after
    /// this call.
    pub async fn subscribe(&self, session_id: &str) -> Subscription {
        let topic = self.topic_for(session_id).await;
        let rx = topic.tx.subscribe();
        let replay = topic.ring.lock().await.iter().cloned().collect();
        Subscription { replay, rx }
    }

    /// Drops a session's topic entirely, disconnecting any live
    /// subscribers. Called when a session is reclaimed.
    pub async fn close(&self, session_id: &str) {
        self.topics.write().await.remove(session_id);
    }
}

impl Default for PipelineBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replay_contains_events_published_before_subscribing() {
        let bus = PipelineBus::new();
        bus.publish(
            "s1",
            0,
            PipelineEventKind::UserInput { input: json!("hi") },
        )
        .await;
        let sub = bus.subscribe("s1").await;
        assert_eq!(sub.replay.len(), 1);
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic_per_session() {
        let bus = PipelineBus::new();
        let first = bus
            .publish("s1", 0, PipelineEventKind::UserInput { input: json!(1) })
            .await;
        let second = bus
            .publish("s1", 0, PipelineEventKind::UserInput { input: json!(2) })
            .await;
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn live_subscriber_receives_events_published_after_subscribe() {
        let bus = PipelineBus::new();
        let mut sub = bus.subscribe("s1").await;
        bus.publish(
            "s1",
            0,
            PipelineEventKind::UserInput { input: json!("hi") },
        )
        .await;
        let event = sub.recv().await.unwrap();
        assert!(!event.dropped);
    }
}
