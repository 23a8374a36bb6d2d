//! Per-session stream fan-out (spec.md §4.8).
//!
//! Grounded in the teacher's session actor
//! (`examples/benediktms-chesstty/server/src/session/actor.rs`), which wires
//! subscribers through `tokio::sync::mpsc` channels, and in
//! `examples/original_source/backend/app/realtime.py`'s
//! `SessionStreamManager.broadcast`, which snapshots the subscriber set,
//! sends to each, and prunes any sink that failed. Persist-before-broadcast
//! ordering is enforced by the caller: `StreamHub::broadcast` is only ever
//! invoked after the session repository write completes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 64;
const PER_SINK_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    EngineMove(serde_json::Value),
    PlayerMove(serde_json::Value),
    GameOver(serde_json::Value),
    CoachUpdate(serde_json::Value),
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("session not found")]
    SessionNotFound,
}

struct SessionChannel {
    subscribers: HashMap<Uuid, mpsc::Sender<StreamEvent>>,
}

/// Owns one subscriber map per known session. Sessions must be registered
/// (via `open_session`) before `subscribe` will accept a sink, matching the
/// spec's "reject if session not found".
#[derive(Default)]
pub struct StreamHub {
    sessions: Mutex<HashMap<String, SessionChannel>>,
}

pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<StreamEvent>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    pub fn open_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.entry(session_id.to_string()).or_insert_with(|| SessionChannel { subscribers: HashMap::new() });
    }

    pub fn close_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(session_id);
    }

    pub fn subscribe(&self, session_id: &str) -> Result<Subscription, StreamError> {
        let mut sessions = self.sessions.lock().unwrap();
        let channel = sessions.get_mut(session_id).ok_or(StreamError::SessionNotFound)?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        channel.subscribers.insert(id, tx);
        Ok(Subscription { id, receiver: rx })
    }

    pub fn unsubscribe(&self, session_id: &str, subscriber_id: Uuid) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(channel) = sessions.get_mut(session_id) {
            channel.subscribers.remove(&subscriber_id);
        }
    }

    /// Snapshots the subscriber set, sends to each independently with a
    /// per-sink timeout, and prunes any sink that failed or timed out.
    pub async fn broadcast(&self, session_id: &str, event: StreamEvent) {
        let snapshot: Vec<(Uuid, mpsc::Sender<StreamEvent>)> = {
            let sessions = self.sessions.lock().unwrap();
            match sessions.get(session_id) {
                Some(channel) => channel.subscribers.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            let send = tx.send(event.clone());
            match tokio::time::timeout(PER_SINK_SEND_TIMEOUT, send).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => dead.push(id),
            }
        }

        if dead.is_empty() {
            return;
        }
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(channel) = sessions.get_mut(session_id) {
            for id in dead {
                channel.subscribers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_rejects_unknown_session() {
        let hub = StreamHub::new();
        assert!(matches!(hub.subscribe("missing"), Err(StreamError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_all_subscribers() {
        let hub = StreamHub::new();
        hub.open_session("s1");
        let mut sub_a = hub.subscribe("s1").unwrap();
        let mut sub_b = hub.subscribe("s1").unwrap();

        hub.broadcast("s1", StreamEvent::EngineMove(serde_json::json!({"uci": "e2e4"}))).await;

        assert!(sub_a.receiver.recv().await.is_some());
        assert!(sub_b.receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dropped_subscriber() {
        let hub = StreamHub::new();
        hub.open_session("s1");
        let sub = hub.subscribe("s1").unwrap();
        drop(sub.receiver);

        hub.broadcast("s1", StreamEvent::GameOver(serde_json::json!({}))).await;

        let sessions = hub.sessions.lock().unwrap();
        assert!(sessions.get("s1").unwrap().subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_sink() {
        let hub = StreamHub::new();
        hub.open_session("s1");
        let sub = hub.subscribe("s1").unwrap();
        hub.unsubscribe("s1", sub.id);

        let sessions = hub.sessions.lock().unwrap();
        assert!(sessions.get("s1").unwrap().subscribers.is_empty());
    }
}
