//! Bucketed matchmaking queue (spec.md §4.5): dual-backed (in-memory or a
//! remote key/value store), atomic pair-and-pop, at-most-once match
//! notifications.
//!
//! Grounded in `examples/original_source/backend/app/api/multiplayer.py`'s
//! `_bucket`/`_pop_match`/`_assign_colors`/queue_status flow, carried over
//! to a `QueueBackend` trait so the in-memory and Redis implementations
//! share one pairing algorithm.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use rand::Rng;

use crate::domain::{
    now_ms, MatchNotification, PreferredColor, QueueEntry, Side, TimeControl, MATCH_NOTIFICATION_TTL_SECS,
    QUEUE_ENTRY_TTL_SECS,
};

#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[async_trait::async_trait]
pub trait QueueBackend: Send + Sync {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), MatchmakingError>;
    /// Atomically finds and removes the first compatible waiting entry in
    /// `bucket` other than `requester_id`, or `None` if none are waiting.
    async fn pop_match(&self, bucket: &str, requester_id: &str, preferred: PreferredColor)
        -> Result<Option<QueueEntry>, MatchmakingError>;
    async fn dequeue(&self, player_id: &str) -> Result<(), MatchmakingError>;
    async fn put_notification(&self, player_id: &str, notification: MatchNotification) -> Result<(), MatchmakingError>;
    /// Atomic get-and-delete: at-most-once delivery.
    async fn take_notification(&self, player_id: &str) -> Result<Option<MatchNotification>, MatchmakingError>;
    async fn is_queued(&self, player_id: &str) -> Result<bool, MatchmakingError>;
}

#[derive(Default)]
struct InMemoryState {
    buckets: HashMap<String, VecDeque<String>>,
    entries: HashMap<String, QueueEntry>,
    notifications: HashMap<String, MatchNotification>,
}

pub struct InMemoryQueueBackend {
    state: Mutex<InMemoryState>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self { state: Mutex::new(InMemoryState::default()) }
    }
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), MatchmakingError> {
        let mut state = self.state.lock().unwrap();
        state.buckets.entry(entry.bucket.clone()).or_default().push_back(entry.player_id.clone());
        state.entries.insert(entry.player_id.clone(), entry);
        Ok(())
    }

    async fn pop_match(
        &self,
        bucket: &str,
        requester_id: &str,
        preferred: PreferredColor,
    ) -> Result<Option<QueueEntry>, MatchmakingError> {
        let mut state = self.state.lock().unwrap();
        let Some(list) = state.buckets.get_mut(bucket) else { return Ok(None) };
        let mut found_at = None;
        for (idx, candidate_id) in list.iter().enumerate() {
            if candidate_id == requester_id {
                continue;
            }
            let Some(candidate) = state.entries.get(candidate_id) else { continue };
            if preferred.complementary(candidate.preferred_color) {
                found_at = Some(idx);
                break;
            }
        }
        let Some(idx) = found_at else { return Ok(None) };
        let candidate_id = list.remove(idx).unwrap();
        let entry = state.entries.remove(&candidate_id);
        Ok(entry)
    }

    async fn dequeue(&self, player_id: &str) -> Result<(), MatchmakingError> {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.remove(player_id) {
            if let Some(list) = state.buckets.get_mut(&entry.bucket) {
                list.retain(|id| id != player_id);
            }
        }
        state.notifications.remove(player_id);
        Ok(())
    }

    async fn put_notification(&self, player_id: &str, notification: MatchNotification) -> Result<(), MatchmakingError> {
        let mut state = self.state.lock().unwrap();
        state.notifications.insert(player_id.to_string(), notification);
        Ok(())
    }

    async fn take_notification(&self, player_id: &str) -> Result<Option<MatchNotification>, MatchmakingError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.notifications.remove(player_id))
    }

    async fn is_queued(&self, player_id: &str) -> Result<bool, MatchmakingError> {
        let state = self.state.lock().unwrap();
        Ok(state.entries.contains_key(player_id))
    }
}

/// Redis-backed implementation for multi-process deployments: bucket lists
/// (`mm:bucket:{bucket}`), per-player hashes (`mm:queue:{player_id}`), and
/// per-player match notifications (`mm:matched:{player_id}`), all with the
/// TTLs from `domain::QUEUE_ENTRY_TTL_SECS`/`MATCH_NOTIFICATION_TTL_SECS`.
pub struct RedisQueueBackend {
    client: redis::Client,
}

impl RedisQueueBackend {
    pub fn new(redis_url: &str) -> Result<Self, MatchmakingError> {
        let client = redis::Client::open(redis_url).map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, MatchmakingError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))
    }

    fn bucket_key(bucket: &str) -> String {
        format!("mm:bucket:{bucket}")
    }

    fn entry_key(player_id: &str) -> String {
        format!("mm:queue:{player_id}")
    }

    fn match_key(player_id: &str) -> String {
        format!("mm:matched:{player_id}")
    }
}

#[async_trait::async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), MatchmakingError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&entry).map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        let entry_key = Self::entry_key(&entry.player_id);
        let () = conn
            .set_ex(&entry_key, payload, QUEUE_ENTRY_TTL_SECS as u64)
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        let () = conn
            .rpush(Self::bucket_key(&entry.bucket), &entry.player_id)
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pop_match(
        &self,
        bucket: &str,
        requester_id: &str,
        preferred: PreferredColor,
    ) -> Result<Option<QueueEntry>, MatchmakingError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let candidates: Vec<String> = conn
            .lrange(Self::bucket_key(bucket), 0, -1)
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;

        for candidate_id in candidates {
            if candidate_id == requester_id {
                continue;
            }
            let raw: Option<String> = conn
                .get(Self::entry_key(&candidate_id))
                .await
                .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
            let Some(raw) = raw else { continue };
            let Ok(entry) = serde_json::from_str::<QueueEntry>(&raw) else { continue };
            if !preferred.complementary(entry.preferred_color) {
                continue;
            }
            let _: () = conn
                .lrem(Self::bucket_key(bucket), 0, &candidate_id)
                .await
                .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
            let _: () = conn
                .del(Self::entry_key(&candidate_id))
                .await
                .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
            return Ok(Some(entry));
        }
        Ok(None)
    }

    async fn dequeue(&self, player_id: &str) -> Result<(), MatchmakingError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(Self::entry_key(player_id))
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        if let Some(raw) = raw {
            if let Ok(entry) = serde_json::from_str::<QueueEntry>(&raw) {
                let _: () = conn
                    .lrem(Self::bucket_key(&entry.bucket), 0, player_id)
                    .await
                    .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
            }
        }
        let _: () = conn
            .del(Self::entry_key(player_id))
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        let _: () = conn
            .del(Self::match_key(player_id))
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn put_notification(&self, player_id: &str, notification: MatchNotification) -> Result<(), MatchmakingError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let payload =
            serde_json::to_string(&notification).map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        let () = conn
            .set_ex(Self::match_key(player_id), payload, MATCH_NOTIFICATION_TTL_SECS as u64)
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn take_notification(&self, player_id: &str) -> Result<Option<MatchNotification>, MatchmakingError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(Self::match_key(player_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        Ok(raw.and_then(|r| serde_json::from_str(&r).ok()))
    }

    async fn is_queued(&self, player_id: &str) -> Result<bool, MatchmakingError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let exists: bool = conn
            .exists(Self::entry_key(player_id))
            .await
            .map_err(|e| MatchmakingError::BackendUnavailable(e.to_string()))?;
        Ok(exists)
    }
}

pub struct Matchmaker {
    backend: Box<dyn QueueBackend>,
}

pub enum JoinResult {
    Matched { opponent_id: String, player_color: Side, time_control: TimeControl },
    Queued,
}

pub enum StatusResult {
    Matched(MatchNotification),
    Queued,
    None,
}

impl Matchmaker {
    pub fn new(backend: Box<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    pub async fn join(
        &self,
        player_id: &str,
        time_control: TimeControl,
        preferred_color: PreferredColor,
    ) -> Result<JoinResult, MatchmakingError> {
        let bucket = time_control.bucket();
        if let Some(opponent) = self.backend.pop_match(&bucket, player_id, preferred_color).await? {
            let player_color = assign_requester_color(preferred_color, opponent.preferred_color);
            let opponent_color = player_color.opposite();

            self.backend
                .put_notification(
                    &opponent.player_id,
                    MatchNotification {
                        session_id: String::new(),
                        player_color: opponent_color,
                        opponent_id: player_id.to_string(),
                    },
                )
                .await?;

            return Ok(JoinResult::Matched {
                opponent_id: opponent.player_id,
                player_color,
                time_control: opponent.time_control,
            });
        }

        self.backend
            .enqueue(QueueEntry {
                player_id: player_id.to_string(),
                bucket,
                preferred_color,
                time_control,
                enqueued_at: now_ms(),
            })
            .await?;
        Ok(JoinResult::Queued)
    }

    pub async fn leave(&self, player_id: &str) -> Result<(), MatchmakingError> {
        self.backend.dequeue(player_id).await
    }

    pub async fn status(&self, player_id: &str) -> Result<StatusResult, MatchmakingError> {
        if let Some(notification) = self.backend.take_notification(player_id).await? {
            return Ok(StatusResult::Matched(notification));
        }
        if self.backend.is_queued(player_id).await? {
            return Ok(StatusResult::Queued);
        }
        Ok(StatusResult::None)
    }

    /// Stamps the session id into both players' notifications once the
    /// multiplayer session has actually been created.
    pub async fn attach_session(&self, player_id: &str, session_id: &str, player_color: Side) -> Result<(), MatchmakingError> {
        self.backend
            .put_notification(
                player_id,
                MatchNotification { session_id: session_id.to_string(), player_color, opponent_id: String::new() },
            )
            .await
    }
}

/// Deterministic color assignment from the requester's point of view (§4.5
/// step 3): an explicit preference on either side wins; otherwise a coin flip.
fn assign_requester_color(requester_pref: PreferredColor, opponent_pref: PreferredColor) -> Side {
    if requester_pref == PreferredColor::White || opponent_pref == PreferredColor::Black {
        Side::White
    } else if requester_pref == PreferredColor::Black || opponent_pref == PreferredColor::White {
        Side::Black
    } else if rand::thread_rng().gen_bool(0.5) {
        Side::White
    } else {
        Side::Black
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc() -> TimeControl {
        TimeControl { initial_ms: 600_000, increment_ms: 0 }
    }

    #[tokio::test]
    async fn test_second_joiner_is_matched_against_first() {
        let mm = Matchmaker::new(Box::new(InMemoryQueueBackend::new()));
        let first = mm.join("alice", tc(), PreferredColor::Auto).await.unwrap();
        assert!(matches!(first, JoinResult::Queued));

        let second = mm.join("bob", tc(), PreferredColor::Auto).await.unwrap();
        match second {
            JoinResult::Matched { opponent_id, .. } => assert_eq!(opponent_id, "alice"),
            JoinResult::Queued => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn test_incompatible_colors_stay_queued() {
        let mm = Matchmaker::new(Box::new(InMemoryQueueBackend::new()));
        mm.join("alice", tc(), PreferredColor::White).await.unwrap();
        let second = mm.join("bob", tc(), PreferredColor::White).await.unwrap();
        assert!(matches!(second, JoinResult::Queued));
    }

    #[tokio::test]
    async fn test_opponent_gets_notification_on_status_poll() {
        let mm = Matchmaker::new(Box::new(InMemoryQueueBackend::new()));
        mm.join("alice", tc(), PreferredColor::Auto).await.unwrap();
        mm.join("bob", tc(), PreferredColor::Auto).await.unwrap();

        let status = mm.status("alice").await.unwrap();
        assert!(matches!(status, StatusResult::Matched(_)));
        let status_again = mm.status("alice").await.unwrap();
        assert!(matches!(status_again, StatusResult::None));
    }

    #[tokio::test]
    async fn test_leave_queue_clears_entry_and_bucket() {
        let mm = Matchmaker::new(Box::new(InMemoryQueueBackend::new()));
        mm.join("alice", tc(), PreferredColor::Auto).await.unwrap();
        mm.leave("alice").await.unwrap();
        let status = mm.status("alice").await.unwrap();
        assert!(matches!(status, StatusResult::None));

        let joined = mm.join("bob", tc(), PreferredColor::Auto).await.unwrap();
        assert!(matches!(joined, JoinResult::Queued));
    }
}
