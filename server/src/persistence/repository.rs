//! Repository trait for session records.
//!
//! Mirrors the teacher's `impl Future<Output = ...> + Send` trait style
//! (`examples/benediktms-chesstty/server/src/persistence/traits.rs`) rather
//! than `#[async_trait]`, since both implementations here are resolved
//! statically (no `dyn SessionRepository` is ever constructed).

use std::future::Future;

use crate::domain::{EventRecord, SessionRecord, UserStats};
use crate::error::PersistenceError;

pub trait SessionRepository: Send + Sync {
    fn create_session(&self, record: &SessionRecord) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn get_session(&self, session_id: &str) -> impl Future<Output = Result<Option<SessionRecord>, PersistenceError>> + Send;
    /// Upserts the full record, including its move log and opponent profile.
    fn save_session(&self, record: &SessionRecord) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn log_event(
        &self,
        session_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// All events logged for `session_id`, oldest first.
    fn get_events(&self, session_id: &str) -> impl Future<Output = Result<Vec<EventRecord>, PersistenceError>> + Send;
    /// Aggregates every completed, non-multiplayer session recorded for
    /// `player_id` into win/loss/draw counts and the player's latest rating.
    fn get_user_stats(&self, player_id: &str) -> impl Future<Output = Result<UserStats, PersistenceError>> + Send;
}
