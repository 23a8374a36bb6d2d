//! SQLite-backed `SessionRepository`.
//!
//! Follows the teacher's flat-column query pattern
//! (`examples/benediktms-chesstty/server/src/persistence/sqlite/session_repo.rs`)
//! generalized across the normalized `sessions`/`move_log`/`opponent_profiles`
//! tables in `migrations/0001_init.sql`. A session is always written whole:
//! `move_log` rows are deleted and reinserted on every save rather than
//! diffed, which keeps the write path simple at the cost of rewriting
//! already-persisted plies on every move.

use sqlx::SqlitePool;

use crate::domain::{
    Clocks, Difficulty, EventRecord, ExploitMode, OpponentProfile, PlyAnnotation, PlySide, ResultKind,
    SessionRecord, SessionStatus, Side, UserStats, Verdict, Winner,
};
use crate::error::PersistenceError;
use crate::persistence::repository::SessionRepository;

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(|e| PersistenceError::Backend(e.to_string()))?;

        sqlx::query(
            "INSERT INTO sessions (
                session_id, player_color, engine_color, exploit_mode, difficulty,
                engine_depth, engine_rating, status, result, winner, fen, initial_fen,
                player_clock_ms, engine_clock_ms, player_id, player_rating, player_rating_delta,
                is_multiplayer, player_white_id, player_black_id, last_eval_cp, rating_applied,
                created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(session_id) DO UPDATE SET
                player_color = excluded.player_color,
                engine_color = excluded.engine_color,
                exploit_mode = excluded.exploit_mode,
                difficulty = excluded.difficulty,
                engine_depth = excluded.engine_depth,
                engine_rating = excluded.engine_rating,
                status = excluded.status,
                result = excluded.result,
                winner = excluded.winner,
                fen = excluded.fen,
                initial_fen = excluded.initial_fen,
                player_clock_ms = excluded.player_clock_ms,
                engine_clock_ms = excluded.engine_clock_ms,
                player_id = excluded.player_id,
                player_rating = excluded.player_rating,
                player_rating_delta = excluded.player_rating_delta,
                is_multiplayer = excluded.is_multiplayer,
                player_white_id = excluded.player_white_id,
                player_black_id = excluded.player_black_id,
                last_eval_cp = excluded.last_eval_cp,
                rating_applied = excluded.rating_applied,
                updated_at = excluded.updated_at",
        )
        .bind(&record.session_id)
        .bind(record.player_color.as_str())
        .bind(record.engine_color.as_str())
        .bind(record.exploit_mode.as_str())
        .bind(record.difficulty.as_str())
        .bind(record.engine_depth as i64)
        .bind(record.engine_rating as i64)
        .bind(record.status.as_str())
        .bind(record.result.map(|r| r.as_str()))
        .bind(record.winner.map(|w| w.as_str()))
        .bind(&record.fen)
        .bind(&record.initial_fen)
        .bind(record.clocks.player_ms)
        .bind(record.clocks.engine_ms)
        .bind(&record.player_id)
        .bind(record.player_rating)
        .bind(record.player_rating_delta)
        .bind(record.is_multiplayer)
        .bind(&record.player_white_id)
        .bind(&record.player_black_id)
        .bind(record.last_eval_cp)
        .bind(record.rating_applied)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        sqlx::query("DELETE FROM move_log WHERE session_id = ?")
            .bind(&record.session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        for ply in &record.move_log {
            let themes_json = serde_json::to_string(&ply.themes)
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
            sqlx::query(
                "INSERT INTO move_log (
                    session_id, ply, side, uci, san, eval_cp, delta_cp, verdict,
                    commentary, themes, timestamp_ms
                ) VALUES (?,?,?,?,?,?,?,?,?,?,?)",
            )
            .bind(&record.session_id)
            .bind(ply.ply as i64)
            .bind(ply.side.as_str())
            .bind(&ply.uci)
            .bind(&ply.san)
            .bind(ply.eval_cp)
            .bind(ply.delta_cp)
            .bind(ply.verdict.as_str())
            .bind(&ply.commentary)
            .bind(themes_json)
            .bind(ply.timestamp_ms)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        }

        let style_json = serde_json::to_string(&record.opponent_profile.style)
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        let motif_json = serde_json::to_string(&record.opponent_profile.motif_risk)
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO opponent_profiles (session_id, style, motif_risk) VALUES (?,?,?)
             ON CONFLICT(session_id) DO UPDATE SET style = excluded.style, motif_risk = excluded.motif_risk",
        )
        .bind(&record.session_id)
        .bind(style_json)
        .bind(motif_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        tx.commit().await.map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }
}

type SessionRow = (
    String, String, String, String, String, i64, i64, String, Option<String>, Option<String>,
    String, String, i64, i64, Option<String>, Option<i32>, Option<i32>, bool, Option<String>,
    Option<String>, i32, bool, i64, i64,
);

type MoveRow = (i64, String, String, String, i32, i32, String, String, String, i64);

impl SessionRepository for SqliteSessionRepository {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        self.upsert(record).await
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        self.upsert(record).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, PersistenceError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT session_id, player_color, engine_color, exploit_mode, difficulty,
                    engine_depth, engine_rating, status, result, winner, fen, initial_fen,
                    player_clock_ms, engine_clock_ms, player_id, player_rating, player_rating_delta,
                    is_multiplayer, player_white_id, player_black_id, last_eval_cp, rating_applied,
                    created_at, updated_at
             FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let move_rows: Vec<MoveRow> = sqlx::query_as(
            "SELECT ply, side, uci, san, eval_cp, delta_cp, verdict, commentary, themes, timestamp_ms
             FROM move_log WHERE session_id = ? ORDER BY ply ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let move_log = move_rows
            .into_iter()
            .map(|r| -> Result<PlyAnnotation, PersistenceError> {
                let themes = serde_json::from_str(&r.8).map_err(|e| PersistenceError::Backend(e.to_string()))?;
                Ok(PlyAnnotation {
                    ply: r.0 as u32,
                    side: PlySide::parse(&r.1).ok_or_else(|| PersistenceError::Backend(format!("bad ply side: {}", r.1)))?,
                    uci: r.2,
                    san: r.3,
                    eval_cp: r.4,
                    delta_cp: r.5,
                    verdict: Verdict::parse(&r.6).ok_or_else(|| PersistenceError::Backend(format!("bad verdict: {}", r.6)))?,
                    commentary: r.7,
                    themes,
                    timestamp_ms: r.9,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let profile_row: Option<(String, String)> =
            sqlx::query_as("SELECT style, motif_risk FROM opponent_profiles WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        let opponent_profile = match profile_row {
            Some((style, motif_risk)) => OpponentProfile {
                style: serde_json::from_str(&style).map_err(|e| PersistenceError::Backend(e.to_string()))?,
                motif_risk: serde_json::from_str(&motif_risk).map_err(|e| PersistenceError::Backend(e.to_string()))?,
            },
            None => OpponentProfile::default(),
        };

        Ok(Some(SessionRecord {
            session_id: row.0,
            player_color: Side::parse(&row.1).ok_or_else(|| PersistenceError::Backend(format!("bad side: {}", row.1)))?,
            engine_color: Side::parse(&row.2).ok_or_else(|| PersistenceError::Backend(format!("bad side: {}", row.2)))?,
            exploit_mode: ExploitMode::parse(&row.3).ok_or_else(|| PersistenceError::Backend(format!("bad exploit mode: {}", row.3)))?,
            difficulty: Difficulty::parse(&row.4).ok_or_else(|| PersistenceError::Backend(format!("bad difficulty: {}", row.4)))?,
            engine_depth: row.5 as u8,
            engine_rating: row.6 as u16,
            status: SessionStatus::parse(&row.7).ok_or_else(|| PersistenceError::Backend(format!("bad status: {}", row.7)))?,
            result: row.8.as_deref().and_then(ResultKind::parse),
            winner: row.9.as_deref().and_then(Winner::parse),
            fen: row.10,
            initial_fen: row.11,
            clocks: Clocks { player_ms: row.12, engine_ms: row.13 },
            move_log,
            opponent_profile,
            player_id: row.14,
            player_rating: row.15,
            player_rating_delta: row.16,
            is_multiplayer: row.17,
            player_white_id: row.18,
            player_black_id: row.19,
            last_eval_cp: row.20,
            rating_applied: row.21,
            created_at: row.22,
            updated_at: row.23,
        }))
    }

    async fn log_event(
        &self,
        session_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(payload).map_err(|e| PersistenceError::Backend(e.to_string()))?;
        sqlx::query("INSERT INTO engine_events (session_id, event_type, payload, created_at) VALUES (?,?,?,?)")
            .bind(session_id)
            .bind(event_type)
            .bind(payload_json)
            .bind(crate::domain::now_ms())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_events(&self, session_id: &str) -> Result<Vec<EventRecord>, PersistenceError> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT id, event_type, payload, created_at FROM engine_events
             WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|(id, event_type, payload, created_at)| {
                let payload = serde_json::from_str(&payload).map_err(|e| PersistenceError::Backend(e.to_string()))?;
                Ok(EventRecord { id, event_type, payload, created_at })
            })
            .collect()
    }

    async fn get_user_stats(&self, player_id: &str) -> Result<UserStats, PersistenceError> {
        let rows: Vec<(Option<String>, Option<i32>)> = sqlx::query_as(
            "SELECT winner, player_rating FROM sessions
             WHERE player_id = ? AND is_multiplayer = 0 AND status = 'completed'
             ORDER BY updated_at ASC",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let mut stats = UserStats::default();
        for (winner, rating) in rows {
            stats.games_played += 1;
            match winner.as_deref().and_then(Winner::parse) {
                Some(Winner::Player) => stats.wins += 1,
                Some(Winner::Draw) => stats.draws += 1,
                _ => stats.losses += 1,
            }
            if rating.is_some() {
                stats.current_rating = rating;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{now_ms, ExploitMode, Side};
    use crate::persistence::database::Database;

    fn sample_record(id: &str) -> SessionRecord {
        SessionRecord {
            session_id: id.to_string(),
            player_color: Side::White,
            engine_color: Side::Black,
            exploit_mode: ExploitMode::Auto,
            difficulty: Difficulty::Intermediate,
            engine_depth: 12,
            engine_rating: 1600,
            status: SessionStatus::Active,
            result: None,
            winner: None,
            fen: "startpos".to_string(),
            initial_fen: "startpos".to_string(),
            clocks: Clocks { player_ms: 600_000, engine_ms: 600_000 },
            move_log: vec![],
            opponent_profile: OpponentProfile::default(),
            player_id: Some("p1".to_string()),
            player_rating: Some(1500),
            player_rating_delta: None,
            is_multiplayer: false,
            player_white_id: None,
            player_black_id: None,
            last_eval_cp: 0,
            created_at: now_ms(),
            updated_at: now_ms(),
            rating_applied: false,
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteSessionRepository::new(db.pool().clone());
        let record = sample_record("s1");
        repo.create_session(&record).await.unwrap();
        let fetched = repo.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.session_id, "s1");
        assert_eq!(fetched.engine_rating, 1600);
    }

    #[tokio::test]
    async fn test_get_missing_session_returns_none() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteSessionRepository::new(db.pool().clone());
        assert!(repo.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_session_replaces_move_log() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteSessionRepository::new(db.pool().clone());
        let mut record = sample_record("s2");
        repo.create_session(&record).await.unwrap();

        record.move_log.push(PlyAnnotation {
            ply: 1,
            side: PlySide::Player,
            uci: "e2e4".to_string(),
            san: "e4".to_string(),
            eval_cp: 20,
            delta_cp: 5,
            verdict: Verdict::Sharp,
            commentary: "kept the position sharp.".to_string(),
            themes: vec![],
            timestamp_ms: now_ms(),
        });
        repo.save_session(&record).await.unwrap();

        let fetched = repo.get_session("s2").await.unwrap().unwrap();
        assert_eq!(fetched.move_log.len(), 1);
        assert_eq!(fetched.move_log[0].uci, "e2e4");
    }

    #[tokio::test]
    async fn test_get_events_returns_logged_events_in_order() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteSessionRepository::new(db.pool().clone());
        repo.create_session(&sample_record("s3")).await.unwrap();
        repo.log_event("s3", "engine_move", &serde_json::json!({"uci": "e2e4"})).await.unwrap();
        repo.log_event("s3", "engine_move", &serde_json::json!({"uci": "e7e5"})).await.unwrap();

        let events = repo.get_events("s3").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["uci"], "e2e4");
        assert_eq!(events[1].payload["uci"], "e7e5");
    }

    #[tokio::test]
    async fn test_user_stats_counts_completed_single_player_games() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteSessionRepository::new(db.pool().clone());

        let mut won = sample_record("s4");
        won.player_id = Some("alice".to_string());
        won.status = SessionStatus::Completed;
        won.winner = Some(Winner::Player);
        won.player_rating = Some(1550);
        repo.create_session(&won).await.unwrap();

        let mut lost = sample_record("s5");
        lost.player_id = Some("alice".to_string());
        lost.status = SessionStatus::Completed;
        lost.winner = Some(Winner::Engine);
        lost.player_rating = Some(1530);
        lost.updated_at = won.updated_at + 1;
        repo.create_session(&lost).await.unwrap();

        let stats = repo.get_user_stats("alice").await.unwrap();
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.current_rating, Some(1530));
    }
}
