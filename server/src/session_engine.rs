//! Session state machine (spec.md §4.3/§4.4): the single-player `SubmitMove`
//! ten-step procedure and its multiplayer variant, plus session lifecycle
//! (create/resign/replay/analysis/PGN export).
//!
//! Grounded in `examples/original_source/backend/app/api/sessions.py`'s
//! `make_move` handler for the single-player ten-step sequence and
//! `examples/original_source/backend/app/api/multiplayer.py`'s `play_move`
//! for the clock-deduction formula and turn enforcement.

use std::sync::Arc;

use cozy_chess::{Board, Color, GameStatus};

use crate::coach::{build_briefing, material_balance_cp, CoachBriefing, CoachRateLimiter, CoachSummarizer};
use crate::domain::{
    now_ms, Clocks, Difficulty, EventRecord, ExploitMode, OpeningTag, OpponentProfile, PlyAnnotation, PlySide,
    ResultKind, SessionRecord, SessionStatus, Side, UserStats, Winner,
};
use crate::error::{ServiceError, SessionError};
use crate::insight::{build_insight, InsightInputs};
use crate::opening::detect_opening;
use crate::persistence::SessionRepository;
use crate::rating::{rating_delta, Outcome};
use crate::streaming::{StreamEvent, StreamHub};
use engine::AnalyzerGateway;

pub struct CreateSessionRequest {
    pub player_color: Side,
    pub exploit_mode: ExploitMode,
    pub difficulty: Difficulty,
    pub engine_depth: Option<u8>,
    pub engine_rating: Option<u16>,
    pub player_id: Option<String>,
    pub player_rating: Option<i32>,
    pub clocks: Clocks,
}

pub struct CreateMultiplayerSessionRequest {
    pub player_white_id: String,
    pub player_black_id: String,
    /// Reuses the single-player `Clocks` shape: `player_ms` is White's clock,
    /// `engine_ms` is Black's.
    pub clocks: Clocks,
}

pub struct AnalysisPair {
    pub ply: u32,
    pub player_move: Option<PlyAnnotation>,
    pub engine_move: Option<PlyAnnotation>,
    pub themes: Vec<String>,
}

pub struct SessionEngine<R: SessionRepository> {
    repo: R,
    gateway: Arc<AnalyzerGateway>,
    stream_hub: Arc<StreamHub>,
    coach_limiter: Arc<CoachRateLimiter>,
    coach_summarizer: Arc<CoachSummarizer>,
}

impl<R: SessionRepository> SessionEngine<R> {
    pub fn new(
        repo: R,
        gateway: Arc<AnalyzerGateway>,
        stream_hub: Arc<StreamHub>,
        coach_limiter: Arc<CoachRateLimiter>,
        coach_summarizer: Arc<CoachSummarizer>,
    ) -> Self {
        Self { repo, gateway, stream_hub, coach_limiter, coach_summarizer }
    }

    pub async fn create_session(&self, req: CreateSessionRequest) -> Result<SessionRecord, ServiceError> {
        let params = req.difficulty.params(req.engine_rating, req.engine_depth);
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let record = SessionRecord {
            session_id: session_id.clone(),
            player_color: req.player_color,
            engine_color: req.player_color.opposite(),
            exploit_mode: req.exploit_mode,
            difficulty: req.difficulty,
            engine_depth: req.engine_depth.unwrap_or(params.skill_level),
            engine_rating: req.engine_rating.unwrap_or(params.nominal_strength),
            status: SessionStatus::Active,
            result: None,
            winner: None,
            fen: Board::default().to_string(),
            initial_fen: Board::default().to_string(),
            clocks: req.clocks,
            move_log: Vec::new(),
            opponent_profile: OpponentProfile::default(),
            player_id: req.player_id,
            player_rating: req.player_rating,
            player_rating_delta: None,
            is_multiplayer: false,
            player_white_id: None,
            player_black_id: None,
            last_eval_cp: 0,
            created_at: now,
            updated_at: now,
            rating_applied: false,
        };
        self.repo.create_session(&record).await?;
        self.stream_hub.open_session(&session_id);
        Ok(record)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord, ServiceError> {
        self.repo
            .get_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()).into())
    }

    /// `SubmitMove` (spec.md §4.3), single-player variant.
    pub async fn submit_move(
        &self,
        session_id: &str,
        uci: Option<String>,
        clock: Clocks,
        player_id: Option<String>,
    ) -> Result<SessionRecord, ServiceError> {
        let mut record = self.get_session(session_id).await?;
        if record.is_terminal() {
            return Err(SessionError::GameOver.into());
        }
        if let (Some(expected), Some(given)) = (&record.player_id, &player_id) {
            if expected != given {
                return Err(SessionError::Forbidden.into());
            }
        }

        let board: Board = record.fen.parse().map_err(|_| SessionError::NotFound(session_id.to_string()))?;
        let mut pending_player_move: Option<(Board, cozy_chess::Move)> = None;

        if let Some(uci) = uci {
            if board.side_to_move() != record.player_color.into() {
                return Err(SessionError::ConflictWrongTurn.into());
            }
            let mv = parse_and_validate_move(&board, &uci)?;
            let mut after = board.clone();
            after.play_unchecked(mv);

            if let Some(terminal_cp) = terminal_eval_cp(&after) {
                let prev_eval_cp = record.last_eval_cp;
                let ply_side = if record.player_color == Side::White { PlySide::White } else { PlySide::Black };
                let player_insight = build_insight(InsightInputs {
                    before: &board,
                    after: &after,
                    mv,
                    mover_color: record.player_color.into(),
                    side: ply_side,
                    prev_eval_cp,
                    new_eval_cp: terminal_cp,
                    ply: record.next_ply(),
                    timestamp_ms: now_ms(),
                });
                record.fen = after.to_string();
                record.clocks = clock;
                record.move_log.push(player_insight);
                record.last_eval_cp = terminal_cp;
                let terminal = terminal_result(&after).expect("a terminal eval implies a terminal status");
                let terminal = Terminal {
                    result: terminal.result,
                    winner: to_single_player_winner(terminal.winner, record.player_color),
                };
                self.finalize_terminal(&mut record, terminal)?;
                record.updated_at = now_ms();
                self.repo.save_session(&record).await?;
                self.broadcast_game_over(&record).await;
                return Ok(record);
            }

            record.fen = after.to_string();
            pending_player_move = Some((board, mv));
        }

        let engine_board: Board = record.fen.parse().map_err(|_| SessionError::NotFound(session_id.to_string()))?;
        if engine_board.side_to_move() != record.engine_color.into() {
            return Err(SessionError::ConflictEngineNotToMove.into());
        }

        let params = record.difficulty.params(Some(record.engine_rating), Some(record.engine_depth));
        let (engine_mv, eval_after_player) = self
            .gateway
            .best_move(&record.fen, params.skill_level, params.nominal_strength, params.think_time_s)
            .await
            .map_err(map_engine_error)?;

        if let Some((before_player, player_mv)) = pending_player_move {
            let prev_eval_cp = record.last_eval_cp;
            let ply_side = if record.player_color == Side::White { PlySide::White } else { PlySide::Black };
            let player_insight = build_insight(InsightInputs {
                before: &before_player,
                after: &engine_board,
                mv: player_mv,
                mover_color: record.player_color.into(),
                side: ply_side,
                prev_eval_cp,
                new_eval_cp: eval_after_player,
                ply: record.next_ply(),
                timestamp_ms: now_ms(),
            });
            record.move_log.push(player_insight);
            record.last_eval_cp = eval_after_player;
        }

        let mut after_engine = engine_board.clone();
        after_engine.play_unchecked(engine_mv);
        let eval_after_engine = self
            .gateway
            .evaluate(
                &after_engine.to_string(),
                params.skill_level,
                params.nominal_strength,
                params.think_time_s,
            )
            .await
            .map_err(map_engine_error)?;

        let engine_ply_side = if record.engine_color == Side::White { PlySide::White } else { PlySide::Black };
        let engine_insight = build_insight(InsightInputs {
            before: &engine_board,
            after: &after_engine,
            mv: engine_mv,
            mover_color: record.engine_color.into(),
            side: engine_ply_side,
            prev_eval_cp: eval_after_player,
            new_eval_cp: eval_after_engine,
            ply: record.next_ply(),
            timestamp_ms: now_ms(),
        });
        record.move_log.push(engine_insight.clone());
        for theme in &engine_insight.themes {
            let count = record.opponent_profile.motif_risk.entry(theme.label().to_string()).or_insert(0.0);
            *count += 1.0;
        }
        record.last_eval_cp = eval_after_engine;
        record.fen = after_engine.to_string();
        record.clocks = clock;

        if let Some(terminal) = terminal_result(&after_engine) {
            let terminal = Terminal {
                result: terminal.result,
                winner: to_single_player_winner(terminal.winner, record.player_color),
            };
            self.finalize_terminal(&mut record, terminal)?;
        }

        record.updated_at = now_ms();
        self.repo.save_session(&record).await?;

        self.repo
            .log_event(
                session_id,
                "engine_move",
                &serde_json::json!({ "uci": engine_insight.uci, "eval_cp": engine_insight.eval_cp }),
            )
            .await?;
        self.stream_hub
            .broadcast(
                session_id,
                StreamEvent::EngineMove(serde_json::json!({
                    "uci": engine_insight.uci,
                    "engine_eval_cp": engine_insight.eval_cp,
                    "clocks": { "player_ms": record.clocks.player_ms, "engine_ms": record.clocks.engine_ms },
                    "status": record.status,
                })),
            )
            .await;
        if record.is_terminal() {
            self.broadcast_game_over(&record).await;
        }

        Ok(record)
    }

    /// Multiplayer move (spec.md §4.4): no analyzer play, fast material eval,
    /// clock deducted from the mover only.
    pub async fn submit_multiplayer_move(
        &self,
        session_id: &str,
        uci: String,
        player_id: &str,
    ) -> Result<SessionRecord, ServiceError> {
        let mut record = self.get_session(session_id).await?;
        if record.is_terminal() {
            return Err(SessionError::GameOver.into());
        }

        let board: Board = record.fen.parse().map_err(|_| SessionError::NotFound(session_id.to_string()))?;
        let side_to_move: Side = board.side_to_move().into();
        let expected_player = match side_to_move {
            Side::White => record.player_white_id.as_deref(),
            Side::Black => record.player_black_id.as_deref(),
        };
        if expected_player != Some(player_id) {
            return Err(SessionError::Forbidden.into());
        }

        let mv = parse_and_validate_move(&board, &uci)?;
        let mut after = board.clone();
        after.play_unchecked(mv);

        let elapsed_ms = (now_ms() - record.updated_at).max(0);
        match side_to_move {
            Side::White => record.clocks.player_ms = (record.clocks.player_ms - elapsed_ms).max(0),
            Side::Black => record.clocks.engine_ms = (record.clocks.engine_ms - elapsed_ms).max(0),
        }

        let material_eval = crate::coach::extract_features(&after);
        let eval_cp = material_balance_cp(&material_eval);
        let prev_eval_cp = record.last_eval_cp;

        let ply_side = match side_to_move {
            Side::White => PlySide::White,
            Side::Black => PlySide::Black,
        };
        let insight = build_insight(InsightInputs {
            before: &board,
            after: &after,
            mv,
            mover_color: side_to_move.into(),
            side: ply_side,
            prev_eval_cp,
            new_eval_cp: eval_cp,
            ply: record.next_ply(),
            timestamp_ms: now_ms(),
        });
        record.move_log.push(insight.clone());
        record.last_eval_cp = eval_cp;
        record.fen = after.to_string();

        if let Some(terminal) = terminal_result(&after) {
            self.finalize_terminal(&mut record, terminal)?;
        }

        record.updated_at = now_ms();
        self.repo.save_session(&record).await?;
        self.stream_hub
            .broadcast(
                session_id,
                StreamEvent::PlayerMove(serde_json::json!({ "uci": insight.uci, "eval_cp": insight.eval_cp })),
            )
            .await;
        if record.is_terminal() {
            self.broadcast_game_over(&record).await;
        }
        Ok(record)
    }

    pub async fn create_multiplayer_session(
        &self,
        req: CreateMultiplayerSessionRequest,
    ) -> Result<SessionRecord, ServiceError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let record = SessionRecord {
            session_id: session_id.clone(),
            player_color: Side::White,
            engine_color: Side::Black,
            exploit_mode: ExploitMode::Off,
            difficulty: Difficulty::Custom,
            engine_depth: 1,
            engine_rating: 1600,
            status: SessionStatus::Active,
            result: None,
            winner: None,
            fen: Board::default().to_string(),
            initial_fen: Board::default().to_string(),
            clocks: req.clocks,
            move_log: Vec::new(),
            opponent_profile: OpponentProfile::default(),
            player_id: None,
            player_rating: None,
            player_rating_delta: None,
            is_multiplayer: true,
            player_white_id: Some(req.player_white_id),
            player_black_id: Some(req.player_black_id),
            last_eval_cp: 0,
            created_at: now,
            updated_at: now,
            rating_applied: false,
        };
        self.repo.create_session(&record).await?;
        self.stream_hub.open_session(&session_id);
        Ok(record)
    }

    pub async fn resign(&self, session_id: &str) -> Result<SessionRecord, ServiceError> {
        let mut record = self.get_session(session_id).await?;
        if record.is_terminal() {
            return Err(SessionError::GameOver.into());
        }
        self.finalize_terminal(&mut record, Terminal { result: ResultKind::Resigned, winner: Winner::Engine })?;
        record.updated_at = now_ms();
        self.repo.save_session(&record).await?;
        self.broadcast_game_over(&record).await;
        Ok(record)
    }

    pub async fn multiplayer_resign(&self, session_id: &str, player_id: &str) -> Result<SessionRecord, ServiceError> {
        let mut record = self.get_session(session_id).await?;
        if record.is_terminal() {
            return Err(SessionError::GameOver.into());
        }
        let winner = if record.player_white_id.as_deref() == Some(player_id) {
            Winner::Black
        } else if record.player_black_id.as_deref() == Some(player_id) {
            Winner::White
        } else {
            return Err(SessionError::Forbidden.into());
        };
        self.finalize_terminal(&mut record, Terminal { result: ResultKind::Resigned, winner })?;
        record.updated_at = now_ms();
        self.repo.save_session(&record).await?;
        self.broadcast_game_over(&record).await;
        Ok(record)
    }

    pub async fn multiplayer_draw(&self, session_id: &str) -> Result<SessionRecord, ServiceError> {
        let mut record = self.get_session(session_id).await?;
        if record.is_terminal() {
            return Err(SessionError::GameOver.into());
        }
        self.finalize_terminal(&mut record, Terminal { result: ResultKind::Draw, winner: Winner::Draw })?;
        record.updated_at = now_ms();
        self.repo.save_session(&record).await?;
        self.broadcast_game_over(&record).await;
        Ok(record)
    }

    pub async fn multiplayer_abort(&self, session_id: &str) -> Result<SessionRecord, ServiceError> {
        let mut record = self.get_session(session_id).await?;
        if record.is_terminal() {
            return Err(SessionError::GameOver.into());
        }
        record.status = SessionStatus::Abandoned;
        record.result = Some(ResultKind::Abandoned);
        record.winner = None;
        record.updated_at = now_ms();
        self.repo.save_session(&record).await?;
        self.broadcast_game_over(&record).await;
        Ok(record)
    }

    pub async fn coach(&self, session_id: &str) -> Result<CoachBriefing, ServiceError> {
        self.coach_limiter.check(session_id).await?;
        let record = self.get_session(session_id).await?;
        let board: Board = record.fen.parse().map_err(|_| SessionError::NotFound(session_id.to_string()))?;
        let params = record.difficulty.params(Some(record.engine_rating), Some(record.engine_depth));
        let multi_pv = self
            .gateway
            .multi_pv(&record.fen, params.skill_level, params.nominal_strength, params.think_time_s, 3, 6)
            .await
            .unwrap_or_default();
        let last_commentary = record.move_log.last().map(|p| p.commentary.as_str());
        let mut briefing = build_briefing(
            &board,
            record.last_eval_cp,
            record.engine_color,
            record.player_color,
            last_commentary,
            &multi_pv,
        );
        briefing.narrative = self.coach_summarizer.summarize(&briefing).await;
        self.stream_hub
            .broadcast(
                session_id,
                StreamEvent::CoachUpdate(serde_json::json!({ "narrative": briefing.narrative })),
            )
            .await;
        Ok(briefing)
    }

    pub async fn replay(&self, session_id: &str) -> Result<SessionRecord, ServiceError> {
        self.get_session(session_id).await
    }

    pub async fn opening_tag(&self, session_id: &str) -> Result<Option<OpeningTag>, ServiceError> {
        let record = self.get_session(session_id).await?;
        let moves: Vec<String> = record.move_log.iter().map(|p| p.uci.clone()).collect();
        Ok(detect_opening(&moves))
    }

    pub async fn analysis(&self, session_id: &str) -> Result<Vec<AnalysisPair>, ServiceError> {
        let record = self.get_session(session_id).await?;
        Ok(pair_analysis(&record.move_log))
    }

    pub async fn session_events(&self, session_id: &str) -> Result<Vec<EventRecord>, ServiceError> {
        self.get_session(session_id).await?;
        Ok(self.repo.get_events(session_id).await?)
    }

    pub async fn user_stats(&self, player_id: &str) -> Result<UserStats, ServiceError> {
        Ok(self.repo.get_user_stats(player_id).await?)
    }

    pub async fn export_pgn(&self, session_id: &str) -> Result<String, ServiceError> {
        let record = self.get_session(session_id).await?;
        let moves: Vec<String> = record.move_log.iter().map(|p| p.san.clone()).collect();
        let result_token = chess::pgn::pgn_result_token(
            record.winner.map(|w| w.as_str()),
            record.player_color.as_str(),
        );
        let headers = chess::pgn::PgnHeaders {
            event: "Casual Game".to_string(),
            site: "Session Engine".to_string(),
            date: format_date(record.created_at),
            round: "-".to_string(),
            white: if record.player_color == Side::White { "Player".to_string() } else { "Engine".to_string() },
            black: if record.player_color == Side::Black { "Player".to_string() } else { "Engine".to_string() },
            result: result_token.to_string(),
            setup_fen: if record.initial_fen == Board::default().to_string() { None } else { Some(record.initial_fen.clone()) },
        };
        Ok(chess::pgn::export_pgn(&headers, &moves))
    }

    fn finalize_terminal(&self, record: &mut SessionRecord, terminal: Terminal) -> Result<(), ServiceError> {
        record.status = SessionStatus::Completed;
        record.result = Some(terminal.result);
        record.winner = Some(terminal.winner);
        if !record.rating_applied {
            if let (Some(player_rating), false) = (record.player_rating, record.is_multiplayer) {
                let outcome = match terminal.winner {
                    Winner::Player => Outcome::Win,
                    Winner::Draw => Outcome::Draw,
                    _ => Outcome::Loss,
                };
                let delta = rating_delta(player_rating, record.engine_rating as i32, outcome);
                record.player_rating = Some(player_rating + delta);
                record.player_rating_delta = Some(delta);
            }
            record.rating_applied = true;
        }
        Ok(())
    }

    async fn broadcast_game_over(&self, record: &SessionRecord) {
        self.stream_hub
            .broadcast(
                &record.session_id,
                StreamEvent::GameOver(serde_json::json!({
                    "result": record.result,
                    "winner": record.winner,
                    "player_rating_delta": record.player_rating_delta,
                })),
            )
            .await;
    }
}

struct Terminal {
    result: ResultKind,
    winner: Winner,
}

fn parse_and_validate_move(board: &Board, uci: &str) -> Result<cozy_chess::Move, SessionError> {
    if let Some(promo_char) = uci.chars().nth(4) {
        if !matches!(promo_char, 'q' | 'r' | 'b' | 'n') {
            return Err(SessionError::IllegalMove(uci.to_string()));
        }
    }
    let mv = chess::parse_uci_move(uci).ok_or_else(|| SessionError::IllegalMove(uci.to_string()))?;
    let mut legal = Vec::new();
    board.generate_moves(|mvs| {
        legal.extend(mvs);
        false
    });
    let mv = chess::convert_uci_castling_to_cozy(mv, &legal);
    if !legal.contains(&mv) {
        return Err(SessionError::IllegalMove(uci.to_string()));
    }
    Ok(mv)
}

fn terminal_eval_cp(board: &Board) -> Option<i32> {
    match board.status() {
        GameStatus::Won => Some(if board.side_to_move() == Color::White { -engine::gateway::MATE_CP } else { engine::gateway::MATE_CP }),
        GameStatus::Drawn => Some(0),
        GameStatus::Ongoing => None,
    }
}

/// `terminal_result` reports the winner by color; single-player sessions
/// track winners as `Player`/`Engine` instead, per `Winner`'s two parallel
/// vocabularies (spec.md §3).
fn to_single_player_winner(winner: Winner, player_color: Side) -> Winner {
    match winner {
        Winner::White if player_color == Side::White => Winner::Player,
        Winner::Black if player_color == Side::Black => Winner::Player,
        Winner::White | Winner::Black => Winner::Engine,
        other => other,
    }
}

fn terminal_result(board: &Board) -> Option<Terminal> {
    match board.status() {
        GameStatus::Won => {
            let winner = if board.side_to_move() == Color::White { Winner::Black } else { Winner::White };
            Some(Terminal { result: ResultKind::Checkmate, winner })
        }
        GameStatus::Drawn => Some(Terminal { result: ResultKind::Stalemate, winner: Winner::Draw }),
        GameStatus::Ongoing => None,
    }
}

fn map_engine_error(err: engine::EngineGatewayError) -> ServiceError {
    match err {
        engine::EngineGatewayError::EngineTerminal => SessionError::GameOver.into(),
        other => ServiceError::Engine(other),
    }
}

fn pair_analysis(move_log: &[PlyAnnotation]) -> Vec<AnalysisPair> {
    let mut pairs = Vec::new();
    let mut iter = move_log.iter().peekable();
    let mut ply_index = 1;
    while let Some(first) = iter.next() {
        let second = if matches!(first.side, PlySide::Player | PlySide::White) { iter.next() } else { None };
        let mut themes: Vec<String> = first.themes.iter().map(|t| t.label().to_string()).collect();
        if let Some(second) = second {
            for t in &second.themes {
                let label = t.label().to_string();
                if !themes.contains(&label) {
                    themes.push(label);
                }
            }
        }
        if themes.is_empty() {
            themes.push("quiet move".to_string());
        }
        pairs.push(AnalysisPair {
            ply: ply_index,
            player_move: Some(first.clone()),
            engine_move: second.cloned(),
            themes,
        });
        ply_index += 1;
    }
    pairs
}

fn format_date(timestamp_ms: i64) -> String {
    let days_since_epoch = timestamp_ms / 86_400_000;
    let mut year = 1970i64;
    let mut remaining = days_since_epoch;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining < days_in_year {
            break;
        }
        remaining -= days_in_year;
        year += 1;
    }
    let month_lengths = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };
    let mut month = 1;
    for len in month_lengths {
        if remaining < len {
            break;
        }
        remaining -= len;
        month += 1;
    }
    format!("{:04}.{:02}.{:02}", year, month, remaining + 1)
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date_epoch() {
        assert_eq!(format_date(0), "1970.01.01");
    }

    #[test]
    fn test_pair_analysis_groups_player_and_engine_plies() {
        let make = |side: PlySide| PlyAnnotation {
            ply: 1,
            side,
            uci: "e2e4".to_string(),
            san: "e4".to_string(),
            eval_cp: 0,
            delta_cp: 0,
            verdict: crate::domain::Verdict::Sharp,
            commentary: "You kept the position sharp.".to_string(),
            themes: vec![],
            timestamp_ms: 0,
        };
        let log = vec![make(PlySide::Player), make(PlySide::Engine)];
        let pairs = pair_analysis(&log);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].engine_move.is_some());
    }
}
