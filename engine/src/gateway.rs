//! Mutex-serialized request/response wrapper around [`StockfishEngine`].
//!
//! The rest of the engine crate models Stockfish as a long-lived actor driven
//! by commands and events (suited to an interactive session that keeps one
//! engine per game). The analyzer gateway generalizes that same process/UCI
//! plumbing into a single shared instance serving `BestMove`/`Evaluate`/`MultiPV`
//! calls one at a time, reconfiguring strength per call and transparently
//! respawning once if the subprocess has died.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use cozy_chess::{Board, Color, GameStatus, Move};
use tokio::sync::Mutex;

use crate::{EngineCommand, EngineConfig, EngineEvent, GoParams, Score, StockfishEngine};

/// Mate score sentinel, expressed from White's point of view.
pub const MATE_CP: i32 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum EngineGatewayError {
    #[error("position is already game over")]
    EngineTerminal,
    #[error("invalid fen: {0}")]
    InvalidFen(String),
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
}

/// A scored principal variation, SAN-rendered from the analysis root.
#[derive(Debug, Clone)]
pub struct ScoredLine {
    pub eval_cp: i32,
    pub san_line: Vec<String>,
}

/// Owns exactly one Stockfish subprocess, guarded by a mutex so only one
/// analysis runs at a time across the whole process.
pub struct AnalyzerGateway {
    engine: Mutex<Option<StockfishEngine>>,
    stockfish_path: Option<PathBuf>,
    global_move_time_limit_s: f64,
}

impl AnalyzerGateway {
    pub fn new(stockfish_path: Option<PathBuf>, global_move_time_limit_s: f64) -> Self {
        Self {
            engine: Mutex::new(None),
            stockfish_path,
            global_move_time_limit_s,
        }
    }

    /// `BestMove(fen, difficulty, rating) -> (move, evalCp)`.
    pub async fn best_move(
        &self,
        fen: &str,
        skill_level: u8,
        nominal_strength: u16,
        think_time_s: f64,
    ) -> Result<(Move, i32), EngineGatewayError> {
        let board = parse_fen(fen)?;
        require_ongoing(&board)?;
        let movetime_ms = think_time_ms(think_time_s, self.global_move_time_limit_s);

        let mut guard = self.engine.lock().await;
        let result = self
            .run_best_move(&mut guard, fen, skill_level, nominal_strength, movetime_ms)
            .await;
        let (mv, info) = match result {
            Ok(v) => v,
            Err(_) => {
                *guard = None;
                self.run_best_move(&mut guard, fen, skill_level, nominal_strength, movetime_ms)
                    .await?
            }
        };
        let cp = info
            .score
            .map(|s| score_to_white_pov(s, board.side_to_move()))
            .unwrap_or(0);
        Ok((mv, cp))
    }

    /// `Evaluate(fen, difficulty, rating) -> evalCp`.
    pub async fn evaluate(
        &self,
        fen: &str,
        skill_level: u8,
        nominal_strength: u16,
        think_time_s: f64,
    ) -> Result<i32, EngineGatewayError> {
        let board = parse_fen(fen)?;
        match board.status() {
            GameStatus::Won => {
                return Ok(if board.side_to_move() == Color::White { -MATE_CP } else { MATE_CP })
            }
            GameStatus::Drawn => return Ok(0),
            GameStatus::Ongoing => {}
        }
        let movetime_ms = think_time_ms(think_time_s, self.global_move_time_limit_s);

        let mut guard = self.engine.lock().await;
        let result = self
            .run_best_move(&mut guard, fen, skill_level, nominal_strength, movetime_ms)
            .await;
        let (_mv, info) = match result {
            Ok(v) => v,
            Err(_) => {
                *guard = None;
                self.run_best_move(&mut guard, fen, skill_level, nominal_strength, movetime_ms)
                    .await?
            }
        };
        Ok(info
            .score
            .map(|s| score_to_white_pov(s, board.side_to_move()))
            .unwrap_or(0))
    }

    /// `MultiPV(fen, difficulty, rating, k, maxMoves) -> [{evalCp, sanLine}]`.
    pub async fn multi_pv(
        &self,
        fen: &str,
        skill_level: u8,
        nominal_strength: u16,
        think_time_s: f64,
        k: u8,
        max_moves: usize,
    ) -> Result<Vec<ScoredLine>, EngineGatewayError> {
        let board = parse_fen(fen)?;
        require_ongoing(&board)?;
        let movetime_ms = think_time_ms(think_time_s, self.global_move_time_limit_s);
        let k = k.max(1);

        let mut guard = self.engine.lock().await;
        let result = self
            .run_multi_pv(&mut guard, fen, skill_level, nominal_strength, movetime_ms, k)
            .await;
        let lines = match result {
            Ok(v) => v,
            Err(_) => {
                *guard = None;
                self.run_multi_pv(&mut guard, fen, skill_level, nominal_strength, movetime_ms, k)
                    .await?
            }
        };

        let mut scored: Vec<ScoredLine> = lines
            .into_values()
            .map(|pv| {
                let cp = pv
                    .score
                    .map(|s| score_to_white_pov(s, board.side_to_move()))
                    .unwrap_or(0);
                ScoredLine { eval_cp: cp, san_line: render_san_line(&board, &pv.pv, max_moves) }
            })
            .collect();
        scored.sort_by(|a, b| b.eval_cp.cmp(&a.eval_cp));
        Ok(scored)
    }

    async fn run_best_move(
        &self,
        guard: &mut Option<StockfishEngine>,
        fen: &str,
        skill_level: u8,
        nominal_strength: u16,
        movetime_ms: u64,
    ) -> Result<(Move, LastInfo), EngineGatewayError> {
        let engine = self.ensure_spawned(guard).await?;
        configure(engine, skill_level, nominal_strength, None).await?;
        set_position(engine, fen).await?;
        go(engine, GoParams { movetime: Some(movetime_ms), ..Default::default() }).await?;
        wait_for_best_move(engine, movetime_ms + 2_000).await
    }

    async fn run_multi_pv(
        &self,
        guard: &mut Option<StockfishEngine>,
        fen: &str,
        skill_level: u8,
        nominal_strength: u16,
        movetime_ms: u64,
        k: u8,
    ) -> Result<BTreeMap<u8, LastInfo>, EngineGatewayError> {
        let engine = self.ensure_spawned(guard).await?;
        configure(engine, skill_level, nominal_strength, Some(k)).await?;
        set_position(engine, fen).await?;
        go(engine, GoParams { movetime: Some(movetime_ms), ..Default::default() }).await?;
        wait_for_multi_pv(engine, movetime_ms + 2_000, k).await
    }

    async fn ensure_spawned<'a>(
        &self,
        guard: &'a mut Option<StockfishEngine>,
    ) -> Result<&'a mut StockfishEngine, EngineGatewayError> {
        if guard.is_none() {
            let config = EngineConfig {
                path: self.stockfish_path.clone(),
                ..Default::default()
            };
            let engine = StockfishEngine::spawn_with_config(config)
                .await
                .map_err(EngineGatewayError::EngineUnavailable)?;
            *guard = Some(engine);
        }
        Ok(guard.as_mut().expect("just ensured spawned"))
    }
}

fn parse_fen(fen: &str) -> Result<Board, EngineGatewayError> {
    fen.parse().map_err(|_| EngineGatewayError::InvalidFen(fen.to_string()))
}

fn require_ongoing(board: &Board) -> Result<(), EngineGatewayError> {
    if matches!(board.status(), GameStatus::Ongoing) {
        Ok(())
    } else {
        Err(EngineGatewayError::EngineTerminal)
    }
}

/// `think_time_s` clamped to the global cap and floored at 50ms, in milliseconds.
fn think_time_ms(think_time_s: f64, global_limit_s: f64) -> u64 {
    let seconds = think_time_s.min(global_limit_s).max(0.05);
    (seconds * 1000.0).round() as u64
}

async fn configure(
    engine: &mut StockfishEngine,
    skill_level: u8,
    nominal_strength: u16,
    multi_pv: Option<u8>,
) -> Result<(), EngineGatewayError> {
    let skill = skill_level.min(20);
    let elo = nominal_strength.clamp(1320, 2850);

    send(engine, "Skill Level", &skill.to_string()).await?;
    send(engine, "UCI_LimitStrength", "true").await?;
    send(engine, "UCI_Elo", &elo.to_string()).await?;
    send(engine, "MultiPV", &multi_pv.unwrap_or(1).to_string()).await?;
    Ok(())
}

async fn set_position(engine: &mut StockfishEngine, fen: &str) -> Result<(), EngineGatewayError> {
    engine
        .send_command(EngineCommand::SetPosition { fen: fen.to_string(), moves: vec![] })
        .await
        .map_err(EngineGatewayError::EngineUnavailable)
}

async fn go(engine: &mut StockfishEngine, params: GoParams) -> Result<(), EngineGatewayError> {
    engine
        .send_command(EngineCommand::Go(params))
        .await
        .map_err(EngineGatewayError::EngineUnavailable)
}

async fn send(engine: &mut StockfishEngine, name: &str, value: &str) -> Result<(), EngineGatewayError> {
    engine
        .send_command(EngineCommand::SetOption { name: name.to_string(), value: Some(value.to_string()) })
        .await
        .map_err(EngineGatewayError::EngineUnavailable)
}

#[derive(Debug, Clone, Default)]
struct LastInfo {
    score: Option<Score>,
    pv: Vec<Move>,
}

async fn wait_for_best_move(
    engine: &mut StockfishEngine,
    timeout_ms: u64,
) -> Result<(Move, LastInfo), EngineGatewayError> {
    let mut last = LastInfo::default();
    let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match engine.recv_event().await {
                Some(EngineEvent::Info(info)) => {
                    if info.multipv.unwrap_or(1) == 1 {
                        if info.score.is_some() {
                            last.score = info.score;
                        }
                        if !info.pv.is_empty() {
                            last.pv = info.pv;
                        }
                    }
                }
                Some(EngineEvent::BestMove(mv)) => return Some(mv),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await;

    match result {
        Ok(Some(mv)) => Ok((mv, last)),
        Ok(None) => Err(EngineGatewayError::EngineUnavailable("engine stream closed".to_string())),
        Err(_) => Err(EngineGatewayError::EngineUnavailable("timed out waiting for bestmove".to_string())),
    }
}

async fn wait_for_multi_pv(
    engine: &mut StockfishEngine,
    timeout_ms: u64,
    k: u8,
) -> Result<BTreeMap<u8, LastInfo>, EngineGatewayError> {
    let mut lines: BTreeMap<u8, LastInfo> = BTreeMap::new();

    let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match engine.recv_event().await {
                Some(EngineEvent::Info(info)) => {
                    let idx = info.multipv.unwrap_or(1).min(k);
                    let entry = lines.entry(idx).or_default();
                    if info.score.is_some() {
                        entry.score = info.score;
                    }
                    if !info.pv.is_empty() {
                        entry.pv = info.pv;
                    }
                }
                Some(EngineEvent::BestMove(_)) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await;

    match result {
        Ok(true) => Ok(lines),
        Ok(false) => Err(EngineGatewayError::EngineUnavailable("engine stream closed".to_string())),
        Err(_) if !lines.is_empty() => Ok(lines),
        Err(_) => Err(EngineGatewayError::EngineUnavailable("timed out waiting for multipv".to_string())),
    }
}

fn score_to_white_pov(score: Score, side_to_move: Color) -> i32 {
    let from_mover = match score {
        Score::Centipawns(cp) => cp,
        Score::Mate(n) => {
            if n > 0 {
                MATE_CP
            } else {
                -MATE_CP
            }
        }
    };
    if side_to_move == Color::White {
        from_mover
    } else {
        -from_mover
    }
}

fn render_san_line(root: &Board, pv: &[Move], max_moves: usize) -> Vec<String> {
    let mut board = root.clone();
    let mut out = Vec::with_capacity(pv.len().min(max_moves));
    for mv in pv.iter().take(max_moves) {
        let san = chess::pgn::san::format_san(&board, *mv);
        if board.try_play(*mv).is_err() {
            break;
        }
        out.push(san);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_think_time_clamps_floor() {
        assert_eq!(think_time_ms(0.0, 0.6), 50);
    }

    #[test]
    fn test_think_time_respects_global_cap() {
        assert_eq!(think_time_ms(5.0, 0.6), 600);
    }

    #[test]
    fn test_score_to_white_pov_flips_for_black() {
        assert_eq!(score_to_white_pov(Score::Centipawns(35), Color::Black), -35);
        assert_eq!(score_to_white_pov(Score::Centipawns(35), Color::White), 35);
    }

    #[test]
    fn test_mate_score_sentinel() {
        assert_eq!(score_to_white_pov(Score::Mate(3), Color::White), MATE_CP);
        assert_eq!(score_to_white_pov(Score::Mate(-3), Color::White), -MATE_CP);
    }
}
