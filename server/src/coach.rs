//! Coach briefing builder (spec.md §4.6): position features, five sections
//! of short sentences, and a structured-fallback-or-summarizer split, gated
//! by a per-session sliding-window rate limiter.
//!
//! Grounded in `examples/original_source/backend/app/api/sessions.py`'s
//! `_enforce_coach_rate_limit` (timestamp list, pop-from-front on expiry);
//! `piece_value` below is the standard centipawn material table.

use std::collections::VecDeque;
use std::time::Duration;

use cozy_chess::{Board, Color, Piece};
use tokio::sync::Mutex;

use crate::domain::{now_ms, Side};
use engine::ScoredLine;

fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 0,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SideFeatures {
    material_cp: i32,
    extended_center_count: u8,
    advanced_piece_count: u8,
    bishop_pair: bool,
    passed_pawn_count: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionFeatures {
    white: SideFeatures,
    black: SideFeatures,
}

pub fn extract_features(board: &Board) -> PositionFeatures {
    PositionFeatures { white: side_features(board, Color::White), black: side_features(board, Color::Black) }
}

/// White-minus-black material balance in centipawns, used for the
/// multiplayer move's fast (non-analyzer) evaluation.
pub fn material_balance_cp(features: &PositionFeatures) -> i32 {
    features.white.material_cp - features.black.material_cp
}

fn side_features(board: &Board, color: Color) -> SideFeatures {
    let mut material_cp = 0;
    let mut extended_center_count = 0;
    let mut advanced_piece_count = 0;

    for piece in Piece::ALL {
        let squares = board.pieces(piece) & board.colors(color);
        material_cp += squares.len() as i32 * piece_value(piece);
        for sq in squares {
            let file_ok = matches!(sq.file() as u8, 2..=5);
            let rank_ok = matches!(sq.rank() as u8, 2..=5);
            if matches!(piece, Piece::Knight | Piece::Bishop | Piece::Queen) && file_ok && rank_ok {
                extended_center_count += 1;
            }
            let advanced = match color {
                Color::White => sq.rank() as u8 >= 4,
                Color::Black => (sq.rank() as u8) <= 3,
            };
            if matches!(piece, Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen) && advanced {
                advanced_piece_count += 1;
            }
        }
    }

    let bishop_pair = (board.pieces(Piece::Bishop) & board.colors(color)).len() >= 2;
    let passed_pawn_count = count_passed_pawns(board, color);

    SideFeatures { material_cp, extended_center_count, advanced_piece_count, bishop_pair, passed_pawn_count }
}

fn count_passed_pawns(board: &Board, color: Color) -> u8 {
    let mut count = 0;
    for sq in board.pieces(Piece::Pawn) & board.colors(color) {
        let file = sq.file() as i8;
        let mut blocked = false;
        for f in (file - 1).max(0)..=(file + 1).min(7) {
            let Some(check_file) = cozy_chess::File::try_index(f as usize) else { continue };
            for rank in 0u8..8 {
                let Some(check_rank) = cozy_chess::Rank::try_index(rank as usize) else { continue };
                let ahead = match color {
                    Color::White => check_rank as u8 > sq.rank() as u8,
                    Color::Black => (check_rank as u8) < sq.rank() as u8,
                };
                if !ahead {
                    continue;
                }
                let check_sq = cozy_chess::Square::new(check_file, check_rank);
                if board.piece_on(check_sq) == Some(Piece::Pawn) && board.color_on(check_sq) == Some(!color) {
                    blocked = true;
                }
            }
        }
        if !blocked {
            count += 1;
        }
    }
    count
}

pub struct CoachBriefing {
    pub summary: Vec<String>,
    pub strengths: Vec<String>,
    pub pressure_points: Vec<String>,
    pub plans: Vec<String>,
    pub key_lines: Vec<String>,
    /// Three-sentence summarizer output, or [`CoachBriefing::fallback_text`]
    /// verbatim when no summarizer is configured or the call failed. Filled
    /// in by [`CoachSummarizer::summarize`] after the briefing is built.
    pub narrative: String,
}

impl CoachBriefing {
    /// The structured fallback: every section rendered as one paragraph per
    /// heading, used verbatim when no summarizer is configured.
    pub fn fallback_text(&self) -> String {
        let mut out = String::new();
        push_section(&mut out, "Summary", &self.summary);
        push_section(&mut out, "Strengths", &self.strengths);
        push_section(&mut out, "Pressure Points", &self.pressure_points);
        push_section(&mut out, "Plans", &self.plans);
        push_section(&mut out, "Key Lines", &self.key_lines);
        out.trim_end().to_string()
    }
}

fn push_section(out: &mut String, heading: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    out.push_str(heading);
    out.push_str(":\n");
    for line in lines {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

pub fn build_briefing(
    board: &Board,
    eval_cp: i32,
    engine_color: Side,
    mover_color: Side,
    last_player_commentary: Option<&str>,
    multi_pv: &[ScoredLine],
) -> CoachBriefing {
    let features = extract_features(board);
    let summary = build_summary(&features, eval_cp, engine_color, mover_color, last_player_commentary);
    let (strengths, pressure_points) = build_strengths_and_pressure(&features);
    let plans = build_plans(&features);
    let key_lines = build_key_lines(multi_pv);
    CoachBriefing { summary, strengths, pressure_points, plans, key_lines, narrative: String::new() }
}

fn build_summary(
    features: &PositionFeatures,
    eval_cp: i32,
    engine_color: Side,
    mover_color: Side,
    last_player_commentary: Option<&str>,
) -> Vec<String> {
    let mut lines = Vec::new();

    let material_diff = features.white.material_cp - features.black.material_cp;
    lines.push(match material_diff {
        d if d > 50 => format!("White holds a material edge of {} centipawns.", d),
        d if d < -50 => format!("Black holds a material edge of {} centipawns.", -d),
        _ => "Material is roughly balanced.".to_string(),
    });

    lines.push(match features.white.extended_center_count.cmp(&features.black.extended_center_count) {
        std::cmp::Ordering::Greater => "White's pieces dominate the extended center.".to_string(),
        std::cmp::Ordering::Less => "Black's pieces dominate the extended center.".to_string(),
        std::cmp::Ordering::Equal => "Central control is shared evenly.".to_string(),
    });

    let mover_features = match mover_color {
        Side::White => &features.white,
        Side::Black => &features.black,
    };
    lines.push(format!(
        "{} has {} advanced piece(s) in play.",
        if mover_color == Side::White { "White" } else { "Black" },
        mover_features.advanced_piece_count
    ));

    lines.push(format!(
        "Evaluation stands at {:+} centipawns from White's perspective ({} to move next).",
        eval_cp,
        if engine_color == Side::White { "the engine" } else { "the player" }
    ));

    if features.white.bishop_pair != features.black.bishop_pair {
        let owner = if features.white.bishop_pair { "White" } else { "Black" };
        lines.push(format!("{} keeps the bishop pair.", owner));
    }

    if features.white.passed_pawn_count > 0 || features.black.passed_pawn_count > 0 {
        lines.push(format!(
            "Passed pawns: White {}, Black {}.",
            features.white.passed_pawn_count, features.black.passed_pawn_count
        ));
    }

    if let Some(commentary) = last_player_commentary {
        lines.push(format!("Last move: {}", commentary));
    }

    lines
}

fn build_strengths_and_pressure(features: &PositionFeatures) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut pressure = Vec::new();

    let material_diff = features.white.material_cp - features.black.material_cp;
    if material_diff > 120 {
        strengths.push("White is ahead on material.".to_string());
        pressure.push("Black is down material and needs compensation.".to_string());
    } else if material_diff < -120 {
        strengths.push("Black is ahead on material.".to_string());
        pressure.push("White is down material and needs compensation.".to_string());
    }

    let center_diff = features.white.extended_center_count as i32 - features.black.extended_center_count as i32;
    if center_diff > 1 {
        strengths.push("White's central occupation is dominant.".to_string());
        pressure.push("Black lacks central space to maneuver.".to_string());
    } else if center_diff < -1 {
        strengths.push("Black's central occupation is dominant.".to_string());
        pressure.push("White lacks central space to maneuver.".to_string());
    }

    let activity_diff = features.white.advanced_piece_count as i32 - features.black.advanced_piece_count as i32;
    if activity_diff > 1 {
        strengths.push("White's pieces are significantly more active.".to_string());
        pressure.push("Black's pieces are passive and need activating.".to_string());
    } else if activity_diff < -1 {
        strengths.push("Black's pieces are significantly more active.".to_string());
        pressure.push("White's pieces are passive and need activating.".to_string());
    }

    if features.white.bishop_pair && !features.black.bishop_pair {
        strengths.push("White retains the bishop pair.".to_string());
    } else if features.black.bishop_pair && !features.white.bishop_pair {
        strengths.push("Black retains the bishop pair.".to_string());
    }

    let passed_diff = features.white.passed_pawn_count as i32 - features.black.passed_pawn_count as i32;
    if passed_diff > 0 {
        strengths.push("White has an outside passed pawn to push.".to_string());
    } else if passed_diff < 0 {
        strengths.push("Black has an outside passed pawn to push.".to_string());
    }

    (strengths, pressure)
}

fn build_plans(features: &PositionFeatures) -> Vec<String> {
    let mut plans = Vec::new();
    plans.push(dominant_plan_sentence("White", &features.white, &features.black));
    plans.push(dominant_plan_sentence("Black", &features.black, &features.white));
    plans
}

fn dominant_plan_sentence(name: &str, own: &SideFeatures, opponent: &SideFeatures) -> String {
    if own.passed_pawn_count > opponent.passed_pawn_count {
        return format!("{} should push the passed pawn toward promotion.", name);
    }
    if own.advanced_piece_count > opponent.advanced_piece_count {
        return format!("{} should press the activity advantage with direct threats.", name);
    }
    if own.extended_center_count > opponent.extended_center_count {
        return format!("{} should consolidate central control before expanding.", name);
    }
    if own.material_cp > opponent.material_cp {
        return format!("{} should trade pieces to simplify into the won endgame.", name);
    }
    format!("{} should look for the most active developing move.", name)
}

fn build_key_lines(multi_pv: &[ScoredLine]) -> Vec<String> {
    multi_pv
        .iter()
        .map(|line| format!("{:+}: {}", line.eval_cp, line.san_line.join(" ")))
        .collect()
}

/// Calls the optional LLM summarizer endpoint to condense a [`CoachBriefing`]
/// into exactly three sentences. Falls back to [`CoachBriefing::fallback_text`]
/// verbatim when no URL is configured or the call fails for any reason.
pub struct CoachSummarizer {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    model: String,
}

impl CoachSummarizer {
    pub fn new(url: Option<String>, api_key: Option<String>, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .expect("reqwest client builds with static config");
        Self { client, url, api_key, model }
    }

    pub async fn summarize(&self, briefing: &CoachBriefing) -> String {
        let structured = briefing.fallback_text();
        let Some(url) = self.url.as_deref() else {
            return structured;
        };
        match self.call(url, &structured).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "coach summarizer call failed, falling back to structured briefing");
                structured
            }
        }
    }

    async fn call(&self, url: &str, structured: &str) -> Result<String, reqwest::Error> {
        let mut request = self.client.post(url).json(&serde_json::json!({
            "model": self.model,
            "instructions": "Summarize this chess coaching briefing in exactly three sentences.",
            "input": structured,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        let body: SummarizerResponse = response.json().await?;
        Ok(body.summary)
    }
}

#[derive(serde::Deserialize)]
struct SummarizerResponse {
    summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    #[error("too many coach summaries requested for this session, please wait")]
    RateLimited,
}

/// Sliding-window limiter: at most `max_calls` successful calls per
/// `window` per session. One queue per session, timestamps popped from
/// the front once they age past the window.
pub struct CoachRateLimiter {
    window: Duration,
    max_calls: usize,
    usage: Mutex<std::collections::HashMap<String, VecDeque<i64>>>,
}

impl CoachRateLimiter {
    pub fn new(window: Duration, max_calls: usize) -> Self {
        Self { window, max_calls, usage: Mutex::new(std::collections::HashMap::new()) }
    }

    /// Disabled entirely when either bound is zero, matching the original
    /// service's `if not window or not max_calls: return` early-out.
    pub async fn check(&self, session_id: &str) -> Result<(), CoachError> {
        if self.window.is_zero() || self.max_calls == 0 {
            return Ok(());
        }
        let now = now_ms();
        let cutoff = now - self.window.as_millis() as i64;
        let mut usage = self.usage.lock().await;
        let timestamps = usage.entry(session_id.to_string()).or_default();
        while matches!(timestamps.front(), Some(t) if *t < cutoff) {
            timestamps.pop_front();
        }
        if timestamps.len() >= self.max_calls {
            return Err(CoachError::RateLimited);
        }
        timestamps.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_up_to_max_then_blocks() {
        let limiter = CoachRateLimiter::new(Duration::from_secs(10), 2);
        assert!(limiter.check("s1").await.is_ok());
        assert!(limiter.check("s1").await.is_ok());
        assert!(matches!(limiter.check("s1").await, Err(CoachError::RateLimited)));
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled_when_zero() {
        let limiter = CoachRateLimiter::new(Duration::from_secs(0), 0);
        for _ in 0..10 {
            assert!(limiter.check("s1").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_is_per_session() {
        let limiter = CoachRateLimiter::new(Duration::from_secs(10), 1);
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("b").await.is_ok());
        assert!(limiter.check("a").await.is_err());
    }

    #[test]
    fn test_extract_features_starting_position_balanced() {
        let board = Board::default();
        let features = extract_features(&board);
        assert_eq!(features.white.material_cp, features.black.material_cp);
        assert!(features.white.bishop_pair);
        assert!(features.black.bishop_pair);
    }

    #[test]
    fn test_build_key_lines_formats_eval_and_moves() {
        let lines = build_key_lines(&[ScoredLine { eval_cp: 35, san_line: vec!["Nf3".into(), "Nc6".into()] }]);
        assert_eq!(lines, vec!["+35: Nf3 Nc6".to_string()]);
    }

    #[tokio::test]
    async fn test_summarizer_falls_back_without_configured_url() {
        let summarizer = CoachSummarizer::new(None, None, "gpt-4o-mini".to_string());
        let board = Board::default();
        let briefing = build_briefing(&board, 0, Side::Black, Side::White, None, &[]);
        let narrative = summarizer.summarize(&briefing).await;
        assert_eq!(narrative, briefing.fallback_text());
    }
}
