//! Domain <-> generated-protobuf conversions for the `session.v1` package.
//!
//! Kept separate from `service/mod.rs` so the RPC handlers read as thin
//! dispatch, matching the teacher's split between `service/mod.rs` and its
//! own message-mapping helpers.

use chess_proto::session::v1 as pb;

use crate::domain::{
    Clocks, Difficulty, EventRecord, ExploitMode, OpeningTag, OpponentProfile, PlyAnnotation, PlySide,
    PreferredColor, ResultKind, SessionRecord, SessionStatus, Side, TimeControl, UserStats, Verdict, Winner,
};

const DEFAULT_INITIAL_MS: i64 = 600_000;

pub fn side_to_pb(side: Side) -> i32 {
    match side {
        Side::White => pb::Side::White as i32,
        Side::Black => pb::Side::Black as i32,
    }
}

pub fn side_from_pb(v: i32) -> Side {
    match pb::Side::try_from(v).unwrap_or(pb::Side::Unspecified) {
        pb::Side::Black => Side::Black,
        _ => Side::White,
    }
}

pub fn exploit_mode_to_pb(mode: ExploitMode) -> i32 {
    match mode {
        ExploitMode::Auto => pb::ExploitMode::Auto as i32,
        ExploitMode::On => pb::ExploitMode::On as i32,
        ExploitMode::Off => pb::ExploitMode::Off as i32,
    }
}

pub fn exploit_mode_from_pb(v: i32) -> ExploitMode {
    match pb::ExploitMode::try_from(v).unwrap_or(pb::ExploitMode::Unspecified) {
        pb::ExploitMode::On => ExploitMode::On,
        pb::ExploitMode::Off => ExploitMode::Off,
        _ => ExploitMode::Auto,
    }
}

pub fn difficulty_to_pb(d: Difficulty) -> i32 {
    match d {
        Difficulty::Beginner => pb::Difficulty::Beginner as i32,
        Difficulty::Intermediate => pb::Difficulty::Intermediate as i32,
        Difficulty::Advanced => pb::Difficulty::Advanced as i32,
        Difficulty::Expert => pb::Difficulty::Expert as i32,
        Difficulty::Grandmaster => pb::Difficulty::Grandmaster as i32,
        Difficulty::Custom => pb::Difficulty::Custom as i32,
    }
}

pub fn difficulty_from_pb(v: i32) -> Difficulty {
    match pb::Difficulty::try_from(v).unwrap_or(pb::Difficulty::Unspecified) {
        pb::Difficulty::Beginner => Difficulty::Beginner,
        pb::Difficulty::Intermediate => Difficulty::Intermediate,
        pb::Difficulty::Advanced => Difficulty::Advanced,
        pb::Difficulty::Expert => Difficulty::Expert,
        pb::Difficulty::Grandmaster => Difficulty::Grandmaster,
        _ => Difficulty::Custom,
    }
}

pub fn session_status_to_pb(s: SessionStatus) -> i32 {
    match s {
        SessionStatus::Active => pb::SessionStatus::Active as i32,
        SessionStatus::Completed => pb::SessionStatus::Completed as i32,
        SessionStatus::Abandoned => pb::SessionStatus::Abandoned as i32,
    }
}

pub fn result_kind_to_pb(r: ResultKind) -> i32 {
    match r {
        ResultKind::Checkmate => pb::ResultKind::Checkmate as i32,
        ResultKind::Stalemate => pb::ResultKind::Stalemate as i32,
        ResultKind::Resigned => pb::ResultKind::Resigned as i32,
        ResultKind::Draw => pb::ResultKind::Draw as i32,
        ResultKind::Abandoned => pb::ResultKind::Abandoned as i32,
    }
}

pub fn winner_to_pb(w: Winner) -> i32 {
    match w {
        Winner::Player => pb::Winner::Player as i32,
        Winner::Engine => pb::Winner::Engine as i32,
        Winner::White => pb::Winner::White as i32,
        Winner::Black => pb::Winner::Black as i32,
        Winner::Draw => pb::Winner::Draw as i32,
    }
}

pub fn verdict_to_pb(v: Verdict) -> i32 {
    match v {
        Verdict::Blunder => pb::Verdict::Blunder as i32,
        Verdict::Mistake => pb::Verdict::Mistake as i32,
        Verdict::Inaccuracy => pb::Verdict::Inaccuracy as i32,
        Verdict::Sharp => pb::Verdict::Sharp as i32,
        Verdict::Good => pb::Verdict::Good as i32,
        Verdict::Great => pb::Verdict::Great as i32,
        Verdict::Brilliant => pb::Verdict::Brilliant as i32,
    }
}

pub fn theme_to_pb(t: crate::domain::Theme) -> i32 {
    use crate::domain::Theme;
    match t {
        Theme::KingSafety => pb::Theme::KingSafety as i32,
        Theme::CentralControl => pb::Theme::CentralControl as i32,
        Theme::MaterialPlay => pb::Theme::MaterialPlay as i32,
        Theme::PieceActivity => pb::Theme::PieceActivity as i32,
        Theme::KingAttack => pb::Theme::KingAttack as i32,
        Theme::SpaceAdvantage => pb::Theme::SpaceAdvantage as i32,
        Theme::PassedPawn => pb::Theme::PassedPawn as i32,
        Theme::Simplification => pb::Theme::Simplification as i32,
    }
}

pub fn ply_side_to_pb(s: &PlySide) -> i32 {
    match s {
        PlySide::Player => pb::PlySide::Player as i32,
        PlySide::Engine => pb::PlySide::Engine as i32,
        PlySide::White => pb::PlySide::White as i32,
        PlySide::Black => pb::PlySide::Black as i32,
    }
}

pub fn preferred_color_from_pb(v: i32) -> PreferredColor {
    match pb::PreferredColor::try_from(v).unwrap_or(pb::PreferredColor::Unspecified) {
        pb::PreferredColor::White => PreferredColor::White,
        pb::PreferredColor::Black => PreferredColor::Black,
        _ => PreferredColor::Auto,
    }
}

pub fn clocks_to_pb(c: &Clocks) -> pb::Clocks {
    pb::Clocks { player_ms: c.player_ms, engine_ms: c.engine_ms }
}

pub fn time_control_to_pb(tc: &TimeControl) -> pb::TimeControl {
    pb::TimeControl { initial_ms: tc.initial_ms, increment_ms: tc.increment_ms }
}

pub fn time_control_from_pb(tc: Option<pb::TimeControl>) -> TimeControl {
    match tc {
        Some(tc) => TimeControl { initial_ms: tc.initial_ms, increment_ms: tc.increment_ms },
        None => TimeControl { initial_ms: DEFAULT_INITIAL_MS, increment_ms: 0 },
    }
}

/// `submit_move`/`create_session` consume a single `Clocks` pair; a fresh
/// session's clocks both start at the time control's initial allotment.
pub fn clocks_from_time_control(tc: &TimeControl) -> Clocks {
    Clocks { player_ms: tc.initial_ms, engine_ms: tc.initial_ms }
}

pub fn opponent_profile_to_pb(p: &OpponentProfile) -> pb::OpponentProfile {
    pb::OpponentProfile {
        style: p.style.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        motif_risk: p.motif_risk.iter().map(|(k, v)| (k.clone(), *v)).collect(),
    }
}

pub fn opening_tag_to_pb(t: &OpeningTag) -> pb::OpeningTag {
    pb::OpeningTag { eco: t.eco.clone(), name: t.name.clone() }
}

pub fn ply_annotation_to_pb(p: &PlyAnnotation) -> pb::PlyAnnotation {
    pb::PlyAnnotation {
        ply: p.ply,
        side: ply_side_to_pb(&p.side),
        uci: p.uci.clone(),
        san: p.san.clone(),
        eval_cp: p.eval_cp,
        delta_cp: p.delta_cp,
        verdict: verdict_to_pb(p.verdict),
        commentary: p.commentary.clone(),
        themes: p.themes.iter().map(|t| theme_to_pb(*t)).collect(),
        timestamp_ms: p.timestamp_ms,
    }
}

pub fn session_record_to_pb(r: &SessionRecord) -> pb::SessionRecord {
    pb::SessionRecord {
        session_id: r.session_id.clone(),
        player_color: side_to_pb(r.player_color),
        engine_color: side_to_pb(r.engine_color),
        exploit_mode: exploit_mode_to_pb(r.exploit_mode),
        difficulty: difficulty_to_pb(r.difficulty),
        engine_depth: r.engine_depth as u32,
        engine_rating: r.engine_rating as u32,
        status: session_status_to_pb(r.status),
        result: r.result.map(result_kind_to_pb),
        winner: r.winner.map(winner_to_pb),
        fen: r.fen.clone(),
        initial_fen: r.initial_fen.clone(),
        clocks: Some(clocks_to_pb(&r.clocks)),
        move_log: r.move_log.iter().map(ply_annotation_to_pb).collect(),
        opponent_profile: Some(opponent_profile_to_pb(&r.opponent_profile)),
        player_id: r.player_id.clone(),
        player_rating: r.player_rating,
        player_rating_delta: r.player_rating_delta,
        is_multiplayer: r.is_multiplayer,
        player_white_id: r.player_white_id.clone(),
        player_black_id: r.player_black_id.clone(),
        last_eval_cp: r.last_eval_cp,
        created_at: r.created_at,
        updated_at: r.updated_at,
        opening_tag: None,
    }
}

pub fn session_record_to_pb_with_opening(r: &SessionRecord, opening: Option<&OpeningTag>) -> pb::SessionRecord {
    let mut out = session_record_to_pb(r);
    out.opening_tag = opening.map(opening_tag_to_pb);
    out
}

pub fn event_record_to_pb(e: &EventRecord) -> pb::EventRecord {
    pb::EventRecord {
        id: e.id,
        event_type: e.event_type.clone(),
        payload_json: e.payload.to_string(),
        created_at: e.created_at,
    }
}

pub fn user_stats_to_pb(s: &UserStats) -> pb::GetUserStatsResponse {
    pb::GetUserStatsResponse {
        games_played: s.games_played,
        wins: s.wins,
        losses: s.losses,
        draws: s.draws,
        current_rating: s.current_rating,
    }
}
