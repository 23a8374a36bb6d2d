//! Pure ply-annotation builder: no I/O, no clock. Given a before/after
//! position pair and the engine's evaluation before and after the move, it
//! derives the SAN, verdict, themes, and commentary for that ply.
//!
//! Grounded in the theme-detection rules in spec.md §4.2 and, for the
//! structural predicates (extended center, x-ray corridor), the bitboard
//! queries already exposed by `cozy_chess::Board` (`piece_on`, `color_on`,
//! `checkers`) in the same style as `chess::pgn::san`'s disambiguation logic.

use chess::pgn::san::format_san;
use cozy_chess::{Board, Color, File, Move, Piece, Rank, Square};

use crate::domain::{PlyAnnotation, PlySide, Theme, Verdict};

pub struct InsightInputs<'a> {
    pub before: &'a Board,
    pub after: &'a Board,
    pub mv: Move,
    pub mover_color: Color,
    pub side: PlySide,
    pub prev_eval_cp: i32,
    pub new_eval_cp: i32,
    pub ply: u32,
    pub timestamp_ms: i64,
}

pub fn build_insight(inputs: InsightInputs<'_>) -> PlyAnnotation {
    let san = format_san(inputs.before, inputs.mv);
    let raw_delta = inputs.new_eval_cp - inputs.prev_eval_cp;
    let delta_cp = if inputs.mover_color == Color::Black { -raw_delta } else { raw_delta };
    let verdict = Verdict::from_delta_cp(delta_cp);
    let themes = detect_themes(inputs.before, inputs.after, inputs.mv, inputs.mover_color);
    let actor = match inputs.side {
        PlySide::Player => "You",
        _ => "The engine",
    };
    let commentary = build_commentary(actor, verdict, &themes);

    PlyAnnotation {
        ply: inputs.ply,
        side: inputs.side,
        uci: format!("{}{}{}", inputs.mv.from, inputs.mv.to, promo_suffix(inputs.mv)),
        san,
        eval_cp: inputs.new_eval_cp,
        delta_cp,
        verdict,
        commentary,
        themes,
        timestamp_ms: inputs.timestamp_ms,
    }
}

fn promo_suffix(mv: Move) -> String {
    match mv.promotion {
        Some(Piece::Queen) => "q".to_string(),
        Some(Piece::Rook) => "r".to_string(),
        Some(Piece::Bishop) => "b".to_string(),
        Some(Piece::Knight) => "n".to_string(),
        _ => String::new(),
    }
}

fn build_commentary(actor: &str, verdict: Verdict, themes: &[Theme]) -> String {
    let mut out = format!("{} {}.", actor, verdict.sentence());
    if let Some(first) = themes.first() {
        out.push(' ');
        out.push_str(first.tip());
    }
    match verdict {
        Verdict::Blunder => out.push_str(" Look for a way to fight back."),
        Verdict::Brilliant => out.push_str(" That's a move worth remembering."),
        _ => {}
    }
    out
}

/// Themes are evaluated in the table order from spec.md §4.2, which is also
/// the fixed display order from §3.
fn detect_themes(before: &Board, after: &Board, mv: Move, mover: Color) -> Vec<Theme> {
    let mut themes = Vec::new();
    let Some(piece) = before.piece_on(mv.from) else { return themes };
    let is_capture = before.piece_on(mv.to).is_some();
    let captured_piece = before.piece_on(mv.to);

    if is_castle(before, mv) || piece == Piece::King {
        themes.push(Theme::KingSafety);
    }

    if is_central_control(piece, mv.to) {
        themes.push(Theme::CentralControl);
    }

    if is_piece_activity(before, after, piece, mv.to, mover) {
        themes.push(Theme::PieceActivity);
    }

    if is_capture {
        themes.push(Theme::MaterialPlay);
    }

    if let Some(captured) = captured_piece {
        if captured == piece {
            themes.push(Theme::Simplification);
        }
    }

    if !after.checkers().is_empty() || xrays_king(after, mv.to, piece, mover) {
        themes.push(Theme::KingAttack);
    }

    if piece == Piece::Pawn && is_passed_pawn(after, mv.to, mover) {
        themes.push(Theme::PassedPawn);
    }

    if piece == Piece::Pawn && pushes_into_opponent_half(mv.to, mover) {
        themes.push(Theme::SpaceAdvantage);
    }

    themes
}

fn is_castle(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.from).map(|c| board.king(c) == mv.from).unwrap_or(false)
        && (mv.from.file() as i8 - mv.to.file() as i8).unsigned_abs() > 1
}

fn is_central_control(piece: Piece, dest: Square) -> bool {
    match piece {
        Piece::Pawn => {
            matches!(dest.file(), File::D | File::E) && matches!(dest.rank(), Rank::Third | Rank::Fourth | Rank::Fifth | Rank::Sixth)
        }
        Piece::Knight | Piece::Bishop | Piece::Queen => is_extended_center(dest),
        _ => false,
    }
}

fn is_extended_center(sq: Square) -> bool {
    let file_ok = matches!(sq.file(), File::C | File::D | File::E | File::F);
    let rank_ok = matches!(sq.rank(), Rank::Third | Rank::Fourth | Rank::Fifth | Rank::Sixth);
    file_ok && rank_ok
}

fn is_piece_activity(before: &Board, after: &Board, piece: Piece, dest: Square, mover: Color) -> bool {
    match piece {
        Piece::Knight | Piece::Bishop | Piece::Queen => {
            if is_extended_center(dest) {
                return true;
            }
            advanced_into_opponent_half(dest, mover)
        }
        Piece::Rook => file_has_no_pawns(after, dest.file()),
        _ => {
            let _ = before;
            false
        }
    }
}

fn advanced_into_opponent_half(sq: Square, mover: Color) -> bool {
    match mover {
        Color::White => matches!(sq.rank(), Rank::Fifth | Rank::Sixth | Rank::Seventh | Rank::Eighth),
        Color::Black => matches!(sq.rank(), Rank::First | Rank::Second | Rank::Third | Rank::Fourth),
    }
}

fn pushes_into_opponent_half(sq: Square, mover: Color) -> bool {
    advanced_into_opponent_half(sq, mover)
}

fn file_has_no_pawns(board: &Board, file: File) -> bool {
    for rank in Rank::ALL {
        let sq = Square::new(file, rank);
        if board.piece_on(sq) == Some(Piece::Pawn) {
            return false;
        }
    }
    true
}

fn is_passed_pawn(board: &Board, sq: Square, mover: Color) -> bool {
    let file = sq.file() as i8;
    let files: Vec<File> = ((file - 1).max(0)..=(file + 1).min(7))
        .filter_map(|f| File::try_index(f as usize))
        .collect();
    let ahead_ranks: Vec<Rank> = Rank::ALL
        .into_iter()
        .filter(|r| match mover {
            Color::White => *r as u8 > sq.rank() as u8,
            Color::Black => (*r as u8) < sq.rank() as u8,
        })
        .collect();

    for file in files {
        for rank in &ahead_ranks {
            let check_sq = Square::new(file, *rank);
            if board.piece_on(check_sq) == Some(Piece::Pawn) && board.color_on(check_sq) == Some(mover.opposite()) {
                return false;
            }
        }
    }
    true
}

/// True if `mv_dest`'s occupant is a slider that attacks the enemy king
/// through an empty corridor (no blocking piece between them).
fn xrays_king(board: &Board, slider_sq: Square, piece: Piece, mover: Color) -> bool {
    if !matches!(piece, Piece::Bishop | Piece::Rook | Piece::Queen) {
        return false;
    }
    let king_sq = board.king(mover.opposite());
    match squares_between(slider_sq, king_sq, piece) {
        Some(corridor) => corridor.into_iter().all(|sq| board.piece_on(sq).is_none()),
        None => false,
    }
}

/// Squares strictly between `a` and `b` along a file, rank, or diagonal that
/// `piece` can move along; `None` if they are not aligned for that piece.
fn squares_between(a: Square, b: Square, piece: Piece) -> Option<Vec<Square>> {
    let (af, ar) = (a.file() as i8, a.rank() as i8);
    let (bf, br) = (b.file() as i8, b.rank() as i8);
    let (df, dr) = (bf - af, br - ar);

    let aligned = match piece {
        Piece::Rook => df == 0 || dr == 0,
        Piece::Bishop => df.abs() == dr.abs() && df != 0,
        Piece::Queen => df == 0 || dr == 0 || (df.abs() == dr.abs() && df != 0),
        _ => false,
    };
    if !aligned || (df == 0 && dr == 0) {
        return None;
    }

    let step_f = df.signum();
    let step_r = dr.signum();
    let mut squares = Vec::new();
    let mut f = af + step_f;
    let mut r = ar + step_r;
    while (f, r) != (bf, br) {
        if !(0..8).contains(&f) || !(0..8).contains(&r) {
            return None;
        }
        let file = File::index(f as usize);
        let rank = Rank::index(r as usize);
        squares.push(Square::new(file, rank));
        f += step_f;
        r += step_r;
    }
    Some(squares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cozy_chess::{File as F, Rank as R};

    fn mv(from: Square, to: Square) -> Move {
        Move { from, to, promotion: None }
    }

    #[test]
    fn test_verdict_monotone_examples() {
        assert_eq!(Verdict::from_delta_cp(200), Verdict::Brilliant);
        assert_eq!(Verdict::from_delta_cp(-200), Verdict::Blunder);
        assert_eq!(Verdict::from_delta_cp(0), Verdict::Sharp);
    }

    #[test]
    fn test_king_move_is_king_safety() {
        let before = Board::default();
        let mut after = before.clone();
        let castle_like = mv(Square::new(F::E, R::First), Square::new(F::E, R::Second));
        after.play_unchecked(castle_like);
        let themes = detect_themes(&before, &after, castle_like, Color::White);
        assert!(themes.contains(&Theme::KingSafety));
    }

    #[test]
    fn test_central_pawn_push_detected() {
        let before = Board::default();
        let mut after = before.clone();
        let e4 = mv(Square::new(F::E, R::Second), Square::new(F::E, R::Fourth));
        after.play_unchecked(e4);
        let themes = detect_themes(&before, &after, e4, Color::White);
        assert!(themes.contains(&Theme::CentralControl));
    }

    #[test]
    fn test_build_insight_commentary_prefix() {
        let before = Board::default();
        let mut after = before.clone();
        let e4 = mv(Square::new(F::E, R::Second), Square::new(F::E, R::Fourth));
        after.play_unchecked(e4);
        let insight = build_insight(InsightInputs {
            before: &before,
            after: &after,
            mv: e4,
            mover_color: Color::White,
            side: PlySide::Player,
            prev_eval_cp: 20,
            new_eval_cp: 30,
            ply: 1,
            timestamp_ms: 0,
        });
        assert!(insight.commentary.starts_with("You "));
        assert_eq!(insight.san, "e4");
    }
}
