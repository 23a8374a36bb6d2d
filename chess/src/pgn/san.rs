use cozy_chess::{Board, Color, File, Move, Piece, Square};

/// Render `mv` (legal in `board`) as Standard Algebraic Notation.
///
/// Handles castling, disambiguation (file, rank, or both when needed),
/// captures, promotion, and the `+`/`#` suffix for check/checkmate.
pub fn format_san(board: &Board, mv: Move) -> String {
    let piece = match board.piece_on(mv.from) {
        Some(p) => p,
        None => return format_move_simple(mv),
    };

    let mut san = if is_castle(board, mv) {
        castle_san(mv)
    } else {
        let is_capture = board.piece_on(mv.to).is_some() || is_en_passant(board, mv, piece);

        let mut s = String::new();
        match piece {
            Piece::Pawn => {
                if is_capture {
                    s.push(file_to_char(mv.from));
                    s.push('x');
                }
                s.push(file_to_char(mv.to));
                s.push(rank_to_char(mv.to));
                if let Some(promo) = mv.promotion {
                    s.push('=');
                    s.push(promotion_char(promo));
                }
            }
            _ => {
                s.push(piece_letter(piece));
                s.push_str(&disambiguation(board, mv, piece));
                if is_capture {
                    s.push('x');
                }
                s.push(file_to_char(mv.to));
                s.push(rank_to_char(mv.to));
            }
        }
        s
    };

    if let Some(after) = try_play(board, mv) {
        if !after.checkers().is_empty() {
            san.push(if is_checkmate(&after) { '#' } else { '+' });
        }
    }

    san
}

/// Parse a SAN token (without move-number prefix) into a legal move.
///
/// Works by formatting every legal move in `board` and matching against
/// `san` with the check/mate suffix stripped, since suffixes are derived
/// rather than stored.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let target = san.trim_end_matches(['+', '#']);
    let mut found = None;
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });

    for mv in moves {
        let rendered = format_san(board, mv);
        let rendered_bare = rendered.trim_end_matches(['+', '#']);
        if rendered_bare == target {
            if found.is_some() {
                return Err(SanError::AmbiguousMove(san.to_string()));
            }
            found = Some(mv);
        }
    }

    found.ok_or_else(|| SanError::NoLegalMove(san.to_string()))
}

fn is_castle(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board
            .color_on(mv.from)
            .map(|c| board.king(c) == mv.from)
            .unwrap_or(false)
        && (mv.from.file() as i8 - mv.to.file() as i8).unsigned_abs() > 1
}

fn castle_san(mv: Move) -> String {
    // Kingside if destination file is east of the origin (g-file side).
    if mv.to.file() as u8 > mv.from.file() as u8 {
        "O-O".to_string()
    } else {
        "O-O-O".to_string()
    }
}

fn is_en_passant(board: &Board, mv: Move, piece: Piece) -> bool {
    piece == Piece::Pawn && Some(mv.to) == board.en_passant_square() && board.piece_on(mv.to).is_none()
}

fn try_play(board: &Board, mv: Move) -> Option<Board> {
    let mut b = board.clone();
    b.try_play(mv).ok().map(|_| b)
}

fn is_checkmate(board: &Board) -> bool {
    matches!(board.status(), cozy_chess::GameStatus::Won)
}

/// Disambiguation text for a non-pawn, non-king move: empty, file, rank, or both,
/// depending on how many same-type pieces of the same color can legally reach `mv.to`.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let color = board.color_on(mv.from).unwrap_or(Color::White);
    let mut others: Vec<Square> = Vec::new();

    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });

    for other in moves {
        if other.to == mv.to
            && other.from != mv.from
            && board.piece_on(other.from) == Some(piece)
            && board.color_on(other.from) == Some(color)
        {
            others.push(other.from);
        }
    }

    if others.is_empty() {
        return String::new();
    }

    let same_file = others.iter().any(|sq| sq.file() == mv.from.file());
    let same_rank = others.iter().any(|sq| sq.rank() == mv.from.rank());

    if !same_file {
        file_to_char(mv.from).to_string()
    } else if !same_rank {
        rank_to_char(mv.from).to_string()
    } else {
        format!("{}{}", file_to_char(mv.from), rank_to_char(mv.from))
    }
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::King => 'K',
        Piece::Queen => 'Q',
        Piece::Rook => 'R',
        Piece::Bishop => 'B',
        Piece::Knight => 'N',
        Piece::Pawn => unreachable!("pawns have no piece letter"),
    }
}

fn promotion_char(piece: Piece) -> char {
    match piece {
        Piece::Queen => 'Q',
        Piece::Rook => 'R',
        Piece::Bishop => 'B',
        Piece::Knight => 'N',
        _ => '?',
    }
}

fn format_move_simple(mv: Move) -> String {
    format!("{}{}", format_square(mv.from), format_square(mv.to))
}

fn format_square(sq: Square) -> String {
    format!("{}{}", file_to_char(sq), rank_to_char(sq))
}

fn file_to_char(square: Square) -> char {
    match square.file() {
        File::A => 'a',
        File::B => 'b',
        File::C => 'c',
        File::D => 'd',
        File::E => 'e',
        File::F => 'f',
        File::G => 'g',
        File::H => 'h',
    }
}

fn rank_to_char(square: Square) -> char {
    (b'1' + square.rank() as u8) as char
}

#[derive(Debug, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid square: {0}")]
    InvalidSquare(String),
    #[error("Invalid file: {0}")]
    InvalidFile(char),
    #[error("Invalid rank: {0}")]
    InvalidRank(char),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use cozy_chess::{Rank, Square};

    fn mv(from: Square, to: Square, promotion: Option<Piece>) -> Move {
        Move { from, to, promotion }
    }

    #[test]
    fn test_pawn_push() {
        let board = Board::default();
        let e4 = mv(Square::new(File::E, Rank::Second), Square::new(File::E, Rank::Fourth), None);
        assert_eq!(format_san(&board, e4), "e4");
    }

    #[test]
    fn test_knight_development() {
        let board = Board::default();
        let nf3 = mv(Square::new(File::G, Rank::First), Square::new(File::F, Rank::Third), None);
        assert_eq!(format_san(&board, nf3), "Nf3");
    }

    #[test]
    fn test_fools_mate_final_move_is_checkmate() {
        let mut board = Board::default();
        for (from, to) in [
            (Square::new(File::F, Rank::Second), Square::new(File::F, Rank::Third)),
            (Square::new(File::E, Rank::Seventh), Square::new(File::E, Rank::Fifth)),
            (Square::new(File::G, Rank::Second), Square::new(File::G, Rank::Fourth)),
        ] {
            board.play(mv(from, to, None));
        }
        let qh4 = mv(Square::new(File::D, Rank::Eighth), Square::new(File::H, Rank::Fourth), None);
        assert_eq!(format_san(&board, qh4), "Qh4#");
    }

    #[test]
    fn test_parse_san_roundtrip() {
        let board = Board::default();
        let mv = parse_san(&board, "e4").unwrap();
        assert_eq!(format_san(&board, mv), "e4");
    }
}
