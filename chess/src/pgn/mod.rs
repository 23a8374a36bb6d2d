pub mod san;

pub use san::{format_san, parse_san, SanError};

use std::collections::BTreeMap;

/// Ordered PGN header tags, in the conventional "Seven Tag Roster" order
/// plus any supplemental tags (`SetUp`/`FEN`).
#[derive(Debug, Clone, Default)]
pub struct PgnHeaders {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: String,
    pub setup_fen: Option<String>,
}

/// Render a finished or in-progress game as a PGN document.
///
/// `moves` are SAN tokens in play order (already rendered by [`san::format_san`]
/// against each position as it was played).
pub fn export_pgn(headers: &PgnHeaders, moves: &[String]) -> String {
    let mut tags: Vec<(&str, &str)> = vec![
        ("Event", &headers.event),
        ("Site", &headers.site),
        ("Date", &headers.date),
        ("Round", &headers.round),
        ("White", &headers.white),
        ("Black", &headers.black),
        ("Result", &headers.result),
    ];
    let fen_holder;
    if let Some(fen) = &headers.setup_fen {
        tags.push(("SetUp", "1"));
        fen_holder = fen.clone();
        tags.push(("FEN", &fen_holder));
    }

    let mut out = String::new();
    for (key, value) in &tags {
        out.push_str(&format!("[{} \"{}\"]\n", key, value));
    }
    out.push('\n');

    let mut movetext = String::new();
    for (i, mv) in moves.iter().enumerate() {
        if i % 2 == 0 {
            movetext.push_str(&format!("{}. ", i / 2 + 1));
        }
        movetext.push_str(mv);
        movetext.push(' ');
    }
    movetext.push_str(&headers.result);
    out.push_str(movetext.trim_end());
    out.push('\n');
    out
}

/// Map a session's `(result, winner)` pair to the PGN result token.
///
/// `"1/2-1/2"` when `winner == "draw"`; otherwise the color-appropriate token
/// for whichever side is named `"player"`/`"engine"`/`"white"`/`"black"`;
/// `"*"` when unresolved.
pub fn pgn_result_token(winner: Option<&str>, player_color: &str) -> &'static str {
    let Some(winner) = winner else { return "*" };
    if winner == "draw" {
        return "1/2-1/2";
    }
    let white_won = match winner {
        "white" => true,
        "black" => false,
        "player" => player_color == "white",
        "engine" => player_color != "white",
        _ => return "*",
    };
    if white_won {
        "1-0"
    } else {
        "0-1"
    }
}

/// Flatten a move list into the replay's tag-ordering used by callers that
/// need the roster as a `BTreeMap` (diagnostics, debug dumps).
pub fn headers_as_map(headers: &PgnHeaders) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("Event", headers.event.clone());
    map.insert("Site", headers.site.clone());
    map.insert("Date", headers.date.clone());
    map.insert("Round", headers.round.clone());
    map.insert("White", headers.white.clone());
    map.insert("Black", headers.black.clone());
    map.insert("Result", headers.result.clone());
    if let Some(fen) = &headers.setup_fen {
        map.insert("FEN", fen.clone());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_token_draw() {
        assert_eq!(pgn_result_token(Some("draw"), "white"), "1/2-1/2");
    }

    #[test]
    fn test_result_token_player_white_wins() {
        assert_eq!(pgn_result_token(Some("player"), "white"), "1-0");
    }

    #[test]
    fn test_result_token_player_black_wins() {
        assert_eq!(pgn_result_token(Some("player"), "black"), "0-1");
    }

    #[test]
    fn test_result_token_unresolved() {
        assert_eq!(pgn_result_token(None, "white"), "*");
    }

    #[test]
    fn test_export_pgn_headers_and_movetext() {
        let headers = PgnHeaders {
            event: "Chessica".to_string(),
            site: "Chessica".to_string(),
            date: "2026.07.26".to_string(),
            round: "-".to_string(),
            white: "You".to_string(),
            black: "Chessica Engine".to_string(),
            result: "1-0".to_string(),
            setup_fen: None,
        };
        let moves = vec!["e4".to_string(), "e5".to_string(), "Nf3".to_string()];
        let pgn = export_pgn(&headers, &moves);
        assert!(pgn.contains("[Event \"Chessica\"]"));
        assert!(pgn.contains("1. e4 e5 2. Nf3"));
        assert!(pgn.trim_end().ends_with("1-0"));
    }
}
