//! Lightweight opening recognition from a UCI move prefix.
//!
//! Mirrors the fixed table and longest-prefix matching rule the original
//! service used (spec.md §4.9): a line is tagged with whichever `OPENINGS`
//! entry shares the longest prefix with the moves played so far.

use crate::domain::OpeningTag;

struct OpeningEntry {
    eco: &'static str,
    name: &'static str,
    uci: &'static [&'static str],
}

static OPENINGS: &[OpeningEntry] = &[
    OpeningEntry { eco: "C60", name: "Ruy Lopez", uci: &["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"] },
    OpeningEntry { eco: "C50", name: "Italian Game", uci: &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4"] },
    OpeningEntry { eco: "B30", name: "Sicilian Defence", uci: &["e2e4", "c7c5"] },
    OpeningEntry {
        eco: "B90",
        name: "Sicilian Najdorf",
        uci: &["e2e4", "c7c5", "g1f3", "d7d6", "d2d4", "c5d4", "f3d4", "g8f6", "b1c3", "a7a6"],
    },
    OpeningEntry { eco: "B12", name: "Caro-Kann Defence", uci: &["e2e4", "c7c6", "d2d4", "d7d5"] },
    OpeningEntry { eco: "C00", name: "French Defence", uci: &["e2e4", "e7e6", "d2d4", "d7d5"] },
    OpeningEntry { eco: "B01", name: "Scandinavian Defence", uci: &["e2e4", "d7d5"] },
    OpeningEntry { eco: "D30", name: "Queen's Gambit Declined", uci: &["d2d4", "d7d5", "c2c4", "e7e6"] },
    OpeningEntry { eco: "D10", name: "Slav Defence", uci: &["d2d4", "d7d5", "c2c4", "c7c6"] },
    OpeningEntry { eco: "E60", name: "King's Indian Defence", uci: &["d2d4", "g8f6", "c2c4", "g7g6"] },
    OpeningEntry { eco: "D02", name: "London System", uci: &["d2d4", "d7d5", "c1f4"] },
    OpeningEntry {
        eco: "E21",
        name: "Nimzo-Indian Defence",
        uci: &["d2d4", "g8f6", "c2c4", "e7e6", "b1c3", "f8b4"],
    },
];

/// Returns the opening whose prefix matches the most played moves, or
/// `None` if no entry shares even a one-move prefix with `moves`.
pub fn detect_opening(moves: &[String]) -> Option<OpeningTag> {
    let mut best: Option<&OpeningEntry> = None;
    for entry in OPENINGS {
        let compare_len = moves.len().min(entry.uci.len());
        if compare_len == 0 {
            continue;
        }
        let matches = moves[..compare_len]
            .iter()
            .zip(&entry.uci[..compare_len])
            .all(|(played, expected)| played == expected);
        if matches && best.map(|b| entry.uci.len() > b.uci.len()).unwrap_or(true) {
            best = Some(entry);
        }
    }
    best.map(|entry| OpeningTag { eco: entry.eco.to_string(), name: entry.name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_ruy_lopez_on_full_prefix() {
        let moves: Vec<String> =
            ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"].into_iter().map(String::from).collect();
        let tag = detect_opening(&moves).unwrap();
        assert_eq!(tag.eco, "C60");
        assert_eq!(tag.name, "Ruy Lopez");
    }

    #[test]
    fn test_prefers_longest_match_over_shorter_sicilian() {
        let moves: Vec<String> = ["e2e4", "c7c5", "g1f3", "d7d6", "d2d4", "c5d4", "f3d4", "g8f6", "b1c3", "a7a6"]
            .into_iter()
            .map(String::from)
            .collect();
        let tag = detect_opening(&moves).unwrap();
        assert_eq!(tag.eco, "B90");
    }

    #[test]
    fn test_no_match_returns_none() {
        let moves: Vec<String> = ["g2g3"].into_iter().map(String::from).collect();
        assert!(detect_opening(&moves).is_none());
    }

    #[test]
    fn test_partial_prefix_still_matches_shorter_line() {
        let moves: Vec<String> = ["e2e4", "c7c5"].into_iter().map(String::from).collect();
        let tag = detect_opening(&moves).unwrap();
        assert_eq!(tag.eco, "B30");
    }
}
