//! Shared value types for the session engine: the session record, ply
//! annotations, and the small closed enums the rest of the crate builds on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s {
            "white" => Some(Side::White),
            "black" => Some(Side::Black),
            _ => None,
        }
    }
}

impl From<cozy_chess::Color> for Side {
    fn from(c: cozy_chess::Color) -> Self {
        match c {
            cozy_chess::Color::White => Side::White,
            cozy_chess::Color::Black => Side::Black,
        }
    }
}

impl From<Side> for cozy_chess::Color {
    fn from(s: Side) -> Self {
        match s {
            Side::White => cozy_chess::Color::White,
            Side::Black => cozy_chess::Color::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploitMode {
    Auto,
    On,
    Off,
}

impl ExploitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExploitMode::Auto => "auto",
            ExploitMode::On => "on",
            ExploitMode::Off => "off",
        }
    }

    pub fn parse(s: &str) -> Option<ExploitMode> {
        match s {
            "auto" => Some(ExploitMode::Auto),
            "on" => Some(ExploitMode::On),
            "off" => Some(ExploitMode::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Grandmaster,
    Custom,
}

/// `(skill_level, nominal_strength, think_time_s)`, reconciled across the
/// distilled spec's scattered per-difficulty mentions. See DESIGN.md.
#[derive(Debug, Clone, Copy)]
pub struct DifficultyParams {
    pub skill_level: u8,
    pub nominal_strength: u16,
    pub think_time_s: f64,
}

impl Difficulty {
    pub fn params(self, explicit_rating: Option<u16>, explicit_depth: Option<u8>) -> DifficultyParams {
        match self {
            Difficulty::Beginner => DifficultyParams { skill_level: 1, nominal_strength: 1320, think_time_s: 0.2 },
            Difficulty::Intermediate => DifficultyParams { skill_level: 5, nominal_strength: 1600, think_time_s: 0.25 },
            Difficulty::Advanced => DifficultyParams { skill_level: 10, nominal_strength: 2000, think_time_s: 0.35 },
            Difficulty::Expert => DifficultyParams { skill_level: 15, nominal_strength: 2300, think_time_s: 0.45 },
            Difficulty::Grandmaster => DifficultyParams { skill_level: 20, nominal_strength: 2600, think_time_s: 0.6 },
            Difficulty::Custom => DifficultyParams {
                skill_level: explicit_depth.map(|d| d.min(20)).unwrap_or(15),
                nominal_strength: explicit_rating.unwrap_or(1600),
                think_time_s: 0.4,
            },
        }
    }
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
            Difficulty::Grandmaster => "grandmaster",
            Difficulty::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Difficulty> {
        match s {
            "beginner" => Some(Difficulty::Beginner),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            "expert" => Some(Difficulty::Expert),
            "grandmaster" => Some(Difficulty::Grandmaster),
            "custom" => Some(Difficulty::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Checkmate,
    Stalemate,
    Resigned,
    Draw,
    Abandoned,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Checkmate => "checkmate",
            ResultKind::Stalemate => "stalemate",
            ResultKind::Resigned => "resigned",
            ResultKind::Draw => "draw",
            ResultKind::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<ResultKind> {
        match s {
            "checkmate" => Some(ResultKind::Checkmate),
            "stalemate" => Some(ResultKind::Stalemate),
            "resigned" => Some(ResultKind::Resigned),
            "draw" => Some(ResultKind::Draw),
            "abandoned" => Some(ResultKind::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Player,
    Engine,
    White,
    Black,
    Draw,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Winner::Player => "player",
            Winner::Engine => "engine",
            Winner::White => "white",
            Winner::Black => "black",
            Winner::Draw => "draw",
        }
    }

    pub fn parse(s: &str) -> Option<Winner> {
        match s {
            "player" => Some(Winner::Player),
            "engine" => Some(Winner::Engine),
            "white" => Some(Winner::White),
            "black" => Some(Winner::Black),
            "draw" => Some(Winner::Draw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Blunder,
    Mistake,
    Inaccuracy,
    Sharp,
    Good,
    Great,
    Brilliant,
}

impl Verdict {
    /// Categorical quality label from a mover-relative cp delta, per the
    /// thresholds in spec.md §4.2. Monotone in `delta_cp` by construction:
    /// the branches are listed in strictly increasing threshold order.
    pub fn from_delta_cp(delta_cp: i32) -> Verdict {
        if delta_cp >= 150 {
            Verdict::Brilliant
        } else if delta_cp >= 80 {
            Verdict::Great
        } else if delta_cp >= 30 {
            Verdict::Good
        } else if delta_cp > -30 {
            Verdict::Sharp
        } else if delta_cp > -80 {
            Verdict::Inaccuracy
        } else if delta_cp > -150 {
            Verdict::Mistake
        } else {
            Verdict::Blunder
        }
    }

    pub fn sentence(self) -> &'static str {
        match self {
            Verdict::Brilliant => "found a brilliant move",
            Verdict::Great => "played a great move",
            Verdict::Good => "played a good move",
            Verdict::Sharp => "kept the position sharp",
            Verdict::Inaccuracy => "played an inaccuracy",
            Verdict::Mistake => "made a mistake",
            Verdict::Blunder => "blundered",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Blunder => "blunder",
            Verdict::Mistake => "mistake",
            Verdict::Inaccuracy => "inaccuracy",
            Verdict::Sharp => "sharp",
            Verdict::Good => "good",
            Verdict::Great => "great",
            Verdict::Brilliant => "brilliant",
        }
    }

    pub fn parse(s: &str) -> Option<Verdict> {
        match s {
            "blunder" => Some(Verdict::Blunder),
            "mistake" => Some(Verdict::Mistake),
            "inaccuracy" => Some(Verdict::Inaccuracy),
            "sharp" => Some(Verdict::Sharp),
            "good" => Some(Verdict::Good),
            "great" => Some(Verdict::Great),
            "brilliant" => Some(Verdict::Brilliant),
            _ => None,
        }
    }
}

/// Display order fixed by spec.md §3; also the order themes are detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    KingSafety,
    CentralControl,
    MaterialPlay,
    PieceActivity,
    KingAttack,
    SpaceAdvantage,
    PassedPawn,
    Simplification,
}

impl Theme {
    pub fn label(self) -> &'static str {
        match self {
            Theme::KingSafety => "king safety",
            Theme::CentralControl => "central control",
            Theme::MaterialPlay => "material play",
            Theme::PieceActivity => "piece activity",
            Theme::KingAttack => "king attack",
            Theme::SpaceAdvantage => "space advantage",
            Theme::PassedPawn => "passed pawn",
            Theme::Simplification => "simplification",
        }
    }

    pub fn tip(self) -> &'static str {
        match self {
            Theme::KingSafety => "Keeping the king tucked away pays off later.",
            Theme::CentralControl => "Central squares control the whole board.",
            Theme::MaterialPlay => "Material won needs to be converted carefully.",
            Theme::PieceActivity => "An active piece is worth more than a passive one.",
            Theme::KingAttack => "Pressure on the king can outweigh material.",
            Theme::SpaceAdvantage => "Extra space restricts the opponent's options.",
            Theme::PassedPawn => "A passed pawn is a long-term asset.",
            Theme::Simplification => "Trading down favors the side that's ahead.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::KingSafety => "king_safety",
            Theme::CentralControl => "central_control",
            Theme::MaterialPlay => "material_play",
            Theme::PieceActivity => "piece_activity",
            Theme::KingAttack => "king_attack",
            Theme::SpaceAdvantage => "space_advantage",
            Theme::PassedPawn => "passed_pawn",
            Theme::Simplification => "simplification",
        }
    }

    pub fn parse(s: &str) -> Option<Theme> {
        match s {
            "king_safety" => Some(Theme::KingSafety),
            "central_control" => Some(Theme::CentralControl),
            "material_play" => Some(Theme::MaterialPlay),
            "piece_activity" => Some(Theme::PieceActivity),
            "king_attack" => Some(Theme::KingAttack),
            "space_advantage" => Some(Theme::SpaceAdvantage),
            "passed_pawn" => Some(Theme::PassedPawn),
            "simplification" => Some(Theme::Simplification),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlySide {
    Player,
    Engine,
    White,
    Black,
}

impl PlySide {
    pub fn as_str(self) -> &'static str {
        match self {
            PlySide::Player => "player",
            PlySide::Engine => "engine",
            PlySide::White => "white",
            PlySide::Black => "black",
        }
    }

    pub fn parse(s: &str) -> Option<PlySide> {
        match s {
            "player" => Some(PlySide::Player),
            "engine" => Some(PlySide::Engine),
            "white" => Some(PlySide::White),
            "black" => Some(PlySide::Black),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlyAnnotation {
    pub ply: u32,
    pub side: PlySide,
    pub uci: String,
    pub san: String,
    pub eval_cp: i32,
    pub delta_cp: i32,
    pub verdict: Verdict,
    pub commentary: String,
    pub themes: Vec<Theme>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clocks {
    pub player_ms: i64,
    pub engine_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpponentProfile {
    /// Style vector: named axes in [-1.0, 1.0], e.g. "aggression", "patience".
    pub style: std::collections::BTreeMap<String, f32>,
    /// Theme label -> observed frequency, used as a motif-risk map.
    pub motif_risk: std::collections::BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningTag {
    pub eco: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub player_color: Side,
    pub engine_color: Side,
    pub exploit_mode: ExploitMode,
    pub difficulty: Difficulty,
    pub engine_depth: u8,
    pub engine_rating: u16,
    pub status: SessionStatus,
    pub result: Option<ResultKind>,
    pub winner: Option<Winner>,
    pub fen: String,
    pub initial_fen: String,
    pub clocks: Clocks,
    pub move_log: Vec<PlyAnnotation>,
    pub opponent_profile: OpponentProfile,
    pub player_id: Option<String>,
    pub player_rating: Option<i32>,
    pub player_rating_delta: Option<i32>,
    pub is_multiplayer: bool,
    pub player_white_id: Option<String>,
    pub player_black_id: Option<String>,
    pub last_eval_cp: i32,
    pub created_at: i64,
    pub updated_at: i64,
    pub rating_applied: bool,
}

impl SessionRecord {
    pub fn side_to_move(&self) -> Side {
        let parsed: Result<cozy_chess::Board, _> = self.fen.parse();
        parsed
            .map(|b| b.side_to_move().into())
            .unwrap_or(Side::White)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SessionStatus::Completed | SessionStatus::Abandoned)
    }

    pub fn next_ply(&self) -> u32 {
        self.move_log.last().map(|p| p.ply + 1).unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredColor {
    Auto,
    White,
    Black,
}

impl PreferredColor {
    pub fn complementary(self, other: PreferredColor) -> bool {
        matches!(
            (self, other),
            (PreferredColor::Auto, _)
                | (_, PreferredColor::Auto)
                | (PreferredColor::White, PreferredColor::Black)
                | (PreferredColor::Black, PreferredColor::White)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeControl {
    pub initial_ms: i64,
    pub increment_ms: i64,
}

impl TimeControl {
    pub fn bucket(&self) -> String {
        format!("{}:{}", self.initial_ms, self.increment_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: String,
    pub bucket: String,
    pub preferred_color: PreferredColor,
    pub time_control: TimeControl,
    pub enqueued_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchNotification {
    pub session_id: String,
    pub player_color: Side,
    pub opponent_id: String,
}

pub const QUEUE_ENTRY_TTL_SECS: i64 = 3600;
pub const MATCH_NOTIFICATION_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub current_rating: Option<i32>,
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
