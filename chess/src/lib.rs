pub mod analysis;
pub mod board_display;
pub mod converters;
pub mod fen;
pub mod game;
pub mod pgn;
pub mod types;
pub mod uci;

pub use analysis::{AnalysisScore, EngineAnalysis};
pub use board_display::{DisplayBoard, DisplayBoardError};
pub use converters::parse_uci_move;
pub use game::{Game, GameError, HistoryEntry, StartPosition};
pub use types::{PieceColor, PieceKind};
pub use uci::{convert_uci_castling_to_cozy, format_uci_move};
