//! Error taxonomy (spec.md §7): one `thiserror` enum per module, converging
//! into `ServiceError`, which maps to a stable `tonic::Status` code.
//!
//! Follows the teacher's per-module `#[derive(thiserror::Error)]` style
//! (`examples/benediktms-chesstty/server/src/session/commands.rs`).

use tonic::Status;

use crate::coach::CoachError;
use crate::matchmaking::MatchmakingError;
use engine::EngineGatewayError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("illegal move: {0}")]
    IllegalMove(String),
    #[error("it is not your turn")]
    ConflictWrongTurn,
    #[error("the engine is not to move")]
    ConflictEngineNotToMove,
    #[error("the game is already over")]
    GameOver,
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("forbidden for this player")]
    Forbidden,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("persistence failure: {0}")]
    Backend(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Engine(#[from] EngineGatewayError),
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),
    #[error(transparent)]
    Coach(#[from] CoachError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("feature disabled")]
    FeatureDisabled,
    #[error("summarizer unavailable")]
    SummarizerUnavailable,
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Status {
        match err {
            ServiceError::Session(SessionError::IllegalMove(m)) => Status::invalid_argument(m),
            ServiceError::Session(SessionError::ConflictWrongTurn) => {
                Status::failed_precondition("it is not your turn")
            }
            ServiceError::Session(SessionError::ConflictEngineNotToMove) => {
                Status::failed_precondition("the engine is not to move")
            }
            ServiceError::Session(SessionError::GameOver) => Status::aborted("the game is already over"),
            ServiceError::Session(SessionError::NotFound(m)) => Status::not_found(m),
            ServiceError::Session(SessionError::Forbidden) => Status::permission_denied("forbidden for this player"),
            ServiceError::Persistence(PersistenceError::NotFound(m)) => Status::not_found(m),
            ServiceError::Persistence(PersistenceError::Backend(m)) => Status::internal(m),
            ServiceError::Engine(EngineGatewayError::InvalidFen(m)) => Status::invalid_argument(m),
            ServiceError::Engine(EngineGatewayError::EngineTerminal) => {
                Status::aborted("analyzer reports game over")
            }
            ServiceError::Engine(EngineGatewayError::EngineUnavailable(m)) => Status::unavailable(m),
            ServiceError::Matchmaking(MatchmakingError::BackendUnavailable(m)) => Status::unavailable(m),
            ServiceError::Coach(CoachError::RateLimited) => Status::resource_exhausted("coach rate limit exceeded"),
            ServiceError::Unauthorized => Status::unauthenticated("missing or invalid token"),
            ServiceError::FeatureDisabled => Status::unimplemented("feature disabled"),
            ServiceError::SummarizerUnavailable => Status::internal("coach summary unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_move_maps_to_invalid_argument() {
        let status: Status = ServiceError::Session(SessionError::IllegalMove("e9e9".into())).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_rate_limited_maps_to_resource_exhausted() {
        let status: Status = ServiceError::Coach(CoachError::RateLimited).into();
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
    }

    #[test]
    fn test_not_found_maps_correctly() {
        let status: Status = ServiceError::Session(SessionError::NotFound("abc".into())).into();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }
}
