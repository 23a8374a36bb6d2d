//! gRPC service implementation: `SessionService` wired onto `SessionEngine`,
//! `Matchmaker`, and `StreamHub`.
//!
//! Follows the teacher's flat service-impl style
//! (`examples/benediktms-chesstty/server/src/service/mod.rs`): one method per
//! RPC, `tracing::info!`/`debug!` at entry, domain errors mapped through
//! `From<ServiceError> for Status`, and the single streaming RPC built with
//! `async_stream::stream!` over a `tokio::sync::mpsc::Receiver`.

mod convert;

use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use chess_proto::session::v1 as pb;
use pb::session_service_server::SessionService;

use crate::domain::Clocks;
use crate::error::ServiceError;
use crate::matchmaking::{JoinResult, Matchmaker, StatusResult};
use crate::persistence::SessionRepository;
use crate::session_engine::{CreateMultiplayerSessionRequest, CreateSessionRequest, SessionEngine};
use crate::streaming::{StreamEvent, StreamHub};

pub struct SessionServiceImpl<R: SessionRepository> {
    engine: Arc<SessionEngine<R>>,
    matchmaker: Arc<Matchmaker>,
    stream_hub: Arc<StreamHub>,
}

impl<R: SessionRepository> SessionServiceImpl<R> {
    pub fn new(engine: Arc<SessionEngine<R>>, matchmaker: Arc<Matchmaker>, stream_hub: Arc<StreamHub>) -> Self {
        Self { engine, matchmaker, stream_hub }
    }
}

#[tonic::async_trait]
impl<R: SessionRepository + 'static> SessionService for SessionServiceImpl<R> {
    // ---- Session lifecycle -------------------------------------------

    async fn create_session(
        &self,
        request: Request<pb::CreateSessionRequest>,
    ) -> Result<Response<pb::CreateSessionResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(player_id = ?req.player_id, "create_session");
        let time_control = convert::time_control_from_pb(req.time_control);
        let engine_req = CreateSessionRequest {
            player_color: req.preferred_color.map(convert::side_from_pb).unwrap_or(crate::domain::Side::White),
            exploit_mode: convert::exploit_mode_from_pb(req.exploit_mode),
            difficulty: convert::difficulty_from_pb(req.difficulty),
            engine_depth: None,
            engine_rating: None,
            player_id: req.player_id,
            player_rating: req.player_rating,
            clocks: convert::clocks_from_time_control(&time_control),
        };
        let session = self.engine.create_session(engine_req).await.map_err(status_from)?;
        Ok(Response::new(pb::CreateSessionResponse { session: Some(convert::session_record_to_pb(&session)) }))
    }

    async fn get_session(
        &self,
        request: Request<pb::GetSessionRequest>,
    ) -> Result<Response<pb::GetSessionResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(session_id = %req.session_id, "get_session");
        let session = self.engine.get_session(&req.session_id).await.map_err(status_from)?;
        let opening = self.engine.opening_tag(&req.session_id).await.map_err(status_from)?;
        let pb_session = convert::session_record_to_pb_with_opening(&session, opening.as_ref());
        Ok(Response::new(pb::GetSessionResponse { session: Some(pb_session) }))
    }

    async fn submit_move(
        &self,
        request: Request<pb::SubmitMoveRequest>,
    ) -> Result<Response<pb::SubmitMoveResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, uci = %req.uci, "submit_move");
        let before = self.engine.get_session(&req.session_id).await.map_err(status_from)?;
        let prior_len = before.move_log.len();
        let uci = if req.uci.is_empty() { None } else { Some(req.uci) };
        let clocks = req
            .clocks
            .map(|c| Clocks { player_ms: c.player_ms, engine_ms: c.engine_ms })
            .unwrap_or(before.clocks.clone());
        let session = self
            .engine
            .submit_move(&req.session_id, uci, clocks, req.player_id)
            .await
            .map_err(status_from)?;

        let new_plies = &session.move_log[prior_len.min(session.move_log.len())..];
        let player_ply = new_plies.first().map(convert::ply_annotation_to_pb).unwrap_or_default();
        let engine_ply = new_plies.get(1).map(convert::ply_annotation_to_pb);

        Ok(Response::new(pb::SubmitMoveResponse {
            session: Some(convert::session_record_to_pb(&session)),
            player_ply: Some(player_ply),
            engine_ply,
        }))
    }

    async fn resign(&self, request: Request<pb::ResignRequest>) -> Result<Response<pb::ResignResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, "resign");
        let session = self.engine.resign(&req.session_id).await.map_err(status_from)?;
        Ok(Response::new(pb::ResignResponse { session: Some(convert::session_record_to_pb(&session)) }))
    }

    async fn coach(&self, request: Request<pb::CoachRequest>) -> Result<Response<pb::CoachResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(session_id = %req.session_id, "coach");
        let briefing = self.engine.coach(&req.session_id).await.map_err(status_from)?;
        Ok(Response::new(pb::CoachResponse {
            summary: briefing.summary,
            strengths: briefing.strengths,
            pressure_points: briefing.pressure_points,
            plans: briefing.plans,
            key_lines: briefing.key_lines,
            narrative: briefing.narrative,
        }))
    }

    async fn get_replay(
        &self,
        request: Request<pb::GetReplayRequest>,
    ) -> Result<Response<pb::GetReplayResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(session_id = %req.session_id, "get_replay");
        let session = self.engine.replay(&req.session_id).await.map_err(status_from)?;
        let moves = session.move_log.iter().map(convert::ply_annotation_to_pb).collect();
        Ok(Response::new(pb::GetReplayResponse { moves }))
    }

    async fn get_analysis(
        &self,
        request: Request<pb::GetAnalysisRequest>,
    ) -> Result<Response<pb::GetAnalysisResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(session_id = %req.session_id, ply = req.ply, "get_analysis");
        let pairs = self.engine.analysis(&req.session_id).await.map_err(status_from)?;
        let pair =
            pairs.into_iter().find(|p| p.ply == req.ply).ok_or_else(|| Status::not_found("ply not found"))?;
        let eval_cp = pair
            .engine_move
            .as_ref()
            .or(pair.player_move.as_ref())
            .map(|p| p.eval_cp)
            .unwrap_or(0);
        let lines = [pair.player_move.as_ref(), pair.engine_move.as_ref()]
            .into_iter()
            .flatten()
            .map(|p| pb::ScoredLine { uci: p.uci.clone(), san: p.san.clone(), eval_cp: p.eval_cp })
            .collect();
        Ok(Response::new(pb::GetAnalysisResponse { eval_cp, lines }))
    }

    async fn export_pgn(
        &self,
        request: Request<pb::ExportPgnRequest>,
    ) -> Result<Response<pb::ExportPgnResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(session_id = %req.session_id, "export_pgn");
        let pgn = self.engine.export_pgn(&req.session_id).await.map_err(status_from)?;
        Ok(Response::new(pb::ExportPgnResponse { pgn }))
    }

    // ---- Multiplayer ----------------------------------------------------

    async fn create_multiplayer_session(
        &self,
        request: Request<pb::CreateMultiplayerSessionRequest>,
    ) -> Result<Response<pb::CreateMultiplayerSessionResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(white = %req.player_white_id, black = %req.player_black_id, "create_multiplayer_session");
        let time_control = convert::time_control_from_pb(req.time_control);
        let session = self
            .engine
            .create_multiplayer_session(CreateMultiplayerSessionRequest {
                player_white_id: req.player_white_id,
                player_black_id: req.player_black_id,
                clocks: convert::clocks_from_time_control(&time_control),
            })
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::CreateMultiplayerSessionResponse {
            session: Some(convert::session_record_to_pb(&session)),
        }))
    }

    async fn join_queue(
        &self,
        request: Request<pb::JoinQueueRequest>,
    ) -> Result<Response<pb::JoinQueueResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(player_id = %req.player_id, "join_queue");
        let time_control = convert::time_control_from_pb(req.time_control);
        let preferred = convert::preferred_color_from_pb(req.preferred_color);
        let result = self
            .matchmaker
            .join(&req.player_id, time_control.clone(), preferred)
            .await
            .map_err(|e| status_from(ServiceError::Matchmaking(e)))?;

        let outcome = match result {
            JoinResult::Queued => pb::join_queue_response::Outcome::Queued(req.player_id.clone()),
            JoinResult::Matched { opponent_id, player_color, time_control } => {
                let (white_id, black_id) = if player_color == crate::domain::Side::White {
                    (req.player_id.clone(), opponent_id.clone())
                } else {
                    (opponent_id.clone(), req.player_id.clone())
                };
                let clocks = Clocks { player_ms: time_control.initial_ms, engine_ms: time_control.initial_ms };
                let session = self
                    .engine
                    .create_multiplayer_session(CreateMultiplayerSessionRequest {
                        player_white_id: white_id,
                        player_black_id: black_id,
                        clocks,
                    })
                    .await
                    .map_err(status_from)?;
                self.matchmaker
                    .attach_session(&opponent_id, &session.session_id, player_color.opposite())
                    .await
                    .map_err(|e| status_from(ServiceError::Matchmaking(e)))?;
                pb::join_queue_response::Outcome::Matched(convert::session_record_to_pb(&session))
            }
        };
        Ok(Response::new(pb::JoinQueueResponse { outcome: Some(outcome) }))
    }

    async fn leave_queue(
        &self,
        request: Request<pb::LeaveQueueRequest>,
    ) -> Result<Response<pb::LeaveQueueResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(player_id = %req.player_id, "leave_queue");
        self.matchmaker.leave(&req.player_id).await.map_err(|e| status_from(ServiceError::Matchmaking(e)))?;
        Ok(Response::new(pb::LeaveQueueResponse { removed: true }))
    }

    async fn queue_status(
        &self,
        request: Request<pb::QueueStatusRequest>,
    ) -> Result<Response<pb::QueueStatusResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(player_id = %req.player_id, "queue_status");
        let status = self
            .matchmaker
            .status(&req.player_id)
            .await
            .map_err(|e| status_from(ServiceError::Matchmaking(e)))?;
        let status = match status {
            StatusResult::None => pb::queue_status_response::Status::Idle(true),
            StatusResult::Queued => pb::queue_status_response::Status::Waiting(true),
            StatusResult::Matched(notification) => {
                let session = self.engine.get_session(&notification.session_id).await.map_err(status_from)?;
                pb::queue_status_response::Status::Matched(convert::session_record_to_pb(&session))
            }
        };
        Ok(Response::new(pb::QueueStatusResponse { status: Some(status) }))
    }

    async fn submit_multiplayer_move(
        &self,
        request: Request<pb::SubmitMultiplayerMoveRequest>,
    ) -> Result<Response<pb::SubmitMultiplayerMoveResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, player_id = %req.player_id, "submit_multiplayer_move");
        let session = self
            .engine
            .submit_multiplayer_move(&req.session_id, req.uci, &req.player_id)
            .await
            .map_err(status_from)?;
        let ply = session.move_log.last().map(convert::ply_annotation_to_pb).unwrap_or_default();
        Ok(Response::new(pb::SubmitMultiplayerMoveResponse {
            session: Some(convert::session_record_to_pb(&session)),
            ply: Some(ply),
        }))
    }

    async fn multiplayer_resign(
        &self,
        request: Request<pb::MultiplayerResignRequest>,
    ) -> Result<Response<pb::MultiplayerResignResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, player_id = %req.player_id, "multiplayer_resign");
        let session = self.engine.multiplayer_resign(&req.session_id, &req.player_id).await.map_err(status_from)?;
        Ok(Response::new(pb::MultiplayerResignResponse { session: Some(convert::session_record_to_pb(&session)) }))
    }

    async fn multiplayer_draw(
        &self,
        request: Request<pb::MultiplayerDrawRequest>,
    ) -> Result<Response<pb::MultiplayerDrawResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, player_id = %req.player_id, "multiplayer_draw");
        let session = self.engine.multiplayer_draw(&req.session_id).await.map_err(status_from)?;
        Ok(Response::new(pb::MultiplayerDrawResponse {
            session: Some(convert::session_record_to_pb(&session)),
            accepted: true,
        }))
    }

    async fn multiplayer_abort(
        &self,
        request: Request<pb::MultiplayerAbortRequest>,
    ) -> Result<Response<pb::MultiplayerAbortResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, player_id = %req.player_id, "multiplayer_abort");
        let session = self.engine.multiplayer_abort(&req.session_id).await.map_err(status_from)?;
        Ok(Response::new(pb::MultiplayerAbortResponse { session: Some(convert::session_record_to_pb(&session)) }))
    }

    // ---- Analytics / replay ----------------------------------------------

    async fn get_session_events(
        &self,
        request: Request<pb::GetSessionEventsRequest>,
    ) -> Result<Response<pb::GetSessionEventsResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(session_id = %req.session_id, "get_session_events");
        let events = self.engine.session_events(&req.session_id).await.map_err(status_from)?;
        Ok(Response::new(pb::GetSessionEventsResponse {
            events: events.iter().map(convert::event_record_to_pb).collect(),
        }))
    }

    async fn get_user_stats(
        &self,
        request: Request<pb::GetUserStatsRequest>,
    ) -> Result<Response<pb::GetUserStatsResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(player_id = %req.player_id, "get_user_stats");
        let stats = self.engine.user_stats(&req.player_id).await.map_err(status_from)?;
        Ok(Response::new(convert::user_stats_to_pb(&stats)))
    }

    type StreamSessionStream = Pin<Box<dyn Stream<Item = Result<pb::StreamSessionEvent, Status>> + Send>>;

    async fn stream_session(
        &self,
        request: Request<pb::StreamSessionRequest>,
    ) -> Result<Response<Self::StreamSessionStream>, Status> {
        let req = request.into_inner();
        tracing::info!(session_id = %req.session_id, "stream_session");
        let mut subscription = self
            .stream_hub
            .subscribe(&req.session_id)
            .map_err(|_| Status::not_found("session not found"))?;

        let stream = async_stream::stream! {
            while let Some(event) = subscription.receiver.recv().await {
                yield Ok(stream_event_to_pb(event));
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }
}

fn stream_event_to_pb(event: StreamEvent) -> pb::StreamSessionEvent {
    use pb::stream_session_event::Payload;
    let payload = match event {
        StreamEvent::EngineMove(v) => Payload::EngineMoveJson(v.to_string()),
        StreamEvent::PlayerMove(v) => Payload::PlayerMoveJson(v.to_string()),
        StreamEvent::GameOver(v) => Payload::GameOverJson(v.to_string()),
        StreamEvent::CoachUpdate(v) => Payload::CoachUpdateJson(v.to_string()),
    };
    pb::StreamSessionEvent { payload: Some(payload) }
}

fn status_from(err: ServiceError) -> Status {
    err.into()
}
