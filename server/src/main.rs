//! Session engine server entry point.
//!
//! Grounded in the teacher's `main.rs` (`examples/benediktms-chesstty/server/src/main.rs`):
//! tracing init, config load, persistence open, tonic server bind.

mod coach;
mod config;
mod domain;
mod error;
mod insight;
mod matchmaking;
mod opening;
mod persistence;
mod rating;
mod service;
mod session_engine;
mod streaming;

use std::sync::Arc;

use tonic::transport::Server;

use chess_proto::session::v1::session_service_server::SessionServiceServer;
use coach::{CoachRateLimiter, CoachSummarizer};
use config::Settings;
use engine::AnalyzerGateway;
use matchmaking::{InMemoryQueueBackend, Matchmaker, QueueBackend, RedisQueueBackend};
use persistence::{Database, SqliteSessionRepository};
use service::SessionServiceImpl;
use session_engine::SessionEngine;
use streaming::StreamHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let settings = Settings::from_env();
    tracing::info!(database_url = %settings.database_url, api_prefix = %settings.api_prefix, "starting session engine server");

    let db = Database::open(&settings.database_url).await?;
    let repo = SqliteSessionRepository::new(db.pool().clone());

    let gateway = Arc::new(AnalyzerGateway::new(
        settings.stockfish_path.clone().map(std::path::PathBuf::from),
        settings.engine_move_time_limit,
    ));

    let stream_hub = Arc::new(StreamHub::new());
    let coach_limiter = Arc::new(CoachRateLimiter::new(settings.coach_rate_limit_window, settings.coach_rate_limit_max));
    let coach_summarizer = Arc::new(CoachSummarizer::new(
        settings.coach_llm_url.clone(),
        settings.coach_llm_api_key.clone(),
        settings.coach_llm_model.clone(),
    ));

    let queue_backend: Box<dyn QueueBackend> = match &settings.redis_url {
        Some(url) => Box::new(RedisQueueBackend::new(url)?),
        None => Box::new(InMemoryQueueBackend::new()),
    };
    let matchmaker = Arc::new(Matchmaker::new(queue_backend));

    let engine = Arc::new(SessionEngine::new(repo, gateway, stream_hub.clone(), coach_limiter, coach_summarizer));
    let service = SessionServiceImpl::new(engine, matchmaker, stream_hub);

    let addr = "0.0.0.0:50051".parse()?;
    tracing::info!(%addr, "listening");
    Server::builder().add_service(SessionServiceServer::new(service)).serve(addr).await?;
    Ok(())
}
