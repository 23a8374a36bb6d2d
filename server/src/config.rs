//! Server configuration, read from the environment.
//!
//! Follows the teacher's plain `std::env::var` style
//! (`examples/benediktms-chesstty/server/src/config.rs`), scaled up to the
//! full field list from SPEC_FULL.md §6 instead of the teacher's single
//! data-directory lookup.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_prefix: String,
    pub allow_origins: Vec<String>,
    pub websocket_url: String,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub engine_default_depth: u8,
    pub stockfish_path: Option<String>,
    pub engine_move_time_limit: f64,
    pub coach_llm_url: Option<String>,
    pub coach_llm_api_key: Option<String>,
    pub coach_llm_model: String,
    pub coach_rate_limit_window: Duration,
    pub coach_rate_limit_max: usize,
    pub jwt_secret: String,
    pub jwt_exp_minutes: i64,
    pub auth_feature_enabled: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            api_prefix: env_or("API_PREFIX", "/api/v1"),
            allow_origins: env_list("ALLOW_ORIGINS"),
            websocket_url: env_or("WEBSOCKET_URL", "ws://localhost:8080"),
            database_url: env_or("DATABASE_URL", "sqlite://session.db"),
            redis_url: std::env::var("REDIS_URL").ok(),
            engine_default_depth: env_parse("ENGINE_DEFAULT_DEPTH", 15),
            stockfish_path: std::env::var("STOCKFISH_PATH").ok(),
            engine_move_time_limit: env_parse("ENGINE_MOVE_TIME_LIMIT", 1.0),
            coach_llm_url: std::env::var("COACH_LLM_URL").ok(),
            coach_llm_api_key: std::env::var("COACH_LLM_API_KEY").ok(),
            coach_llm_model: env_or("COACH_LLM_MODEL", "gpt-4o-mini"),
            coach_rate_limit_window: Duration::from_secs(env_parse("COACH_RATE_LIMIT_WINDOW", 10)),
            coach_rate_limit_max: env_parse("COACH_RATE_LIMIT_MAX", 5),
            jwt_secret: env_or("JWT_SECRET", "dev-secret-change-me"),
            jwt_exp_minutes: env_parse("JWT_EXP_MINUTES", 60),
            auth_feature_enabled: env_parse("AUTH_FEATURE_ENABLED", false),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_list_splits_and_trims() {
        std::env::set_var("TEST_ALLOW_ORIGINS_CASE", "a, b ,c");
        let parsed = env_list("TEST_ALLOW_ORIGINS_CASE");
        assert_eq!(parsed, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        std::env::remove_var("TEST_ALLOW_ORIGINS_CASE");
    }

    #[test]
    fn test_env_parse_falls_back_on_missing() {
        std::env::remove_var("TEST_MISSING_FLOAT");
        let value: f64 = env_parse("TEST_MISSING_FLOAT", 1.0);
        assert_eq!(value, 1.0);
    }
}
