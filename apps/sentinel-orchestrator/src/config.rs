use std::time::Duration;

use crate::error::OrchestratorError;

/// Environment-derived configuration for the orchestrator binary. Every
/// required field missing from the environment is a `Config` error, which
/// is terminal for the process before the HTTP listener ever binds.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub database_url: String,
    pub database_auth_token: Option<String>,
    pub engram_object_store_path: String,
    pub engram_index_url: String,
    pub nvd_api_key: Option<String>,
    pub port: u16,
    pub staleness_sweep_interval: Duration,
    pub scan_scheduler_interval: Duration,
    pub shutdown_grace_period: Duration,
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("SENTINEL_DB_URL"))
            .map_err(|_| {
                OrchestratorError::Config("DATABASE_URL or SENTINEL_DB_URL must be set".into())
            })?;

        let database_auth_token = std::env::var("SENTINEL_DB_AUTH_TOKEN").ok();

        let engram_object_store_path = std::env::var("ENGRAM_OBJECT_STORE_PATH")
            .map_err(|_| OrchestratorError::Config("ENGRAM_OBJECT_STORE_PATH must be set".into()))?;

        let engram_index_url = std::env::var("ENGRAM_INDEX_URL")
            .unwrap_or_else(|_| format!("{}/engram-index.db", engram_object_store_path));

        let nvd_api_key = std::env::var("NVD_API_KEY").ok();

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| OrchestratorError::Config("PORT must be a valid u16".into()))?;

        let staleness_sweep_interval = parse_secs_env("STALENESS_SWEEP_INTERVAL_SECS", 300)?;
        let scan_scheduler_interval = parse_secs_env("SCAN_SCHEDULER_INTERVAL_SECS", 60)?;
        let shutdown_grace_period = parse_secs_env("SHUTDOWN_GRACE_PERIOD_SECS", 30)?;

        Ok(Self {
            database_url,
            database_auth_token,
            engram_object_store_path,
            engram_index_url,
            nvd_api_key,
            port,
            staleness_sweep_interval,
            scan_scheduler_interval,
            shutdown_grace_period,
        })
    }
}

fn parse_secs_env(name: &str, default: u64) -> Result<Duration, OrchestratorError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| OrchestratorError::Config(format!("{name} must be a valid integer"))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
