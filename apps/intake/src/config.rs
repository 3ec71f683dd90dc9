use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::intake::progress::ProgressConfig;

const DEFAULT_PARSER_ENDPOINT: &str = "http://127.0.0.1:8000/api/upload";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub parser_endpoint: String,
    /// Confirmed record sets go to Postgres when set, to the log otherwise.
    pub database_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub upload_timeout: Duration,
    /// Request body limit for the multipart routes.
    pub max_upload_bytes: usize,
    /// Sessions without user activity for this long are closed.
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub progress: ProgressConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let progress_step: u8 = parse_or(&lookup, "PROGRESS_STEP", 10)?;
        if progress_step == 0 {
            bail!("PROGRESS_STEP must be greater than zero");
        }
        let progress_interval_ms: u64 = parse_or(&lookup, "PROGRESS_INTERVAL_MS", 100)?;
        if progress_interval_ms == 0 {
            bail!("PROGRESS_INTERVAL_MS must be greater than zero");
        }
        let max_upload_bytes: usize =
            parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        if max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }
        let idle_ttl_secs: u64 = parse_or(&lookup, "SESSION_IDLE_TTL_SECS", 1800)?;
        let sweep_secs: u64 = parse_or(&lookup, "SESSION_SWEEP_INTERVAL_SECS", 60)?;
        if idle_ttl_secs == 0 || sweep_secs == 0 {
            bail!("SESSION_IDLE_TTL_SECS and SESSION_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Config {
            parser_endpoint: lookup("PARSER_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_PARSER_ENDPOINT.to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            upload_timeout: Duration::from_secs(parse_or(&lookup, "UPLOAD_TIMEOUT_SECS", 120)?),
            max_upload_bytes,
            session_idle_ttl: Duration::from_secs(idle_ttl_secs),
            session_sweep_interval: Duration::from_secs(sweep_secs),
            progress: ProgressConfig {
                step: progress_step,
                interval: Duration::from_millis(progress_interval_ms),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
