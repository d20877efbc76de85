use anyhow::{Context, Result, anyhow};
use std::{
    env,
    net::SocketAddr,
    str::FromStr,
    time::Duration,
};

use crate::ratelimit::RateLimitPolicy;

pub const DEFAULT_GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
    pub rate_limit: RateLimitConfig,
    pub relay: RelayConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
    /// `0` disables the idle-key sweep.
    pub sweep_interval_seconds: u64,
}

impl RateLimitConfig {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.max_requests, Duration::from_secs(self.window_seconds))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Checked per request so the gateway can start without it.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_file_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!("unsupported LOG_FORMAT: {s}")),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let rate_limit = RateLimitConfig {
            max_requests: parse_env(&lookup, "RATE_LIMIT_MAX_REQUESTS", 50u32),
            window_seconds: parse_env(&lookup, "RATE_LIMIT_WINDOW_SECONDS", 3 * 60 * 60u64),
            sweep_interval_seconds: parse_env(&lookup, "RATE_LIMIT_SWEEP_SECONDS", 0u64),
        };
        if rate_limit.window_seconds == 0 {
            return Err(anyhow!("RATE_LIMIT_WINDOW_SECONDS must be greater than zero"));
        }

        let timeout_seconds = parse_env(&lookup, "UPSTREAM_TIMEOUT_SECONDS", 60u64);
        if timeout_seconds == 0 {
            return Err(anyhow!("UPSTREAM_TIMEOUT_SECONDS must be greater than zero"));
        }

        let relay = RelayConfig {
            api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            endpoint: lookup("GEMINI_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
            timeout: Duration::from_secs(timeout_seconds),
            max_file_bytes: parse_env(&lookup, "MAX_FILE_BYTES", 6usize << 20),
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| anyhow!(e))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            max_body_bytes: parse_env(&lookup, "MAX_BODY_BYTES", 25usize << 20),
            rate_limit,
            relay,
            log_format,
        })
    }
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}
