use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Start-up fails if required variables are missing or out of range.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    /// Sent only when set; some models reject non-default temperatures.
    pub openai_temperature: Option<f32>,
    pub openai_max_tokens: u32,
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    /// Per-attempt bound on the completion call.
    pub timeout_seconds: u64,
    /// Fixed delay between completion attempts.
    pub retry_delay_ms: u64,
    pub profiler_max_sessions: usize,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Keys are the upper-case env names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let debug = parse_or(&lookup, "DEBUG", false)?;

        let openai_temperature = match lookup("OPENAI_TEMPERATURE") {
            Some(raw) => Some(parse_value::<f32>("OPENAI_TEMPERATURE", &raw)?),
            None => None,
        };
        if let Some(t) = openai_temperature {
            check_range("OPENAI_TEMPERATURE", t, 0.0, 2.0)?;
        }

        let openai_max_tokens = parse_or(&lookup, "OPENAI_MAX_TOKENS", 500u32)?;
        check_range("OPENAI_MAX_TOKENS", openai_max_tokens, 1, 8000)?;

        let port = parse_or(&lookup, "PORT", 8000u16)?;
        check_range("PORT", port, 1, u16::MAX)?;

        let max_retries = parse_or(&lookup, "MAX_RETRIES", 3u32)?;
        check_range("MAX_RETRIES", max_retries, 1, 10)?;

        let timeout_seconds = parse_or(&lookup, "TIMEOUT_SECONDS", 30u64)?;
        check_range("TIMEOUT_SECONDS", timeout_seconds, 1, 300)?;

        let profiler_max_sessions = parse_or(&lookup, "PROFILER_MAX_SESSIONS", 1024usize)?;
        check_range("PROFILER_MAX_SESSIONS", profiler_max_sessions, 1, usize::MAX)?;

        Ok(Config {
            openai_api_key: require(&lookup, "OPENAI_API_KEY")?,
            openai_base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.core42.ai/v1".to_string()),
            openai_model: lookup("OPENAI_MODEL").unwrap_or_else(|| "gpt-5".to_string()),
            openai_temperature,
            openai_max_tokens,
            app_name: lookup("APP_NAME").unwrap_or_else(|| "CV Matching API".to_string()),
            app_version: lookup("APP_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            debug,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            max_retries,
            timeout_seconds,
            retry_delay_ms: parse_or(&lookup, "RETRY_DELAY_MS", 1000u64)?,
            profiler_max_sessions,
            rust_log: lookup("RUST_LOG")
                .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string()),
        })
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_lookup(|key| map.get(key).cloned())
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: '{raw}'"))
}

fn check_range<T: PartialOrd + std::fmt::Display>(key: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        bail!("{key} must be between {min} and {max}, got {value}");
    }
    Ok(())
}
