use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{format_duration, parse_duration};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_path(profile: &str, key: &str, default: &str) -> PathBuf {
    PathBuf::from(profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string()))
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_duration(profile: &str, key: &str, default: Duration) -> Duration {
    match profiled_env_opt(profile, key) {
        Some(raw) => match parse_duration(&raw) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "ignoring invalid duration");
                default
            }
        },
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Runtime settings for the detector, read from `CCP_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub paths: PathsConfig,
    pub live: LiveConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CCP_PROFILE`. When set (e.g. `PLANT2`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CCP_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            paths: PathsConfig::from_env_profiled(p),
            live: LiveConfig::from_env_profiled(p),
            retry: RetryConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  rules:       {}", self.paths.rules.display());
        tracing::info!("  data:        {}", self.paths.data.display());
        tracing::info!("  event log:   {}", self.paths.event_log.display());
        tracing::info!("  live:        poll_interval={}", format_duration(self.live.poll_interval));
        tracing::info!(
            "  retry:       attempts={}, base={}ms, cap={}ms",
            self.retry.max_attempts,
            self.retry.base_delay.as_millis(),
            self.retry.max_delay.as_millis()
        );
    }
}

// ── Paths ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// RuleSet YAML.
    pub rules: PathBuf,
    /// Sample source (JSON Lines).
    pub data: PathBuf,
    /// Persisted event log.
    pub event_log: PathBuf,
    /// Optional dashboard snapshot output.
    pub dashboard: Option<PathBuf>,
}

impl PathsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            rules: profiled_env_path(p, "CCP_RULES", "config/rules.yml"),
            data: profiled_env_path(p, "CCP_DATA", "data/samples.jsonl"),
            event_log: profiled_env_path(p, "CCP_EVENT_LOG", "data/events.json"),
            dashboard: profiled_env_opt(p, "CCP_DASHBOARD").map(PathBuf::from),
        }
    }
}

// ── Live mode ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub poll_interval: Duration,
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

impl LiveConfig {
    fn from_env_profiled(p: &str) -> Self {
        let mut poll_interval = profiled_env_duration(p, "CCP_POLL_INTERVAL", DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            tracing::warn!(
                key = "CCP_POLL_INTERVAL",
                default = %format_duration(DEFAULT_POLL_INTERVAL),
                "poll interval must be greater than zero; using default"
            );
            poll_interval = DEFAULT_POLL_INTERVAL;
        }
        Self { poll_interval }
    }
}

// ── Data source retry ─────────────────────────────────────────

/// Bounded exponential backoff for transient data source failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_attempts: profiled_env_u32(p, "CCP_RETRY_ATTEMPTS", 3).max(1),
            base_delay: Duration::from_millis(
                profiled_env_u32(p, "CCP_RETRY_BASE_MS", 200) as u64,
            ),
            max_delay: Duration::from_millis(
                profiled_env_u32(p, "CCP_RETRY_MAX_MS", 5_000) as u64,
            ),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(5_000),
        }
    }
}
