use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Detect critical control point events in plant sensor data.
///
/// Runs the same rule set either against a live feed, polling on an
/// interval, or over a historical window in one pass.
#[derive(Parser, Debug)]
#[command(name = "ccp-detect", version, about = "CCP event detection")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Settings profile: `CCP_{PROFILE}_*` variables take precedence
    #[arg(long, global = true, env = "CCP_PROFILE", default_value = "")]
    pub profile: String,

    /// Log output format
    #[arg(long, global = true, env = "CCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the data source until interrupted
    Live(LiveArgs),
    /// Replay a time window in one pass
    Historical(HistoricalArgs),
    /// Validate a rule set and print the result as JSON
    Validate(ValidateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Inputs and outputs shared by both run modes. Unset flags fall back to
/// the `CCP_*` environment.
#[derive(Args, Debug, Default)]
pub struct PathArgs {
    /// Rule set YAML
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Sample file (JSON Lines)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Event log
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Write the dashboard grid here when the run ends
    #[arg(long)]
    pub dashboard: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Poll interval, e.g. `60s` or `5m`
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// Stop after this many polls
    #[arg(long)]
    pub max_ticks: Option<u64>,
}

#[derive(Args, Debug)]
pub struct HistoricalArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Window start (inclusive), RFC 3339 or `YYYY-MM-DD HH:MM:SS` UTC
    #[arg(long, value_parser = parse_timestamp)]
    pub start: DateTime<Utc>,

    /// Window end (exclusive)
    #[arg(long, value_parser = parse_timestamp)]
    pub end: DateTime<Utc>,

    /// Write the alerts of the replay as a JSON array
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Also log each alert as it would have been sent live
    #[arg(long)]
    pub notify: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Rule set YAML
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    match ccp_core::duration::parse_duration(s) {
        Ok(d) if d.is_zero() => Err("poll interval must be greater than zero".to_string()),
        Ok(d) => Ok(d),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    ccp_core::sample::parse_timestamp(s).map_err(|e| e.to_string())
}
