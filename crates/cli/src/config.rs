//! Run settings: `CCP_*` environment first, command-line flags on top.

use std::path::PathBuf;
use std::time::Duration;

use ccp_core::config::RetryConfig;
use ccp_core::Config;

use crate::cli::PathArgs;

/// Resolved inputs and outputs of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub rules: PathBuf,
    pub data: PathBuf,
    pub events: PathBuf,
    pub dashboard: Option<PathBuf>,
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl RunConfig {
    pub fn resolve(env: &Config, args: &PathArgs) -> Self {
        Self {
            rules: args.rules.clone().unwrap_or_else(|| env.paths.rules.clone()),
            data: args.data.clone().unwrap_or_else(|| env.paths.data.clone()),
            events: args.events.clone().unwrap_or_else(|| env.paths.event_log.clone()),
            dashboard: args.dashboard.clone().or_else(|| env.paths.dashboard.clone()),
            poll_interval: env.live.poll_interval,
            retry: env.retry.clone(),
        }
    }

    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        if let Some(interval) = interval {
            self.poll_interval = interval;
        }
        self
    }
}
