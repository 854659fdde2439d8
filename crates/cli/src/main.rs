mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ccp_core::Config;

use crate::cli::{CliArgs, Command, LogFormat};
use crate::config::RunConfig;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    ccp_core::config::load_dotenv();
    let args = CliArgs::parse();
    init_tracing(args.log_format);

    let env = Config::for_profile(&args.profile);
    env.log_summary();

    match &args.command {
        Command::Live(live) => {
            let run = RunConfig::resolve(&env, &live.paths).with_interval(live.interval);
            commands::live(run, live).await
        }
        Command::Historical(historical) => {
            let run = RunConfig::resolve(&env, &historical.paths);
            commands::historical(run, historical).await
        }
        Command::Validate(validate) => {
            let path = validate.rules.clone().unwrap_or_else(|| env.paths.rules.clone());
            commands::validate(&path)
        }
    }
}
