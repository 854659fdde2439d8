use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use ccp_engine::{DashboardView, Detector, EventStore, LiveOptions};
use ccp_ingest::JsonlSource;
use ccp_notify::{AlertDispatcher, ReportNotifier, TracingNotifier};
use ccp_rules::validation::validate_yaml;
use ccp_rules::{RuleSet, RuleSetLoader};

use crate::cli::{HistoricalArgs, LiveArgs};
use crate::config::RunConfig;

fn load_rules(path: &Path) -> Result<Arc<RuleSet>> {
    let rules = RuleSetLoader::load_file(path)
        .with_context(|| format!("failed to load rule set {}", path.display()))?;
    Ok(Arc::new(rules))
}

fn write_dashboard(detector: &Detector, path: &Path) -> Result<()> {
    let view = DashboardView::from_snapshot(detector.rules(), &detector.store().snapshot());
    let json = view.to_json().context("failed to serialize dashboard")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("failed to write dashboard {}", path.display()))?;
    info!(path = %path.display(), active_cells = view.active_cells(), "dashboard written");
    Ok(())
}

/// Flip `tx` on ctrl-c.
fn spawn_shutdown_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would end the run; keep it alive.
                warn!(error = %e, "cannot listen for ctrl-c; stop the process to end the run");
                std::future::pending::<()>().await;
            }
        }
    });
}

pub async fn live(run: RunConfig, args: &LiveArgs) -> Result<()> {
    let rules = load_rules(&run.rules)?;
    let store = EventStore::load(&run.events)
        .with_context(|| format!("failed to load event log {}", run.events.display()))?;
    let dispatcher = AlertDispatcher::new(vec![Box::new(TracingNotifier::new())]);
    let mut detector = Detector::new(rules, store, dispatcher);
    let source = JsonlSource::new(&run.data);

    let (tx, rx) = watch::channel(false);
    spawn_shutdown_listener(tx);

    let opts = LiveOptions {
        poll_interval: run.poll_interval,
        retry: run.retry.clone(),
        max_ticks: args.max_ticks,
    };
    let summary = detector.run_live(&source, &opts, rx).await?;

    if let Some(path) = &run.dashboard {
        write_dashboard(&detector, path)?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn historical(run: RunConfig, args: &HistoricalArgs) -> Result<()> {
    let rules = load_rules(&run.rules)?;
    let report = ReportNotifier::new();
    let mut dispatcher = AlertDispatcher::new(vec![Box::new(report.clone())]);
    if args.notify {
        dispatcher.add_channel(Box::new(TracingNotifier::new()));
    }

    // A replay writes a fresh log for its window.
    let mut detector = Detector::new(rules, EventStore::new(&run.events), dispatcher);
    let source = JsonlSource::new(&run.data);
    let summary = detector
        .run_historical(&source, &run.retry, args.start, args.end)
        .await
        .context("historical replay failed")?;

    if detector.store().is_degraded() {
        warn!(path = %run.events.display(), "event log was not written; see earlier errors");
    }
    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!(path = %path.display(), alerts = report.len(), "alert report written");
    }
    if let Some(path) = &run.dashboard {
        write_dashboard(&detector, path)?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rule set {}", path.display()))?;
    let result = validate_yaml(&yaml);
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.valid {
        bail!("rule set {} is invalid: {}", path.display(), result.error_summary());
    }
    Ok(())
}
