use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use ccp_core::config::RetryConfig;
use ccp_core::{Event, EventKey, EventStatus, Sample, Severity, TransitionKind, ANNOTATION_INCOMPLETE};
use ccp_ingest::MemorySource;
use ccp_notify::{Alert, AlertDispatcher, Notifier, NotifyError, ReportNotifier, TracingNotifier};
use ccp_rules::{RuleSet, RuleSetLoader};

use super::*;
use crate::error::EngineError;

const TURBIDITY: &str = r#"
tags:
  - tag_id: MF-TURB
    staleness_timeout: 10m
    sample_interval: 1m
rules:
  - rule_id: mf-turbidity
    tag_id: MF-TURB
    event_name: MF Process
    rule_type: threshold
    params: { operator: above, limit: 0.3 }
    min_duration: 5m
    clear_duration: 2m
"#;

const WITH_LEVEL: &str = r#"
tags:
  - tag_id: MF-LEVEL
    staleness_timeout: 5m
    sample_interval: 1m
  - tag_id: MF-TURB
    staleness_timeout: 10m
    sample_interval: 1m
rules:
  - rule_id: mf-turbidity
    tag_id: MF-TURB
    event_name: MF Process
    rule_type: threshold
    params: { operator: above, limit: 0.3 }
    min_duration: 5m
    clear_duration: 2m
  - rule_id: mf-level-frozen
    tag_id: MF-LEVEL
    event_name: MF Monitoring
    rule_type: stagnant
    params: { span: 30m }
    min_duration: 10m
"#;

fn at(min: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, 24, 0, 0, 0).unwrap() + chrono::Duration::minutes(min)
}

fn rules(yaml: &str) -> Arc<RuleSet> {
    Arc::new(RuleSetLoader::load_str(yaml).unwrap())
}

fn series(tag: &str, values: &[f64]) -> Vec<Sample> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Sample::new(tag, at(i as i64), *v))
        .collect()
}

fn detector(yaml: &str) -> (Detector, ReportNotifier) {
    let report = ReportNotifier::new();
    let dispatcher = AlertDispatcher::new(vec![Box::new(report.clone())]);
    (Detector::new(rules(yaml), EventStore::in_memory(), dispatcher), report)
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

#[test]
fn four_minute_run_logs_nothing() {
    let (mut det, _) = detector(TURBIDITY);
    let pending = det.replay(series("MF-TURB", &[0.1, 0.4, 0.35, 0.5, 0.45, 0.2]));
    assert!(pending.is_empty());
    assert!(det.store().is_empty());
    assert_eq!(det.machine().open_count(), 0);
    assert_eq!(det.summary().samples_applied, 6);
}

#[test]
fn six_minute_run_opens_and_resolves() {
    let (mut det, _) = detector(TURBIDITY);
    let pending = det.replay(series(
        "MF-TURB",
        &[0.1, 0.4, 0.45, 0.5, 0.4, 0.35, 0.6, 0.2, 0.2],
    ));

    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].kind, TransitionKind::Opened);
    assert_eq!(pending[1].kind, TransitionKind::Resolved);

    let events = det.store().snapshot();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.status, EventStatus::Resolved);
    assert_eq!(event.start_time, at(1));
    assert_eq!(event.end_time, Some(at(7)));
    assert_eq!(event.event_id, pending[0].event.event_id);
    assert_eq!(det.summary().events_opened, 1);
    assert_eq!(det.summary().events_resolved, 1);
}

#[test]
fn replay_order_does_not_matter() {
    let values = [0.1, 0.4, 0.45, 0.5, 0.4, 0.35, 0.6, 0.2, 0.2];
    let (mut a, _) = detector(TURBIDITY);
    a.replay(series("MF-TURB", &values));

    let mut shuffled = series("MF-TURB", &values);
    shuffled.reverse();
    let (mut b, _) = detector(TURBIDITY);
    b.replay(shuffled);

    assert_eq!(a.store().to_json().unwrap(), b.store().to_json().unwrap());
}

#[test]
fn silent_tag_becomes_a_stagnant_event() {
    let (mut det, _) = detector(WITH_LEVEL);
    let mut samples = series("MF-TURB", &[0.1; 26]);
    samples.push(Sample::new("MF-LEVEL", at(0), 1.0));
    samples.push(Sample::new("MF-LEVEL", at(20), 2.0));

    let pending = det.replay(samples);

    // Stale from minute 6 (more than 5m after the last reading) until the
    // reading at minute 20 arrives.
    assert_eq!(det.summary().synthetic_missing, 14);
    assert_eq!(pending.len(), 2);

    let opened = &pending[0].event;
    assert_eq!(pending[0].kind, TransitionKind::Opened);
    assert_eq!(opened.rule_id, "mf-level-frozen");
    assert_eq!(opened.start_time, at(6));
    assert_eq!(opened.last_seen, Some(at(15)));

    let resolved = &pending[1].event;
    assert_eq!(resolved.event_id, opened.event_id);
    assert_eq!(resolved.end_time, Some(at(20)));
}

#[test]
fn duplicate_samples_are_rejected() {
    let (mut det, _) = detector(TURBIDITY);
    let mut pending = Vec::new();
    det.apply_sample(&Sample::new("MF-TURB", at(3), 0.1), &mut pending);
    det.apply_sample(&Sample::new("MF-TURB", at(3), 0.9), &mut pending);
    det.apply_sample(&Sample::new("MF-TURB", at(2), 0.9), &mut pending);
    assert_eq!(det.summary().samples_applied, 1);
    assert_eq!(det.summary().samples_rejected, 2);
    assert_eq!(det.machine().open_count(), 0);
}

#[tokio::test]
async fn historical_run_reports_only_reportable_transitions() {
    let (mut det, report) = detector(TURBIDITY);
    let source = MemorySource::new(series(
        "MF-TURB",
        &[0.1, 0.4, 0.45, 0.5, 0.4, 0.35, 0.6, 0.2, 0.2, 0.9],
    ));

    // The reading at minute 9 falls outside the half-open window.
    let summary = det
        .run_historical(&source, &fast_retry(), at(0), at(9))
        .await
        .unwrap();
    assert_eq!(summary.samples_applied, 9);

    let alerts = report.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].transition, TransitionKind::Opened);
    assert_eq!(alerts[0].at, at(5));
    assert_eq!(alerts[1].transition, TransitionKind::Resolved);
    assert_eq!(alerts[1].at, at(7));
    assert_eq!(alerts[0].event_id, alerts[1].event_id);
}

#[tokio::test]
async fn historical_run_rejects_empty_window() {
    let (mut det, _) = detector(TURBIDITY);
    let source = MemorySource::default();
    let err = det
        .run_historical(&source, &fast_retry(), at(5), at(5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RunWindow(_)));
}

#[tokio::test]
async fn failing_tag_replays_as_empty() {
    let (mut det, _) = detector(WITH_LEVEL);
    let mut samples = series("MF-TURB", &[0.1, 0.1, 0.1]);
    samples.push(Sample::new("MF-LEVEL", at(0), 1.0));
    let source = MemorySource::new(samples);
    source.fail_next("MF-LEVEL", 10).await;

    let summary = det
        .run_historical(&source, &fast_retry(), at(0), at(3))
        .await
        .unwrap();
    assert_eq!(summary.samples_applied, 3);
    assert!(det.evaluator().last_accepted("MF-LEVEL").is_none());
}

#[tokio::test]
async fn historical_run_persists_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    let dispatcher = AlertDispatcher::empty();
    let mut det = Detector::new(rules(TURBIDITY), EventStore::new(&path), dispatcher);
    let source = MemorySource::new(series("MF-TURB", &[0.1, 0.4, 0.45, 0.5, 0.4, 0.35, 0.6]));

    det.run_historical(&source, &fast_retry(), at(0), at(10))
        .await
        .unwrap();

    let reloaded = EventStore::load(&path).unwrap();
    let events = reloaded.snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Active);
    assert_eq!(events[0].last_seen, Some(at(6)));
}

#[tokio::test]
async fn failed_read_marks_tag_missing() {
    let (mut det, _) = detector(WITH_LEVEL);
    let source = MemorySource::new([
        Sample::new("MF-TURB", at(0), 0.4),
        Sample::new("MF-LEVEL", at(0), 1.0),
    ]);
    source.fail_next("MF-LEVEL", 5).await;

    det.tick(&source, &fast_retry(), at(0)).await;

    let summary = det.summary();
    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.samples_applied, 1);
    assert_eq!(summary.synthetic_missing, 1);
    // Turbidity violation and the unreadable level meter both start runs.
    assert_eq!(det.machine().open_count(), 2);
    let level = det
        .machine()
        .open_event(&EventKey::new("MF-LEVEL", "mf-level-frozen"))
        .unwrap();
    assert_eq!(level.status, EventStatus::Candidate);
    assert_eq!(level.start_time, at(0));
}

#[tokio::test]
async fn live_run_stops_after_max_ticks() {
    let (mut det, _) = detector(TURBIDITY);
    let source = MemorySource::new([Sample::new("MF-TURB", at(0), 0.1)]);
    let opts = LiveOptions {
        poll_interval: Duration::from_millis(5),
        retry: fast_retry(),
        max_ticks: Some(3),
    };
    let (_tx, rx) = watch::channel(false);

    let summary = det.run_live(&source, &opts, rx).await.unwrap();
    assert_eq!(summary.ticks, 3);
    // The same newest sample is offered on every tick.
    assert_eq!(summary.samples_applied, 1);
    assert_eq!(summary.samples_rejected, 2);
}

#[tokio::test]
async fn live_run_honours_shutdown() {
    let (mut det, _) = detector(TURBIDITY);
    let source = MemorySource::default();
    let opts = LiveOptions {
        poll_interval: Duration::from_millis(5),
        retry: fast_retry(),
        max_ticks: None,
    };

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let summary = det.run_live(&source, &opts, rx).await.unwrap();
    assert_eq!(summary.ticks, 0);

    let (tx, rx) = watch::channel(false);
    drop(tx);
    let stopped = tokio::time::timeout(Duration::from_secs(5), det.run_live(&source, &opts, rx)).await;
    assert!(matches!(stopped, Ok(Ok(_))));
}

#[tokio::test]
async fn live_run_rejects_zero_interval() {
    let (mut det, _) = detector(TURBIDITY);
    let source = MemorySource::default();
    let opts = LiveOptions {
        poll_interval: Duration::ZERO,
        retry: fast_retry(),
        max_ticks: Some(1),
    };
    let (_tx, rx) = watch::channel(false);

    let err = det.run_live(&source, &opts, rx).await.unwrap_err();
    assert!(matches!(err, EngineError::PollInterval));
    assert_eq!(det.summary().ticks, 0);
}

fn logged(tag: &str, rule: &str, start: i64, last_seen: i64) -> Event {
    let mut event = Event::candidate(tag, rule, "MF Process", Severity::Warning, at(start));
    event.status = EventStatus::Active;
    event.last_seen = Some(at(last_seen));
    event.last_sample = Some(at(last_seen));
    event
}

#[test]
fn resume_continues_open_event() {
    let mut store = EventStore::in_memory();
    let event = logged("MF-TURB", "mf-turbidity", 1, 10);
    store.upsert(event.clone());
    let mut det = Detector::new(rules(TURBIDITY), store, AlertDispatcher::empty());

    let closed = det.resume(at(12));
    assert!(closed.is_empty());
    assert_eq!(det.machine().open_count(), 1);

    let mut pending = Vec::new();
    det.apply_sample(&Sample::new("MF-TURB", at(10), 0.1), &mut pending);
    assert_eq!(det.summary().samples_rejected, 1);

    det.apply_sample(&Sample::new("MF-TURB", at(11), 0.1), &mut pending);
    det.apply_sample(&Sample::new("MF-TURB", at(12), 0.1), &mut pending);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, TransitionKind::Resolved);
    assert_eq!(pending[0].event.event_id, event.event_id);
    assert_eq!(pending[0].event.end_time, Some(at(11)));
}

#[test]
fn resume_closes_stale_event() {
    let mut store = EventStore::in_memory();
    store.upsert(logged("MF-TURB", "mf-turbidity", 1, 10));
    let mut det = Detector::new(rules(TURBIDITY), store, AlertDispatcher::empty());

    let closed = det.resume(at(30));
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].kind, TransitionKind::Resolved);
    assert_eq!(closed[0].event.end_time, Some(at(10)));
    assert_eq!(closed[0].event.annotation.as_deref(), Some(ANNOTATION_INCOMPLETE));
    assert_eq!(det.machine().open_count(), 0);
    assert_eq!(det.store().with_status(EventStatus::Resolved).len(), 1);
}

#[test]
fn restart_after_silent_ticks_closes_at_last_sample() {
    let (mut det, _) = detector(TURBIDITY);
    let mut pending = Vec::new();
    for m in 0..=10 {
        det.apply_sample(&Sample::new("MF-TURB", at(m), 0.5), &mut pending);
        det.check_staleness(at(m), &BTreeSet::new(), &mut pending);
    }
    // The tag goes quiet; ticks keep observing it.
    for m in 11..=40 {
        det.check_staleness(at(m), &BTreeSet::new(), &mut pending);
    }
    let open = det.store().with_status(EventStatus::Active);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].last_seen, Some(at(40)));
    assert_eq!(open[0].last_sample, Some(at(10)));

    let mut restarted = Detector::new(rules(TURBIDITY), det.into_store(), AlertDispatcher::empty());
    let closed = restarted.resume(at(45));
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].event.end_time, Some(at(10)));
    assert_eq!(closed[0].event.annotation.as_deref(), Some(ANNOTATION_INCOMPLETE));
    assert_eq!(restarted.evaluator().last_accepted("MF-TURB"), Some(at(10)));

    // Late data an uninterrupted run would still take is accepted.
    restarted.apply_sample(&Sample::new("MF-TURB", at(30), 0.1), &mut pending);
    assert_eq!(restarted.summary().samples_rejected, 0);
}

struct Refusing;

#[async_trait::async_trait]
impl Notifier for Refusing {
    async fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("pager offline".into()))
    }

    fn channel_name(&self) -> &str {
        "refusing"
    }
}

#[tokio::test]
async fn alert_failures_do_not_stop_the_run() {
    let report = ReportNotifier::new();
    let dispatcher = AlertDispatcher::new(vec![Box::new(Refusing), Box::new(report.clone())]);
    let mut det = Detector::new(rules(TURBIDITY), EventStore::in_memory(), dispatcher);

    let pending = det.replay(series("MF-TURB", &[0.1, 0.4, 0.45, 0.5, 0.4, 0.35, 0.6, 0.2, 0.2]));
    det.dispatch(pending).await;

    assert_eq!(det.summary().alerts_failed, 2);
    assert_eq!(report.len(), 2);
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn each_transition_is_logged_once_at_info() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dispatcher = AlertDispatcher::new(vec![Box::new(TracingNotifier::new())]);
    let mut det = Detector::new(rules(TURBIDITY), EventStore::in_memory(), dispatcher);
    let pending = det.replay(series("MF-TURB", &[0.1, 0.4, 0.45, 0.5, 0.4, 0.35, 0.6, 0.2, 0.2]));
    assert_eq!(pending.len(), 2);
    let event_id = pending[0].event.event_id.clone();
    det.dispatch(pending).await;

    let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = out.lines().filter(|l| l.contains(&event_id)).collect();
    assert_eq!(lines.len(), 2, "{out}");
    assert!(lines[0].contains("WARN"));
    assert!(lines[1].contains("INFO"));
}

#[test]
fn staleness_skips_marked_tags() {
    let (mut det, _) = detector(WITH_LEVEL);
    let mut pending = Vec::new();
    let none = BTreeSet::new();
    det.check_staleness(at(0), &none, &mut pending);
    assert_eq!(det.summary().synthetic_missing, 0);

    let skip: BTreeSet<String> = ["MF-LEVEL".to_string()].into();
    det.check_staleness(at(6), &skip, &mut pending);
    assert_eq!(det.summary().synthetic_missing, 0);

    det.check_staleness(at(7), &none, &mut pending);
    assert_eq!(det.summary().synthetic_missing, 1);
}
