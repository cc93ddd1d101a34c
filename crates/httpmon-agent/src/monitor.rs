use crate::config::AgentConfig;
use anyhow::Result;
use httpmon_alert::bucket::CountMap;
use httpmon_alert::clock::{Clock, SystemClock};
use httpmon_alert::engine::AlertEngine;
use httpmon_alert::window::{SharedWindow, WindowAggregator, WindowSnapshot};
use httpmon_collector::source::AccessLogSource;
use httpmon_collector::EventSource;
use httpmon_common::types::{AlertEvent, AlertStatus};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Periodic summary of the reporting window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub window_secs: f64,
    pub total: u64,
    pub by_status_class: Vec<(String, u64)>,
    pub top_endpoints: Vec<(String, u64)>,
    pub top_clients: Vec<(String, u64)>,
}

impl StatsReport {
    pub fn from_snapshot(snapshot: &WindowSnapshot, top: usize) -> Self {
        let counts = &snapshot.counts;
        Self {
            window_secs: snapshot.window_secs,
            total: counts.total,
            by_status_class: top_n(&counts.by_status_class, usize::MAX),
            top_endpoints: top_n(&counts.by_endpoint, top),
            top_clients: top_n(&counts.by_client, top),
        }
    }
}

/// Highest counts first, ties broken by key so reports are stable.
pub fn top_n(map: &CountMap, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = map
        .iter()
        .map(|(key, count)| (key.to_string(), count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

/// Poll `source` once and feed whatever it returned into the window.
pub fn ingest_once(source: &mut dyn EventSource, window: &SharedWindow) -> Result<usize> {
    let events = source.poll()?;
    if !events.is_empty() {
        window.add_all(&events);
        tracing::debug!(source = source.name(), count = events.len(), "Ingested events");
    }
    Ok(events.len())
}

pub fn log_stats(report: &StatsReport) {
    let by_status = serde_json::to_string(&report.by_status_class).unwrap_or_default();
    let endpoints = serde_json::to_string(&report.top_endpoints).unwrap_or_default();
    let clients = serde_json::to_string(&report.top_clients).unwrap_or_default();
    tracing::info!(
        window_secs = report.window_secs,
        total = report.total,
        by_status = %by_status,
        top_endpoints = %endpoints,
        top_clients = %clients,
        "Traffic stats"
    );
}

pub fn log_alert(event: &AlertEvent) {
    match event.status {
        AlertStatus::Active => tracing::warn!(
            kind = %event.kind,
            value = event.value,
            threshold = event.threshold,
            at = %event.timestamp,
            "{}",
            event.message
        ),
        AlertStatus::Recovered => tracing::info!(
            kind = %event.kind,
            value = event.value,
            threshold = event.threshold,
            at = %event.timestamp,
            "{}",
            event.message
        ),
    }
}

/// Ties one event source, one shared window and one alert engine together.
///
/// [`run`](Self::run) spawns three tasks over the window: ingestion on the
/// poll interval, stats reporting, and alert evaluation. The alert engine
/// belongs to the alert task alone.
pub struct Monitor {
    config: AgentConfig,
    window: SharedWindow,
    engine: AlertEngine,
    source: Box<dyn EventSource>,
    alerts: broadcast::Sender<AlertEvent>,
}

impl Monitor {
    pub fn new(
        config: AgentConfig,
        source: Box<dyn EventSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let aggregator = WindowAggregator::new(&config.window, clock)?;
        let engine = AlertEngine::from_config(
            &config.alerts.thresholds,
            config.window.reporting_window_secs,
        )?;
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            window: SharedWindow::new(aggregator),
            engine,
            source,
            alerts,
        })
    }

    /// Tail `config.log_path` against the system clock.
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let source = AccessLogSource::new(&config.log_path, config.read_from_start);
        Self::new(config, Box::new(source), Arc::new(SystemClock))
    }

    pub fn window(&self) -> SharedWindow {
        self.window.clone()
    }

    /// Every alert transition is also published here.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.alerts.subscribe()
    }

    /// Run until `shutdown` resolves, then stop all tasks.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            window,
            engine,
            source,
            alerts,
        } = self;

        tracing::info!(
            log_path = %config.log_path,
            window_secs = config.window.reporting_window_secs,
            bucket_secs = config.window.bucket_size_secs,
            traffic_threshold = config.alerts.thresholds.traffic_threshold,
            error_rate_threshold = config.alerts.thresholds.error_rate_threshold,
            concentration_threshold = config.alerts.thresholds.concentration_threshold,
            "Starting monitor"
        );

        let stats_every = config.stats_interval()?;
        let check_every = config.check_interval()?;
        let tasks: Vec<JoinHandle<()>> = vec![
            tokio::spawn(ingest_loop(source, window.clone(), config.poll_interval())),
            tokio::spawn(stats_loop(window.clone(), stats_every, config.stats.top_n)),
            tokio::spawn(alert_loop(window, engine, alerts, check_every)),
        ];

        shutdown.await;
        tracing::info!("Shutting down gracefully");
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Monitor task failed");
                }
            }
        }
        Ok(())
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

async fn ingest_loop(mut source: Box<dyn EventSource>, window: SharedWindow, period: Duration) {
    let mut tick = ticker(period);
    // Only log a read failure when it changes, the poll interval is short.
    let mut last_error: Option<String> = None;
    loop {
        match ingest_once(source.as_mut(), &window) {
            Ok(_) => {
                if last_error.take().is_some() {
                    tracing::info!(source = source.name(), "Source readable again");
                }
            }
            Err(e) => {
                let message = e.to_string();
                if last_error.as_deref() != Some(message.as_str()) {
                    tracing::warn!(source = source.name(), error = %message, "Failed to read source");
                    last_error = Some(message);
                }
            }
        }
        tick.tick().await;
    }
}

async fn stats_loop(window: SharedWindow, period: Duration, top: usize) {
    let mut tick = ticker(period);
    loop {
        tick.tick().await;
        let report = StatsReport::from_snapshot(&window.snapshot(), top);
        log_stats(&report);
    }
}

async fn alert_loop(
    window: SharedWindow,
    mut engine: AlertEngine,
    alerts: broadcast::Sender<AlertEvent>,
    period: Duration,
) {
    let mut tick = ticker(period);
    loop {
        tick.tick().await;
        for event in window.evaluate(&mut engine) {
            log_alert(&event);
            // No subscribers is fine.
            let _ = alerts.send(event);
        }
    }
}
