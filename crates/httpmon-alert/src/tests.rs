use crate::bucket::TrafficCounts;
use crate::clock::ManualClock;
use crate::engine::{AlertEngine, AlertThresholds};
use crate::error::AlertError;
use crate::rules::concentration::ConcentrationRule;
use crate::rules::error_rate::ErrorRateRule;
use crate::rules::traffic::TrafficRule;
use crate::window::{SharedWindow, WindowAggregator, WindowConfig};
use crate::AlertEvaluator;
use chrono::Utc;
use httpmon_common::types::{AlertKind, AlertStatus, NormalizedEvent};
use std::sync::Arc;

const START: f64 = 1_525_881_641.25;

fn thresholds() -> AlertThresholds {
    AlertThresholds {
        traffic_threshold: 10.0,
        error_rate_threshold: 0.05,
        concentration_threshold: 7.5,
    }
}

fn setup() -> (Arc<ManualClock>, WindowAggregator, AlertEngine) {
    let clock = Arc::new(ManualClock::from_epoch_secs(START));
    let window = WindowAggregator::new(&WindowConfig::new(5.0, 1.0), clock.clone()).unwrap();
    let engine = AlertEngine::from_config(&thresholds(), 5.0).unwrap();
    (clock, window, engine)
}

/// Requests at `START + offset`, one distinct client per request unless
/// `single_client` is set.
fn make_requests(
    success: usize,
    redirect: usize,
    not_found: usize,
    error: usize,
    offset: f64,
    single_client: bool,
) -> Vec<NormalizedEvent> {
    [("200", success), ("300", redirect), ("400", not_found), ("500", error)]
        .into_iter()
        .flat_map(|(status, count)| std::iter::repeat(status).take(count))
        .enumerate()
        .map(|(i, status)| {
            let client = if single_client {
                "127.0.0.1".to_string()
            } else {
                format!("10.{}.{}.{}", offset as u8, i / 256, i % 256)
            };
            NormalizedEvent::new(START + offset, status, client, "/api")
        })
        .collect()
}

#[test]
fn metrics_aggregate_by_status_class() {
    let (_, mut window, _) = setup();
    window.add_all(&make_requests(15, 3, 2, 5, 0.0, false));

    let counts = window.snapshot().counts;
    assert_eq!(counts.total, 25);
    assert_eq!(counts.by_status_class.get_or_zero("200s"), 15);
    assert_eq!(counts.by_status_class.get_or_zero("300s"), 3);
    assert_eq!(counts.by_status_class.get_or_zero("400s"), 2);
    assert_eq!(counts.by_status_class.get_or_zero("500s"), 5);
    assert_eq!(counts.by_endpoint.get_or_zero("/api"), 25);
    assert_eq!(counts.by_client.len(), 25);
}

#[test]
fn quiet_traffic_raises_nothing() {
    let (_, mut window, mut engine) = setup();
    window.add_all(&make_requests(15, 3, 2, 0, 0.0, false));

    assert!(engine.evaluate(&window.snapshot()).is_empty());
    assert!(engine.active_kinds().is_empty());
}

#[test]
fn traffic_alert_fires_once() {
    let (_, mut window, mut engine) = setup();
    window.add_all(&make_requests(90, 30, 20, 5, 0.0, false));

    let alerts = engine.evaluate(&window.snapshot());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Traffic);
    assert_eq!(alerts[0].status, AlertStatus::Active);
    assert_eq!(alerts[0].value, 145.0);
    assert_eq!(alerts[0].threshold, 50.0);
    assert!(alerts[0].message.contains("145 hits"), "{}", alerts[0].message);

    // Still above threshold: no repeat.
    window.add_all(&make_requests(20, 0, 0, 0, 0.5, false));
    assert!(engine.evaluate(&window.snapshot()).is_empty());
    assert_eq!(engine.active_kinds(), vec![AlertKind::Traffic]);
}

#[test]
fn error_rate_alert_fires_once() {
    let (_, mut window, mut engine) = setup();
    window.add_all(&make_requests(20, 0, 0, 5, 0.0, false));

    let alerts = engine.evaluate(&window.snapshot());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::ErrorRate);
    assert_eq!(alerts[0].status, AlertStatus::Active);
    assert!((alerts[0].value - 0.2).abs() < f64::EPSILON);
    assert!(alerts[0].message.contains("(20%)"), "{}", alerts[0].message);

    assert!(engine.evaluate(&window.snapshot()).is_empty());
}

#[test]
fn concentration_alert_fires_once() {
    let (_, mut window, mut engine) = setup();
    window.add_all(&make_requests(40, 0, 0, 1, 0.0, true));

    let alerts = engine.evaluate(&window.snapshot());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Concentration);
    assert_eq!(alerts[0].status, AlertStatus::Active);
    assert_eq!(alerts[0].value, 41.0);
    assert!(alerts[0].message.starts_with("127.0.0.1"), "{}", alerts[0].message);
}

#[test]
fn alert_recovers_without_traffic() {
    let (clock, mut window, mut engine) = setup();
    window.add_all(&make_requests(90, 30, 20, 0, 0.0, false));

    let alerts = engine.evaluate(&window.snapshot());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Active);

    clock.set_epoch_secs(START + 5.0);
    let alerts = engine.evaluate(&window.snapshot());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Traffic);
    assert_eq!(alerts[0].status, AlertStatus::Recovered);

    // Recovered once; further quiet evaluations stay silent.
    assert!(engine.evaluate(&window.snapshot()).is_empty());
}

#[test]
fn alert_recovers_as_old_traffic_ages_out() {
    let (clock, mut window, mut engine) = setup();
    window.add_all(&make_requests(20, 3, 2, 0, 0.0, false));
    window.add_all(&make_requests(10, 3, 2, 0, 1.0, false));
    window.add_all(&make_requests(5, 3, 2, 0, 2.0, false));
    window.add_all(&make_requests(0, 3, 2, 0, 3.0, false));

    let snapshot = window.snapshot();
    assert_eq!(snapshot.counts.total, 55);
    let alerts = engine.evaluate(&snapshot);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Active);

    window.add_all(&make_requests(5, 3, 2, 0, 5.0, false));
    clock.set_epoch_secs(START + 5.0);

    let snapshot = window.snapshot();
    assert_eq!(snapshot.counts.total, 40);
    let alerts = engine.evaluate(&snapshot);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Traffic);
    assert_eq!(alerts[0].status, AlertStatus::Recovered);
}

#[test]
fn alerts_cycle_repeatedly() {
    let (clock, mut window, mut engine) = setup();
    for round in 0..3 {
        let base = round as f64 * 10.0;
        clock.set_epoch_secs(START + base);
        window.add_all(&make_requests(60, 0, 0, 0, base, false));
        let fired = engine.evaluate(&window.snapshot());
        assert_eq!(fired.len(), 1, "round {round}");
        assert!(fired[0].is_active());

        clock.set_epoch_secs(START + base + 6.0);
        let recovered = engine.evaluate(&window.snapshot());
        assert_eq!(recovered.len(), 1, "round {round}");
        assert_eq!(recovered[0].status, AlertStatus::Recovered);
    }
}

#[test]
fn error_rate_is_inert_without_traffic() {
    let (clock, mut window, mut engine) = setup();
    window.add_all(&make_requests(20, 0, 0, 5, 0.0, false));
    assert_eq!(engine.evaluate(&window.snapshot()).len(), 1);

    clock.set_epoch_secs(START + 60.0);
    let snapshot = window.snapshot();
    assert_eq!(snapshot.counts.total, 0);
    for _ in 0..3 {
        assert!(engine.evaluate(&snapshot).is_empty());
    }
    assert_eq!(engine.active_kinds(), vec![AlertKind::ErrorRate]);

    // Traffic comes back healthy: now it can recover.
    window.add_all(&make_requests(10, 0, 0, 0, 60.0, false));
    let alerts = engine.evaluate(&window.snapshot());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::ErrorRate);
    assert_eq!(alerts[0].status, AlertStatus::Recovered);
}

#[test]
fn error_rate_rule_never_fires_on_empty_totals() {
    let mut rule = ErrorRateRule::new(0.05, 5.0).unwrap();
    assert!(rule.evaluate(&TrafficCounts::default(), Utc::now()).is_none());
    assert!(!rule.is_active());
    assert!(rule.last_message().is_none());
}

#[test]
fn concentration_recovers_when_top_client_drops() {
    let (clock, mut window, mut engine) = setup();
    window.add_all(&make_requests(8, 0, 0, 0, 0.0, true));
    assert_eq!(engine.evaluate(&window.snapshot()).len(), 1);

    clock.set_epoch_secs(START + 3.0);
    window.add_all(&make_requests(7, 0, 0, 0, 3.0, true));
    assert!(engine.evaluate(&window.snapshot()).is_empty());

    clock.set_epoch_secs(START + 5.0);
    let snapshot = window.snapshot();
    assert_eq!(snapshot.counts.by_client.get_or_zero("127.0.0.1"), 7);
    let alerts = engine.evaluate(&snapshot);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Concentration);
    assert_eq!(alerts[0].status, AlertStatus::Recovered);
    assert_eq!(alerts[0].value, 7.0);
}

#[test]
fn concentration_reports_smallest_address_on_tie() {
    let mut rule = ConcentrationRule::new(3.0, 5.0).unwrap();
    let mut totals = TrafficCounts::default();
    for client in ["10.0.0.9", "10.0.0.2", "10.0.0.5"] {
        for _ in 0..3 {
            totals.record(&NormalizedEvent::new(START, "200", client, "/"));
        }
    }

    let event = rule.evaluate(&totals, Utc::now()).unwrap();
    assert!(event.message.starts_with("10.0.0.2 "), "{}", event.message);
    assert_eq!(rule.last_message(), Some(event.message.as_str()));
}

#[test]
fn traffic_threshold_is_inclusive() {
    let mut rule = TrafficRule::new(10.0, 5.0).unwrap();
    assert_eq!(rule.hit_threshold(), 50.0);

    let mut totals = TrafficCounts::default();
    for i in 0..49 {
        totals.record(&NormalizedEvent::new(START, "200", format!("c{i}"), "/"));
    }
    assert!(rule.evaluate(&totals, Utc::now()).is_none());

    totals.record(&NormalizedEvent::new(START, "200", "c49", "/"));
    let event = rule.evaluate(&totals, Utc::now()).unwrap();
    assert_eq!(event.status, AlertStatus::Active);
}

#[test]
fn totals_do_not_depend_on_chunking() {
    let mut events = make_requests(12, 4, 6, 3, 0.0, false);
    events.extend(make_requests(7, 1, 0, 2, 1.0, true));
    events.extend(make_requests(3, 0, 9, 0, 2.0, false));

    let clock = Arc::new(ManualClock::from_epoch_secs(START + 2.0));
    let config = WindowConfig::new(5.0, 1.0);

    let mut whole = WindowAggregator::new(&config, clock.clone()).unwrap();
    whole.add_all(&events);

    let mut chunked = WindowAggregator::new(&config, clock.clone()).unwrap();
    let (head, tail) = events.split_at(17);
    chunked.add_all(head);
    for chunk in tail.chunks(5) {
        chunked.add_all(chunk);
    }

    assert_eq!(whole.snapshot().counts, chunked.snapshot().counts);
}

#[test]
fn rolling_total_matches_sum_of_buckets() {
    let (clock, mut window, _) = setup();
    for step in 0..12 {
        let offset = step as f64 * 0.75;
        clock.set_epoch_secs(START + offset);
        window.add_all(&make_requests(step % 4, 1, step % 3, step % 2, offset, step % 5 == 0));

        let snapshot = window.snapshot();
        let mut summed = TrafficCounts::default();
        for bucket in window.buckets() {
            summed += bucket.counts();
        }
        assert_eq!(snapshot.counts, summed, "step {step}");
        assert_eq!(summed.total, summed.by_status_class.sum());
    }
}

#[test]
fn shared_window_drives_engine() {
    let (_, window, mut engine) = setup();
    let shared = SharedWindow::new(window);
    shared.add_all(&make_requests(90, 30, 20, 5, 0.0, false));

    let alerts = shared.evaluate(&mut engine);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Traffic);
    assert!(shared.evaluate(&mut engine).is_empty());
}

#[test]
fn engine_rejects_bad_thresholds() {
    let cases = [
        AlertThresholds {
            traffic_threshold: -1.0,
            ..thresholds()
        },
        AlertThresholds {
            error_rate_threshold: 0.0,
            ..thresholds()
        },
        AlertThresholds {
            error_rate_threshold: 1.5,
            ..thresholds()
        },
        AlertThresholds {
            concentration_threshold: f64::INFINITY,
            ..thresholds()
        },
    ];
    for case in cases {
        assert!(
            matches!(
                AlertEngine::from_config(&case, 5.0),
                Err(AlertError::InvalidThreshold { .. })
            ),
            "{case:?} should be rejected"
        );
    }

    let edge = AlertThresholds {
        error_rate_threshold: 1.0,
        ..thresholds()
    };
    assert_eq!(AlertEngine::from_config(&edge, 5.0).unwrap().evaluators().len(), 3);
}
