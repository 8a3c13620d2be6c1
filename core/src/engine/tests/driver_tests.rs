//! Tests for the async tick driver

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::helpers::Harness;
use crate::config::SchedulerConfig;
use crate::engine::driver::{COMPATIBILITY_STEP_TIME, DEFAULT_STEP_TIME};
use crate::engine::{run, RunSettings, StopReason};

const FOREVER: &str = r#"{
    "blocks": [
        { "id": "f", "opcode": "control_forever", "topLevel": true }
    ]
}"#;

fn fast(max_ticks: Option<u64>, exit_when_idle: bool) -> RunSettings {
    RunSettings {
        tick_interval: Duration::from_millis(1),
        max_ticks,
        exit_when_idle,
    }
}

#[test]
fn test_run_stops_at_tick_limit() {
    let mut h = Harness::new(FOREVER);
    h.scheduler.start_thread("f");

    let summary = tokio_test::block_on(run(
        &mut h.scheduler,
        &fast(Some(3), true),
        CancellationToken::new(),
    ));
    assert_eq!(summary.reason, StopReason::TickLimit);
    assert_eq!(summary.ticks, 3);
    assert_eq!(h.scheduler.ticks(), 3);
}

#[test]
fn test_run_exits_when_idle() {
    let source = r#"{
        "blocks": [
            { "id": "a", "opcode": "test_log", "topLevel": true,
              "inputs": { "MESSAGE": { "value": "a" } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("a");

    let summary = tokio_test::block_on(run(
        &mut h.scheduler,
        &fast(Some(100), true),
        CancellationToken::new(),
    ));
    assert_eq!(summary.reason, StopReason::Idle);
    assert_eq!(summary.ticks, 1);
    assert_eq!(h.logged(), vec!["a"]);
}

#[test]
fn test_run_counts_faults() {
    let source = r#"{
        "blocks": [
            { "id": "boom", "opcode": "test_fail", "topLevel": true }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("boom");

    let summary = tokio_test::block_on(run(
        &mut h.scheduler,
        &fast(None, true),
        CancellationToken::new(),
    ));
    assert_eq!(summary.faults, 1);
    assert_eq!(summary.reason, StopReason::Idle);
}

#[test]
fn test_cancelled_token_stops_before_ticking() {
    let mut h = Harness::new(FOREVER);
    h.scheduler.start_thread("f");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = tokio_test::block_on(run(
        &mut h.scheduler,
        &fast(None, true),
        cancel,
    ));
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(summary.ticks, 0);
    assert_eq!(h.scheduler.threads().len(), 1);
}

#[test]
fn test_idle_scheduler_keeps_ticking_without_exit_flag() {
    let mut h = Harness::new(FOREVER);

    let summary = tokio_test::block_on(run(
        &mut h.scheduler,
        &fast(Some(2), false),
        CancellationToken::new(),
    ));
    assert_eq!(summary.reason, StopReason::TickLimit);
    assert_eq!(summary.ticks, 2);
}

#[test]
fn test_zero_interval_is_clamped() {
    let mut h = Harness::new(FOREVER);
    h.scheduler.start_thread("f");

    let settings = RunSettings {
        tick_interval: Duration::ZERO,
        max_ticks: Some(2),
        exit_when_idle: true,
    };
    let summary = tokio_test::block_on(run(&mut h.scheduler, &settings, CancellationToken::new()));
    assert_eq!(summary.reason, StopReason::TickLimit);
    assert_eq!(summary.ticks, 2);
}

#[test]
fn test_settings_from_config() {
    let config = SchedulerConfig::default();
    let settings = RunSettings::from_config(&config);
    assert_eq!(settings, RunSettings::default());
    assert_eq!(settings.tick_interval, DEFAULT_STEP_TIME);

    let config = SchedulerConfig {
        compatibility_mode: true,
        max_ticks: Some(10),
        exit_when_idle: false,
        ..SchedulerConfig::default()
    };
    let settings = RunSettings::from_config(&config);
    assert_eq!(settings.tick_interval, COMPATIBILITY_STEP_TIME);
    assert_eq!(settings.max_ticks, Some(10));
    assert!(!settings.exit_when_idle);

    let config = SchedulerConfig {
        compatibility_mode: true,
        tick_interval_ms: Some(5),
        ..SchedulerConfig::default()
    };
    assert_eq!(
        RunSettings::from_config(&config).tick_interval,
        Duration::from_millis(5)
    );
}
