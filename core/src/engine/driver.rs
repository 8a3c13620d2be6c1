//! Async tick driver
//!
//! Calls [`Scheduler::tick`] on a tokio interval until cancelled, a tick
//! limit is hit or, optionally, no threads remain. The interval only makes
//! sure a tick comes soon; timers are still resolved inside `tick()`.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::scheduler::Scheduler;
use crate::config::SchedulerConfig;

/// 60 ticks per second
pub const DEFAULT_STEP_TIME: Duration = Duration::from_micros(16_667);
/// 30 ticks per second
pub const COMPATIBILITY_STEP_TIME: Duration = Duration::from_micros(33_333);
/// Shorter intervals (including zero) are raised to this
pub const MIN_STEP_TIME: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub tick_interval: Duration,
    pub max_ticks: Option<u64>,
    pub exit_when_idle: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_STEP_TIME,
            max_ticks: None,
            exit_when_idle: true,
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            max_ticks: config.max_ticks,
            exit_when_idle: config.exit_when_idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    TickLimit,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub faults: usize,
    pub reason: StopReason,
}

/// Tick the scheduler until one of the stop conditions holds
///
/// A tick interval below [`MIN_STEP_TIME`] is clamped to it.
pub async fn run(
    scheduler: &mut Scheduler,
    settings: &RunSettings,
    cancel: CancellationToken,
) -> RunSummary {
    let mut ticker = interval(settings.tick_interval.max(MIN_STEP_TIME));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0u64;
    let mut faults = 0usize;

    let reason = loop {
        if settings.exit_when_idle && scheduler.is_idle() {
            break StopReason::Idle;
        }
        if settings.max_ticks.is_some_and(|max| ticks >= max) {
            break StopReason::TickLimit;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break StopReason::Cancelled,
            _ = ticker.tick() => {}
        }

        let summary = scheduler.tick();
        ticks += 1;
        faults += summary.faulted;
        debug!(
            tick = summary.tick,
            stepped = summary.stepped,
            finished = summary.finished,
            live = summary.live,
            "tick"
        );
    };

    info!(ticks, faults, ?reason, "run finished");
    RunSummary {
        ticks,
        faults,
        reason,
    }
}
