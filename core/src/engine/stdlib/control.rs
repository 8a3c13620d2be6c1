//! Control blocks: waits, loops, conditionals and stop

use std::time::Duration;

use tracing::trace;

use crate::engine::errors::PrimitiveError;
use crate::engine::primitives::{arg, require_name, Args, PrimitiveRegistry, PrimitiveResult, Reported};
use crate::engine::timers::TimerHandle;
use crate::engine::util::BlockUtility;

/// Timer started by the first invocation of a wait
#[derive(Debug, Default)]
pub struct WaitState {
    pub timer: Option<TimerHandle>,
}

/// Iterations left in a counted loop
#[derive(Debug, Default)]
pub struct LoopCounter {
    pub remaining: Option<i64>,
}

pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register("control_wait", wait);
    registry.register("control_repeat", repeat);
    registry.register("control_forever", forever);
    registry.register("control_if", if_then);
    registry.register("control_if_else", if_else);
    registry.register("control_repeat_until", repeat_until);
    registry.register("control_wait_until", wait_until);
    registry.register("control_stop", stop);
}

/// Seconds to a duration; negative waits are zero, absurd ones never end
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/* ===================== Waits ===================== */

pub fn wait(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let timer = util.stack_frame::<WaitState>().timer;
    match timer {
        None => {
            let delay = seconds(arg(args, "DURATION").to_number());
            let handle = util.timeout(Box::new(|| Ok(())), delay);
            trace!(%handle, ?delay, "wait started");
            util.stack_frame::<WaitState>().timer = Some(handle);
            util.yield_thread();
        }
        Some(handle) if util.is_timer_pending(handle) => util.yield_thread(),
        Some(_) => {}
    }
    Ok(Reported::Nothing)
}

pub fn wait_until(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    if !arg(args, "CONDITION").to_bool() {
        util.yield_thread();
    }
    Ok(Reported::Nothing)
}

/* ===================== Loops ===================== */

pub fn repeat(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let times = arg(args, "TIMES").to_number().round() as i64;
    let remaining = {
        let counter = util.stack_frame::<LoopCounter>();
        let remaining = counter.remaining.get_or_insert(times);
        *remaining -= 1;
        *remaining
    };
    if remaining >= 0 {
        util.start_branch(1, true);
    }
    Ok(Reported::Nothing)
}

pub fn forever(_args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    util.start_branch(1, true);
    Ok(Reported::Nothing)
}

pub fn repeat_until(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    if !arg(args, "CONDITION").to_bool() {
        util.start_branch(1, true);
    }
    Ok(Reported::Nothing)
}

/* ===================== Conditionals ===================== */

pub fn if_then(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    if arg(args, "CONDITION").to_bool() {
        util.start_branch(1, false);
    }
    Ok(Reported::Nothing)
}

pub fn if_else(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let branch = if arg(args, "CONDITION").to_bool() { 1 } else { 2 };
    util.start_branch(branch, false);
    Ok(Reported::Nothing)
}

/* ===================== Stop ===================== */

pub fn stop(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let option = require_name(args, "STOP_OPTION")?;
    match option.as_str() {
        "all" => {
            util.stop_all();
            util.stop_this_script();
        }
        "this script" => util.stop_this_script(),
        "other scripts in sprite" | "other scripts in stage" => util.stop_other_scripts(),
        other => {
            return Err(PrimitiveError::message(format!(
                "unknown stop option '{}'",
                other
            )))
        }
    }
    Ok(Reported::Nothing)
}
