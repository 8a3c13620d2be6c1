//! Test helpers for engine tests
//!
//! Builds a scheduler over an inline JSON bundle with a manual clock and a
//! handful of recording primitives on top of the built-in catalog.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::engine::primitives::arg;
use crate::engine::{
    Args, BlockContainer, BlockUtility, HatInfo, ManualClock, PrimitiveError, PrimitiveRegistry,
    Reported, Scheduler, ThreadStatus, TickSummary, TimerCallback, Value,
};

pub type Log = Rc<RefCell<Vec<String>>>;
pub type Senders = Rc<RefCell<Vec<oneshot::Sender<Value>>>>;

pub struct Harness {
    pub scheduler: Scheduler,
    pub clock: ManualClock,
    pub log: Log,
    pub senders: Senders,
}

impl Harness {
    /// Parse the bundle and build a scheduler with test primitives
    pub fn new(source: &str) -> Self {
        let blocks = BlockContainer::from_json(source).expect("Bundle should load");
        let log: Log = Rc::default();
        let senders: Senders = Rc::default();
        let clock = ManualClock::new();

        let registry = test_registry(&log, &senders);
        let scheduler = Scheduler::new(blocks, registry, clock.clone());

        Self {
            scheduler,
            clock,
            log,
            senders,
        }
    }

    pub fn tick(&mut self) -> TickSummary {
        self.scheduler.tick()
    }

    /// Tick until no threads remain, at most `limit` times. Returns ticks run.
    pub fn run_until_idle(&mut self, limit: u64) -> u64 {
        let mut ticks = 0;
        while !self.scheduler.is_idle() && ticks < limit {
            self.scheduler.tick();
            ticks += 1;
        }
        ticks
    }

    pub fn logged(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Take what was logged so far
    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn stack(&self, top_block: &str) -> Vec<String> {
        self.scheduler
            .thread_for(top_block)
            .map(|t| t.stack().to_vec())
            .unwrap_or_default()
    }

    pub fn status(&self, top_block: &str) -> Option<ThreadStatus> {
        self.scheduler.thread_for(top_block).map(|t| t.status())
    }

    pub fn var(&self, name: &str) -> Value {
        self.scheduler.variables().get(name)
    }
}

/// Built-in catalog plus:
/// - `test_log`: records MESSAGE
/// - `test_yield_once`: yields on its first invocation, then completes
/// - `test_yield_reporter`: same, then reports VALUE
/// - `test_fail`: always fails
/// - `test_pending`: waits on a channel whose sender lands in `senders`
/// - `test_timer`: starts a DELAY ms timer that logs "fired" (or fails if
///   FAIL is set) and yields; completes once the thread is woken
/// - `test_schedule`: starts the same timer without yielding
/// - `test_when_triggered`: edge-activated hat on the `trigger` variable
pub fn test_registry(log: &Log, senders: &Senders) -> PrimitiveRegistry {
    let mut registry = PrimitiveRegistry::with_stdlib();

    let l = Rc::clone(log);
    registry.register("test_log", move |args: &Args, _: &mut BlockUtility<'_>| {
        l.borrow_mut().push(arg(args, "MESSAGE").to_string());
        Ok(Reported::Nothing)
    });

    let l = Rc::clone(log);
    registry.register("test_yield_once", move |args: &Args, util: &mut BlockUtility<'_>| {
        let name = arg(args, "MESSAGE").to_string();
        if first_invocation(util) {
            l.borrow_mut().push(format!("{} yield", name));
            util.yield_thread();
        } else {
            l.borrow_mut().push(format!("{} resume", name));
        }
        Ok(Reported::Nothing)
    });

    registry.register("test_yield_reporter", |args: &Args, util: &mut BlockUtility<'_>| {
        if first_invocation(util) {
            util.yield_thread();
            return Ok(Reported::Nothing);
        }
        Ok(arg(args, "VALUE").into())
    });

    registry.register("test_fail", |_: &Args, _: &mut BlockUtility<'_>| {
        Err(PrimitiveError::message("boom"))
    });

    let s = Rc::clone(senders);
    registry.register("test_pending", move |_: &Args, _: &mut BlockUtility<'_>| {
        let (tx, rx) = oneshot::channel();
        s.borrow_mut().push(tx);
        Ok(Reported::Pending(rx))
    });

    let l = Rc::clone(log);
    registry.register("test_timer", move |args: &Args, util: &mut BlockUtility<'_>| {
        if first_invocation(util) {
            let callback = logging_callback(&l, arg(args, "FAIL").to_bool());
            util.timeout(callback, delay_ms(args));
            util.yield_thread();
        }
        Ok(Reported::Nothing)
    });

    let l = Rc::clone(log);
    registry.register("test_schedule", move |args: &Args, util: &mut BlockUtility<'_>| {
        util.timeout(logging_callback(&l, false), delay_ms(args));
        Ok(Reported::Nothing)
    });

    registry.register_hat(
        "test_when_triggered",
        HatInfo {
            restart_existing_threads: false,
            edge_activated: true,
        },
    );
    registry.register("test_when_triggered", |_: &Args, util: &mut BlockUtility<'_>| {
        Ok(Value::Bool(util.variables().get("trigger").to_bool()).into())
    });

    registry
}

/// True the first time a block runs in its current frame
fn first_invocation(util: &mut BlockUtility<'_>) -> bool {
    let seen = util.stack_frame::<bool>();
    let first = !*seen;
    *seen = true;
    first
}

fn delay_ms(args: &Args) -> Duration {
    Duration::from_millis(arg(args, "DELAY").to_number() as u64)
}

fn logging_callback(log: &Log, fail: bool) -> TimerCallback {
    let log = Rc::clone(log);
    Box::new(move || {
        log.borrow_mut().push("fired".to_string());
        if fail {
            anyhow::bail!("callback failed");
        }
        Ok(())
    })
}
