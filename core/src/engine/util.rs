//! Block evaluation context
//!
//! The capability surface handed to every primitive invocation. It exposes the
//! running thread's frame, yielding, timers and branch stepping without
//! giving primitives the scheduler itself. Requests that affect other threads
//! (broadcasts, stop all) are queued and applied by the scheduler after the
//! step.

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use super::blocks::{BlockContainer, WARP_FIELD};
use super::frame::StackFrame;
use super::thread::{Thread, ThreadStatus, WARP_TIME};
use super::timers::{TimerCallback, TimerHandle, TimerRegistry};
use super::value::Value;
use super::variables::Variables;

/// Cross-thread effects requested by a primitive
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerRequest {
    StartHats {
        opcode: String,
        fields: BTreeMap<String, String>,
    },
    StopAll,
    StopOtherScripts,
}

pub struct BlockUtility<'a> {
    thread: &'a mut Thread,
    timers: &'a mut TimerRegistry,
    blocks: &'a BlockContainer,
    variables: &'a mut Variables,
    requests: &'a mut Vec<SchedulerRequest>,
}

impl<'a> BlockUtility<'a> {
    pub(crate) fn new(
        thread: &'a mut Thread,
        timers: &'a mut TimerRegistry,
        blocks: &'a BlockContainer,
        variables: &'a mut Variables,
        requests: &'a mut Vec<SchedulerRequest>,
    ) -> Self {
        Self {
            thread,
            timers,
            blocks,
            variables,
            requests,
        }
    }

    /* ===================== Thread control ===================== */

    /// Suspend the thread until the next tick
    pub fn yield_thread(&mut self) {
        self.thread.yield_thread();
    }

    pub fn status(&self) -> ThreadStatus {
        self.thread.status()
    }

    /// End the running script
    pub fn stop_this_script(&mut self) {
        self.thread.stop_this_script();
    }

    pub fn stop_all(&mut self) {
        self.requests.push(SchedulerRequest::StopAll);
    }

    pub fn stop_other_scripts(&mut self) {
        self.requests.push(SchedulerRequest::StopOtherScripts);
    }

    /// Start every script under `opcode` whose fields match
    pub fn start_hats(&mut self, opcode: impl Into<String>, fields: BTreeMap<String, String>) {
        self.requests.push(SchedulerRequest::StartHats {
            opcode: opcode.into(),
            fields,
        });
    }

    /* ===================== Timers ===================== */

    /// Register a timer owned by the running thread.
    ///
    /// The thread must also yield, otherwise it would be stepped again before
    /// the timer could be due.
    pub fn timeout(&mut self, callback: TimerCallback, delay: Duration) -> TimerHandle {
        self.thread.add_timeout(self.timers, callback, delay)
    }

    pub fn is_timer_pending(&self, handle: TimerHandle) -> bool {
        self.timers.is_pending(handle)
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /* ===================== Stack ===================== */

    /// Frame of the block being executed
    pub fn current_frame(&mut self) -> &mut StackFrame {
        match self.thread.peek_stack_frame_mut() {
            Some(frame) => frame,
            None => unreachable!("primitives only run with their block on the stack"),
        }
    }

    /// Local context of the current invocation, created on first access
    pub fn stack_frame<T: Any + Default>(&mut self) -> &mut T {
        self.current_frame().context::<T>()
    }

    /// Deliver a value to the parent's waiting input
    pub fn report_value(&mut self, value: Value) {
        self.thread.push_reported_value(value);
    }

    /// Step into branch `branch` (1-based) of the current block
    ///
    /// Loops mark their frame so the thread yields once per iteration. An
    /// empty loop body yields immediately; an empty plain branch does nothing.
    pub fn start_branch(&mut self, branch: usize, is_loop: bool) {
        let Some(current) = self.thread.peek_stack().cloned() else {
            return;
        };
        if is_loop {
            self.current_frame().is_loop = true;
        }
        match self.blocks.branch(&current, branch) {
            Some(child) => self.thread.push_stack(child.clone()),
            None if is_loop => self.thread.yield_thread(),
            None => {}
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.thread.stack_depth()
    }

    pub fn top_block(&self) -> &str {
        self.thread.top_block()
    }

    /* ===================== Procedures ===================== */

    /// Step into the body of procedure `proccode`
    ///
    /// Returns false when no such procedure is defined. A recursive call
    /// yields so that deep recursion spreads over ticks, unless the thread is
    /// in warp mode; warp-mode threads yield only once their warp time is up.
    /// A definition marked `WARP` switches the new level to warp mode.
    pub fn start_procedure(&mut self, proccode: &str) -> bool {
        let Some(definition) = self.blocks.procedure_definition(proccode) else {
            return false;
        };
        let recursive = self.thread.is_recursive_call(self.blocks, proccode);
        let warp = definition
            .fields
            .get(WARP_FIELD)
            .is_some_and(|w| w.to_bool());

        self.thread.push_stack(definition.id.clone());

        let now = self.timers.now();
        let out_of_time = self
            .thread
            .warp_elapsed(now)
            .is_some_and(|elapsed| elapsed > WARP_TIME);
        if self.thread.is_warp_mode() && out_of_time {
            self.thread.yield_thread();
        } else if warp {
            self.thread.ensure_warp_timer(now);
            self.thread.set_warp_mode(true);
        } else if recursive {
            self.thread.yield_thread();
        }
        true
    }

    /// Set a parameter for the procedure about to be started
    pub fn push_param(&mut self, name: impl Into<String>, value: Value) {
        self.thread.push_param(name, value);
    }

    /// Value of the innermost procedure parameter called `name`
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.thread.get_param(name)
    }

    /* ===================== Variables ===================== */

    pub fn variables(&self) -> &Variables {
        self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        self.variables
    }
}
