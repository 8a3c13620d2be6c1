//! Scheduler - the tick driver
//!
//! Owns every live thread plus the shared timer registry, block container,
//! primitive catalog and variables. One call to [`Scheduler::tick`] is one
//! pass over the live threads in creation order.
//!
//! ## Tick phases
//! 1. Wake: yielded threads whose top block is not waiting on its own timer
//!    or pending result become running
//! 2. Step: per thread, resolve its due timers and poll its pending result,
//!    wake it if its top block stopped waiting, then step it if it is
//!    running; apply the requests it made
//! 3. Sweep: drop finished threads, cancelling their timers silently
//! 4. Re-arm: start scripts under edge-activated hats that have no thread

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, error, warn};

use super::blocks::{BlockContainer, BlockId};
use super::clock::Clock;
use super::execute::{BlockFault, ExecContext};
use super::frame::PromiseState;
use super::primitives::PrimitiveRegistry;
use super::sequencer;
use super::thread::{Thread, ThreadId, ThreadStatus};
use super::timers::TimerRegistry;
use super::util::SchedulerRequest;
use super::value::Value;
use super::variables::Variables;

pub const FLAG_HAT: &str = "event_whenflagclicked";
pub const BROADCAST_HAT: &str = "event_whenbroadcastreceived";
pub const BROADCAST_FIELD: &str = "BROADCAST_OPTION";

/// A primitive failure that terminated a thread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadFault {
    pub thread: ThreadId,
    pub top_block: BlockId,
    pub block: BlockId,
    pub opcode: String,
    pub message: String,
    pub tick: u64,
}

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    /// Threads that were stepped
    pub stepped: usize,
    /// Threads swept at the end of the tick
    pub finished: usize,
    /// Threads terminated by a primitive fault
    pub faulted: usize,
    /// Threads alive after the sweep
    pub live: usize,
}

pub struct Scheduler {
    threads: Vec<Thread>,
    timers: TimerRegistry,
    blocks: BlockContainer,
    primitives: PrimitiveRegistry,
    variables: Variables,
    edge_hat_values: HashMap<BlockId, bool>,
    faults: Vec<ThreadFault>,
    ticks: u64,
}

impl Scheduler {
    pub fn new(
        blocks: BlockContainer,
        primitives: PrimitiveRegistry,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            threads: Vec::new(),
            timers: TimerRegistry::new(clock),
            blocks,
            primitives,
            variables: Variables::new(),
            edge_hat_values: HashMap::new(),
            faults: Vec::new(),
            ticks: 0,
        }
    }

    /* ===================== Triggers ===================== */

    /// Start a thread for a script
    ///
    /// With a live thread already running the script, the thread is reset in
    /// place if the script's hat restarts existing threads; otherwise the
    /// trigger is ignored and `None` is returned.
    pub fn start_thread(&mut self, top_block: &str) -> Option<ThreadId> {
        let Some(block) = self.blocks.get(top_block) else {
            warn!(script = %top_block, "cannot start unknown script");
            return None;
        };
        let restart = self
            .primitives
            .hat(&block.opcode)
            .is_some_and(|hat| hat.restart_existing_threads);

        if let Some(index) = self.live_index(top_block) {
            if !restart {
                return None;
            }
            let thread = &mut self.threads[index];
            for handle in thread.reset() {
                self.timers.cancel(handle);
            }
            debug!(thread = %thread.id(), script = %top_block, "thread restarted");
            return Some(thread.id());
        }

        let mut thread = Thread::new(top_block);
        thread.push_stack(top_block);
        let id = thread.id();
        debug!(thread = %id, script = %top_block, "thread started");
        self.threads.push(thread);
        Some(id)
    }

    /// Stop and remove the script's thread. Its timers never fire.
    pub fn stop_thread(&mut self, top_block: &str) -> bool {
        let Some(index) = self.live_index(top_block) else {
            return false;
        };
        let mut thread = self.threads.remove(index);
        Self::kill(&mut self.timers, &mut thread);
        debug!(thread = %thread.id(), script = %top_block, "thread stopped");
        true
    }

    /// Stop and remove every thread
    pub fn stop_all(&mut self) {
        for thread in self.threads.iter_mut() {
            Self::kill(&mut self.timers, thread);
        }
        let stopped = self.threads.len();
        self.threads.clear();
        debug!(stopped, "all threads stopped");
    }

    /// Start every script under `opcode` whose fields match
    ///
    /// Field values are compared case-insensitively as strings.
    pub fn start_hats(&mut self, opcode: &str, fields: &BTreeMap<String, String>) -> Vec<ThreadId> {
        let matching: Vec<BlockId> = self
            .blocks
            .scripts()
            .iter()
            .filter(|id| {
                self.blocks.get(id).is_some_and(|block| {
                    block.opcode == opcode
                        && fields.iter().all(|(name, expected)| {
                            block
                                .fields
                                .get(name)
                                .is_some_and(|v| v.to_string().eq_ignore_ascii_case(expected))
                        })
                })
            })
            .cloned()
            .collect();

        matching
            .iter()
            .filter_map(|top| self.start_thread(top))
            .collect()
    }

    /// Stop everything and start the flag scripts
    pub fn green_flag(&mut self) -> Vec<ThreadId> {
        self.stop_all();
        self.edge_hat_values.clear();
        self.start_hats(FLAG_HAT, &BTreeMap::new())
    }

    pub fn broadcast(&mut self, message: &str) -> Vec<ThreadId> {
        let fields = BTreeMap::from([(BROADCAST_FIELD.to_string(), message.to_string())]);
        self.start_hats(BROADCAST_HAT, &fields)
    }

    /// Stop the script if it is running, start it otherwise
    pub fn toggle_script(&mut self, top_block: &str) -> Option<ThreadId> {
        if self.stop_thread(top_block) {
            None
        } else {
            self.start_thread(top_block)
        }
    }

    /// Stop the script's thread and remove its blocks
    pub fn delete_script(&mut self, top_block: &str) -> bool {
        self.stop_thread(top_block);
        self.edge_hat_values.remove(top_block);
        self.blocks.delete_script(top_block)
    }

    /* ===================== Tick ===================== */

    pub fn tick(&mut self) -> TickSummary {
        self.ticks += 1;
        let mut summary = TickSummary {
            tick: self.ticks,
            ..TickSummary::default()
        };

        for thread in self.threads.iter_mut() {
            if thread.status() == ThreadStatus::Yielded && !thread.is_blocked(&self.timers) {
                thread.set_status(ThreadStatus::Running);
            }
        }

        // Threads started during the tick are appended and stepped too
        let mut index = 0;
        while index < self.threads.len() {
            if let Some((result, requests)) = self.step_at(index) {
                summary.stepped += 1;
                if let Err(fault) = result {
                    summary.faulted += 1;
                    self.record_fault(index, fault);
                }
                self.apply_requests(index, requests);
            }
            index += 1;
        }

        let before = self.threads.len();
        let timers = &mut self.timers;
        self.threads.retain_mut(|thread| {
            if thread.is_done() {
                Self::kill(timers, thread);
                false
            } else {
                true
            }
        });
        summary.finished = before - self.threads.len();

        self.arm_edge_hats();
        summary.live = self.threads.len();
        summary
    }

    /// Resolve, poll and step the thread at `index`
    ///
    /// Returns `None` when the thread did not run this tick, otherwise the
    /// step result and the requests its primitives made.
    fn step_at(
        &mut self,
        index: usize,
    ) -> Option<(Result<(), BlockFault>, Vec<SchedulerRequest>)> {
        let thread = &mut self.threads[index];
        if thread.is_done() {
            return None;
        }

        thread.resolve_timeouts(&mut self.timers);

        let thread_id = thread.id();
        if let Some(frame) = thread.peek_stack_frame_mut() {
            if frame.poll_promise() == PromiseState::Rejected {
                warn!(thread = %thread_id, "pending result was dropped, block completes without a value");
                frame.set_resolved(Value::Null);
            }
        }

        // Woken once the top block's own timer or result is in
        if thread.status() == ThreadStatus::Yielded && !thread.is_blocked(&self.timers) {
            thread.set_status(ThreadStatus::Running);
        }

        if thread.status() != ThreadStatus::Running {
            return None;
        }

        let edge_hat = thread.at_stack_top()
            && self
                .blocks
                .opcode(thread.top_block())
                .and_then(|op| self.primitives.hat(op))
                .is_some_and(|hat| hat.edge_activated);

        let mut requests = Vec::new();
        let mut ctx = ExecContext {
            blocks: &self.blocks,
            primitives: &self.primitives,
            timers: &mut self.timers,
            variables: &mut self.variables,
            requests: &mut requests,
        };

        let mut result = Ok(());
        if edge_hat {
            result = sequencer::step_edge_hat(&mut ctx, thread, &mut self.edge_hat_values);
        }
        if result.is_ok() && thread.status() == ThreadStatus::Running {
            result = sequencer::step_thread(&mut ctx, thread);
        }

        Some((result, requests))
    }

    fn record_fault(&mut self, index: usize, fault: BlockFault) {
        let thread = &mut self.threads[index];
        Self::kill(&mut self.timers, thread);

        let record = ThreadFault {
            thread: thread.id(),
            top_block: thread.top_block().to_string(),
            block: fault.block,
            opcode: fault.opcode,
            message: fault.error.to_string(),
            tick: self.ticks,
        };
        error!(
            thread = %record.thread,
            script = %record.top_block,
            block = %record.block,
            opcode = %record.opcode,
            error = %record.message,
            "primitive failed, thread terminated"
        );
        self.faults.push(record);
    }

    /// Apply requests made by the thread at `index` during its step
    ///
    /// Stopped threads are only marked; the sweep removes them.
    fn apply_requests(&mut self, index: usize, requests: Vec<SchedulerRequest>) {
        for request in requests {
            match request {
                SchedulerRequest::StartHats { opcode, fields } => {
                    self.start_hats(&opcode, &fields);
                }
                SchedulerRequest::StopAll => {
                    for thread in self.threads.iter_mut() {
                        Self::kill(&mut self.timers, thread);
                    }
                }
                SchedulerRequest::StopOtherScripts => {
                    for (i, thread) in self.threads.iter_mut().enumerate() {
                        if i != index {
                            Self::kill(&mut self.timers, thread);
                        }
                    }
                }
            }
        }
    }

    /// Give every edge-activated script without a thread a fresh one
    fn arm_edge_hats(&mut self) {
        let armed: Vec<BlockId> = self
            .blocks
            .scripts()
            .iter()
            .filter(|id| {
                self.blocks
                    .opcode(id)
                    .and_then(|op| self.primitives.hat(op))
                    .is_some_and(|hat| hat.edge_activated)
            })
            .filter(|id| self.live_index(id).is_none())
            .cloned()
            .collect();

        for top in armed {
            let mut thread = Thread::new(top.as_str());
            thread.push_stack(top);
            self.threads.push(thread);
        }
    }

    /// Finish a thread and cancel its timers without running them
    fn kill(timers: &mut TimerRegistry, thread: &mut Thread) {
        for handle in thread.take_pending_timers() {
            timers.cancel(handle);
        }
        thread.retire();
    }

    fn live_index(&self, top_block: &str) -> Option<usize> {
        self.threads
            .iter()
            .position(|t| !t.is_done() && t.top_block() == top_block)
    }

    /* ===================== Accessors ===================== */

    /// Live threads in stepping order
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id() == id)
    }

    /// Live thread running the script, if any
    pub fn thread_for(&self, top_block: &str) -> Option<&Thread> {
        self.live_index(top_block).map(|i| &self.threads[i])
    }

    /// No threads remain. Armed edge-activated scripts count as threads.
    pub fn is_idle(&self) -> bool {
        self.threads.is_empty()
    }

    /// Take the faults recorded since the last call
    pub fn drain_faults(&mut self) -> Vec<ThreadFault> {
        std::mem::take(&mut self.faults)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    pub fn blocks(&self) -> &BlockContainer {
        &self.blocks
    }

    pub fn primitives(&self) -> &PrimitiveRegistry {
        &self.primitives
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.threads.len())
            .field("timers", &self.timers)
            .field("scripts", &self.blocks.scripts().len())
            .field("ticks", &self.ticks)
            .finish()
    }
}
