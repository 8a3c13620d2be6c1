//! Thread - one running instance of a script
//!
//! A thread is an explicit stack of block ids plus a parallel stack of
//! frames. Because the stack is data rather than the native call stack,
//! execution can stop between any two blocks and pick up on a later tick.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blocks::{BlockContainer, BlockId, PROCEDURE_CALL, PROCCODE_FIELD};
use super::frame::StackFrame;
use super::timers::{TimerCallback, TimerHandle, TimerRegistry};
use super::value::Value;

/// How long a warp-mode thread may run before it has to yield
pub const WARP_TIME: Duration = Duration::from_millis(500);

/// Enclosing stack entries examined when looking for a recursive call
const RECURSION_SEARCH_DEPTH: usize = 6;

/* ===================== Status ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// Initial state, and the state after being resumed
    Running,
    /// Keep alive but do not step again until woken
    Yielded,
    /// Remove at the end of the tick
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(Uuid);

impl ThreadId {
    fn new() -> Self {
        ThreadId(Uuid::new_v4())
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/* ===================== Thread ===================== */

pub struct Thread {
    id: ThreadId,
    top_block: BlockId,
    stack: Vec<BlockId>,
    stack_frames: Vec<StackFrame>,
    status: ThreadStatus,
    pending_timers: Vec<TimerHandle>,
    warp_started: Option<Duration>,
}

impl Thread {
    /// Create a thread for a script. The stack starts empty.
    pub fn new(top_block: impl Into<BlockId>) -> Self {
        Self {
            id: ThreadId::new(),
            top_block: top_block.into(),
            stack: Vec::new(),
            stack_frames: Vec::new(),
            status: ThreadStatus::Running,
            pending_timers: Vec::new(),
            warp_started: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn top_block(&self) -> &str {
        &self.top_block
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ThreadStatus) {
        self.status = status;
    }

    pub fn is_done(&self) -> bool {
        self.status == ThreadStatus::Done
    }

    /* ===================== Stack ===================== */

    /// Push a block, creating a frame if the stack outgrew the frames.
    ///
    /// A new frame inherits warp mode from the level below it.
    pub fn push_stack(&mut self, block_id: impl Into<BlockId>) {
        self.stack.push(block_id.into());
        if self.stack.len() > self.stack_frames.len() {
            let mut frame = StackFrame::new();
            frame.warp_mode = self.is_warp_mode();
            self.stack_frames.push(frame);
        }
    }

    /// Pop the top block and its frame. None (and no-op) on an empty stack.
    pub fn pop_stack(&mut self) -> Option<BlockId> {
        let block = self.stack.pop()?;
        self.stack_frames.truncate(self.stack.len());
        Some(block)
    }

    /// Replace the top block with its successor, keeping the frame slot but
    /// clearing its contents.
    pub fn reuse_stack_for_next_block(&mut self, block_id: impl Into<BlockId>) {
        match self.stack.last_mut() {
            Some(top) => *top = block_id.into(),
            None => return self.push_stack(block_id),
        }
        if let Some(frame) = self.stack_frames.last_mut() {
            frame.reset();
        }
    }

    pub fn peek_stack(&self) -> Option<&BlockId> {
        self.stack.last()
    }

    pub fn peek_stack_frame(&self) -> Option<&StackFrame> {
        self.stack_frames.last()
    }

    pub fn peek_stack_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.stack_frames.last_mut()
    }

    pub fn peek_parent_stack_frame(&self) -> Option<&StackFrame> {
        let len = self.stack_frames.len();
        if len > 1 {
            self.stack_frames.get(len - 2)
        } else {
            None
        }
    }

    fn peek_parent_stack_frame_mut(&mut self) -> Option<&mut StackFrame> {
        let len = self.stack_frames.len();
        if len > 1 {
            self.stack_frames.get_mut(len - 2)
        } else {
            None
        }
    }

    pub fn stack(&self) -> &[BlockId] {
        &self.stack
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.stack_frames.len()
    }

    /// Whether execution is at the script's first block
    pub fn at_stack_top(&self) -> bool {
        self.stack.len() == 1 && self.peek_stack().is_some_and(|id| *id == self.top_block)
    }

    /// Whether the current top block is a reporter feeding its parent
    pub fn is_reporting(&self) -> bool {
        self.peek_parent_stack_frame()
            .is_some_and(|f| f.waiting_reporter_slot().is_some())
    }

    /// Deliver a reporter's value to the parent frame's waiting slot
    ///
    /// No-op without a parent frame or without a waiting slot.
    pub fn push_reported_value(&mut self, value: Value) {
        if let Some(parent) = self.peek_parent_stack_frame_mut() {
            parent.accept_reported_value(value);
        }
    }

    /* ===================== Procedures ===================== */

    /// Set a procedure parameter on the top frame
    pub fn push_param(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.stack_frames.last_mut() {
            frame.push_param(name, value);
        }
    }

    /// Innermost value of a parameter, searching frames from the top down
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.stack_frames.iter().rev().find_map(|f| f.param(name))
    }

    /// Whether a call to `proccode` is already in progress below the top
    ///
    /// Only the nearest enclosing entries are examined.
    pub fn is_recursive_call(&self, blocks: &BlockContainer, proccode: &str) -> bool {
        self.stack
            .iter()
            .rev()
            .skip(1)
            .take(RECURSION_SEARCH_DEPTH)
            .filter_map(|id| blocks.get(id))
            .any(|block| {
                block.opcode == PROCEDURE_CALL
                    && block
                        .fields
                        .get(PROCCODE_FIELD)
                        .is_some_and(|code| code.to_string() == proccode)
            })
    }

    /* ===================== Warp mode ===================== */

    /// Whether the current level runs in warp mode
    pub fn is_warp_mode(&self) -> bool {
        self.stack_frames.last().is_some_and(|f| f.warp_mode)
    }

    pub fn set_warp_mode(&mut self, warp: bool) {
        if let Some(frame) = self.stack_frames.last_mut() {
            frame.warp_mode = warp;
        }
    }

    /// Start counting warp time unless already counting
    pub fn ensure_warp_timer(&mut self, now: Duration) {
        self.warp_started.get_or_insert(now);
    }

    /// Time spent in warp mode during this step, if counting
    pub fn warp_elapsed(&self, now: Duration) -> Option<Duration> {
        self.warp_started.map(|start| now.saturating_sub(start))
    }

    pub fn clear_warp_timer(&mut self) {
        self.warp_started = None;
    }

    /* ===================== Status transitions ===================== */

    /// Suspend until the next tick (or until a timer wakes the thread)
    pub fn yield_thread(&mut self) {
        self.status = ThreadStatus::Yielded;
    }

    /// Pop the whole stack and finish
    pub fn stop_this_script(&mut self) {
        while self.pop_stack().is_some() {}
        self.status = ThreadStatus::Done;
    }

    /// Finish immediately, dropping stack and frames
    pub fn retire(&mut self) {
        self.stack.clear();
        self.stack_frames.clear();
        self.status = ThreadStatus::Done;
    }

    /// Back to a fresh start at the top block, keeping the id.
    ///
    /// Pending timers are returned so the caller can cancel them.
    pub fn reset(&mut self) -> Vec<TimerHandle> {
        self.stack.clear();
        self.stack_frames.clear();
        self.status = ThreadStatus::Running;
        self.warp_started = None;
        let top = self.top_block.clone();
        self.push_stack(top);
        std::mem::take(&mut self.pending_timers)
    }

    /* ===================== Timers ===================== */

    /// Register a timer owned by this thread
    pub fn add_timeout(
        &mut self,
        timers: &mut TimerRegistry,
        callback: TimerCallback,
        delay: Duration,
    ) -> TimerHandle {
        let handle = timers.schedule(callback, delay);
        self.pending_timers.push(handle);
        if let Some(frame) = self.stack_frames.last_mut() {
            frame.record_timer(handle);
        }
        handle
    }

    /// Resolve this thread's due timers, earliest first
    ///
    /// Returns how many resolved. Handles the registry no longer knows are
    /// dropped; handles not yet due stay pending.
    pub fn resolve_timeouts(&mut self, timers: &mut TimerRegistry) -> usize {
        self.pending_timers.retain(|h| timers.is_pending(*h));

        let mut due: Vec<(Duration, TimerHandle)> = self
            .pending_timers
            .iter()
            .filter_map(|h| timers.due_time(*h).map(|d| (d, *h)))
            .collect();
        due.sort();

        let mut resolved = 0;
        for (_, handle) in due {
            if timers.resolve(handle) {
                self.pending_timers.retain(|h| *h != handle);
                resolved += 1;
            }
        }
        resolved
    }

    pub fn pending_timers(&self) -> &[TimerHandle] {
        &self.pending_timers
    }

    pub fn has_pending_timers(&self) -> bool {
        !self.pending_timers.is_empty()
    }

    /// Whether the block on top is still waiting on its own timer or result
    ///
    /// Timers started by blocks that already finished do not count.
    pub fn is_blocked(&self, timers: &TimerRegistry) -> bool {
        self.peek_stack_frame()
            .is_some_and(|f| f.is_awaiting() || f.has_pending_timer(timers))
    }

    pub fn owns_timer(&self, handle: TimerHandle) -> bool {
        self.pending_timers.contains(&handle)
    }

    /// Take every pending handle, leaving none
    pub fn take_pending_timers(&mut self) -> Vec<TimerHandle> {
        std::mem::take(&mut self.pending_timers)
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("top_block", &self.top_block)
            .field("stack", &self.stack)
            .field("status", &self.status)
            .field("pending_timers", &self.pending_timers)
            .finish()
    }
}
