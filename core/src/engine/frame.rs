//! Stack frames
//!
//! One frame per thread stack entry. A frame is per-invocation scratch state:
//! cached reporter results, the input slot currently waiting on a reporter,
//! procedure parameters, timers started by the block, and an opaque context
//! owned by the block implementation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tokio::sync::oneshot;

use super::timers::{TimerHandle, TimerRegistry};
use super::value::Value;

/// Outcome of polling a frame's pending asynchronous result
#[derive(Debug, PartialEq)]
pub enum PromiseState {
    /// Nothing is awaited in this frame
    Idle,
    /// Still waiting
    Pending,
    /// The result arrived and is stored on the frame
    Resolved,
    /// The sender went away without a value
    Rejected,
}

#[derive(Default)]
pub struct StackFrame {
    /// Whether this level of the stack is a loop
    pub is_loop: bool,
    /// Loops at this level do not yield per iteration
    pub warp_mode: bool,

    reported_values: HashMap<String, Value>,
    params: HashMap<String, Value>,
    timers: Vec<TimerHandle>,
    waiting_reporter_slot: Option<String>,
    local_context: Option<Box<dyn Any>>,

    awaiting: Option<oneshot::Receiver<Value>>,
    resolved: Option<Value>,
}

impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything for reuse by the next block at this depth.
    ///
    /// Warp mode belongs to the level, not the block, and is kept.
    pub fn reset(&mut self) {
        *self = Self {
            warp_mode: self.warp_mode,
            ..Self::default()
        };
    }

    /* ===================== Reported values ===================== */

    pub fn reported_value(&self, slot: &str) -> Option<&Value> {
        self.reported_values.get(slot)
    }

    pub fn reported_values(&self) -> &HashMap<String, Value> {
        &self.reported_values
    }

    pub fn waiting_reporter_slot(&self) -> Option<&str> {
        self.waiting_reporter_slot.as_deref()
    }

    pub fn set_waiting_reporter_slot(&mut self, slot: impl Into<String>) {
        self.waiting_reporter_slot = Some(slot.into());
    }

    pub fn clear_waiting_reporter_slot(&mut self) {
        self.waiting_reporter_slot = None;
    }

    /// Store a reporter result under the waiting slot and clear the slot.
    ///
    /// Returns false (and stores nothing) if no slot is waiting.
    pub fn accept_reported_value(&mut self, value: Value) -> bool {
        match self.waiting_reporter_slot.take() {
            Some(slot) => {
                self.reported_values.insert(slot, value);
                true
            }
            None => false,
        }
    }

    /// Forget cached inputs so the next execution evaluates them again
    pub fn clear_reported_values(&mut self) {
        self.reported_values.clear();
    }

    /* ===================== Local context ===================== */

    /// Block-owned state for this invocation, created on first access.
    ///
    /// A context of a different type is replaced.
    pub fn context<T: Any + Default>(&mut self) -> &mut T {
        let matches = self
            .local_context
            .as_ref()
            .is_some_and(|ctx| ctx.is::<T>());
        if !matches {
            self.local_context = Some(Box::new(T::default()));
        }
        match self.local_context.as_mut().and_then(|ctx| ctx.downcast_mut::<T>()) {
            Some(ctx) => ctx,
            None => unreachable!("local context was just set to this type"),
        }
    }

    pub fn context_ref<T: Any>(&self) -> Option<&T> {
        self.local_context.as_ref().and_then(|ctx| ctx.downcast_ref::<T>())
    }

    pub fn has_context(&self) -> bool {
        self.local_context.is_some()
    }

    /* ===================== Procedure parameters ===================== */

    pub fn push_param(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /* ===================== Timers ===================== */

    /// Remember a timer started by this invocation
    pub fn record_timer(&mut self, handle: TimerHandle) {
        self.timers.push(handle);
    }

    pub fn timers(&self) -> &[TimerHandle] {
        &self.timers
    }

    /// Whether a timer started by this invocation has yet to resolve
    pub fn has_pending_timer(&self, timers: &TimerRegistry) -> bool {
        self.timers.iter().any(|h| timers.is_pending(*h))
    }

    /* ===================== Asynchronous results ===================== */

    pub fn park_promise(&mut self, receiver: oneshot::Receiver<Value>) {
        self.awaiting = Some(receiver);
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Check the parked receiver without blocking
    pub fn poll_promise(&mut self) -> PromiseState {
        let Some(receiver) = self.awaiting.as_mut() else {
            return PromiseState::Idle;
        };
        match receiver.try_recv() {
            Ok(value) => {
                self.awaiting = None;
                self.resolved = Some(value);
                PromiseState::Resolved
            }
            Err(oneshot::error::TryRecvError::Empty) => PromiseState::Pending,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.awaiting = None;
                PromiseState::Rejected
            }
        }
    }

    pub fn take_resolved(&mut self) -> Option<Value> {
        self.resolved.take()
    }

    pub(crate) fn set_resolved(&mut self, value: Value) {
        self.resolved = Some(value);
    }
}

impl fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("is_loop", &self.is_loop)
            .field("warp_mode", &self.warp_mode)
            .field("reported_values", &self.reported_values)
            .field("params", &self.params)
            .field("timers", &self.timers)
            .field("waiting_reporter_slot", &self.waiting_reporter_slot)
            .field("has_context", &self.local_context.is_some())
            .field("awaiting", &self.awaiting.is_some())
            .finish()
    }
}
