//! Block execution
//!
//! Runs the block at the top of a thread's stack: evaluates reporter inputs
//! (each reporter gets its own stack entry so it can suspend), then invokes
//! the block's primitive with a [`BlockUtility`].

use tracing::warn;

use super::blocks::{BlockContainer, BlockId, Input};
use super::errors::PrimitiveError;
use super::primitives::{Args, PrimitiveRegistry, Reported};
use super::thread::{Thread, ThreadStatus};
use super::timers::TimerRegistry;
use super::util::{BlockUtility, SchedulerRequest};
use super::value::Value;
use super::variables::Variables;

/// Everything a step needs besides the thread itself
pub(crate) struct ExecContext<'a> {
    pub blocks: &'a BlockContainer,
    pub primitives: &'a PrimitiveRegistry,
    pub timers: &'a mut TimerRegistry,
    pub variables: &'a mut Variables,
    pub requests: &'a mut Vec<SchedulerRequest>,
}

/// A primitive failed while executing `block`
#[derive(Debug)]
pub(crate) struct BlockFault {
    pub block: BlockId,
    pub opcode: String,
    pub error: PrimitiveError,
}

/// Execute the block on top of the thread's stack
///
/// Returns the value the block produced, if any. Reporters have already
/// delivered that value to their parent frame.
pub(crate) fn execute(
    ctx: &mut ExecContext<'_>,
    thread: &mut Thread,
) -> Result<Option<Value>, BlockFault> {
    let blocks = ctx.blocks;
    let primitives = ctx.primitives;

    let Some(block_id) = thread.peek_stack().cloned() else {
        return Ok(None);
    };

    let Some(block) = blocks.get(&block_id) else {
        // Script no longer exists
        warn!(thread = %thread.id(), block = %block_id, "block not found, retiring thread");
        thread.retire();
        return Ok(None);
    };

    // An asynchronous result completes the block without re-running it
    if let Some(value) = thread.peek_stack_frame_mut().and_then(|f| f.take_resolved()) {
        thread.push_reported_value(value.clone());
        return Ok(Some(value));
    }

    let Some(primitive) = primitives.get(&block.opcode) else {
        if !primitives.is_hat(&block.opcode) {
            warn!(opcode = %block.opcode, block = %block_id, "no primitive for opcode");
        }
        return Ok(None);
    };

    let mut args: Args = block
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    for (name, input) in block.value_inputs() {
        let value = match input {
            Input::Value(v) => v.clone(),
            Input::Block(reporter) => {
                let cached = thread
                    .peek_stack_frame()
                    .and_then(|f| f.reported_value(name))
                    .cloned();
                match cached {
                    Some(v) => v,
                    None => {
                        if !step_to_reporter(ctx, thread, name, reporter)? {
                            // Reporter is suspended; it stays on the stack
                            return Ok(None);
                        }
                        thread
                            .peek_stack_frame()
                            .and_then(|f| f.reported_value(name))
                            .cloned()
                            .unwrap_or_default()
                    }
                }
            }
        };
        args.insert(name.clone(), value);
    }

    // Inputs are consumed; a later execution of this frame evaluates them again
    if let Some(frame) = thread.peek_stack_frame_mut() {
        frame.clear_reported_values();
    }

    let reported = {
        let mut util = BlockUtility::new(
            thread,
            &mut *ctx.timers,
            blocks,
            &mut *ctx.variables,
            &mut *ctx.requests,
        );
        primitive(&args, &mut util).map_err(|error| BlockFault {
            block: block_id.clone(),
            opcode: block.opcode.clone(),
            error,
        })?
    };

    match reported {
        Reported::Nothing => Ok(None),
        Reported::Value(value) => {
            if thread.status() == ThreadStatus::Running {
                thread.push_reported_value(value.clone());
            }
            Ok(Some(value))
        }
        Reported::Pending(receiver) => {
            if let Some(frame) = thread.peek_stack_frame_mut() {
                frame.park_promise(receiver);
            }
            if thread.status() == ThreadStatus::Running {
                thread.yield_thread();
            }
            Ok(None)
        }
    }
}

/// Evaluate one reporter input on its own stack entry
///
/// Returns false if the reporter stopped the thread from running (yield,
/// pending result, stop); the reporter then stays on the stack.
fn step_to_reporter(
    ctx: &mut ExecContext<'_>,
    thread: &mut Thread,
    slot: &str,
    reporter: &BlockId,
) -> Result<bool, BlockFault> {
    if let Some(frame) = thread.peek_stack_frame_mut() {
        frame.set_waiting_reporter_slot(slot);
    }
    thread.push_stack(reporter.clone());

    execute(ctx, thread)?;

    if thread.status() != ThreadStatus::Running {
        return Ok(false);
    }

    thread.pop_stack();
    if let Some(frame) = thread.peek_stack_frame_mut() {
        frame.clear_waiting_reporter_slot();
    }
    Ok(true)
}
