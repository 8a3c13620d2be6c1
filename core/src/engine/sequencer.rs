//! Thread stepping
//!
//! Drives one thread forward until it yields, finishes or blocks on a
//! timer or pending result. Threads in warp mode keep going through their
//! yields for up to [`WARP_TIME`].
//!
//! ## Function Organization
//! 1. step_thread() - Main loop (executes blocks, moves through sequences)
//! 2. step_edge_hat() - Rising-edge gate for edge-activated scripts
//! 3. go_to_next_block() / unwrap_stack() - Sequence navigation

use std::collections::HashMap;

use tracing::trace;

use super::blocks::{BlockContainer, BlockId};
use super::execute::{execute, BlockFault, ExecContext};
use super::thread::{Thread, ThreadStatus, WARP_TIME};
use super::value::Value;

/* ===================== Public API ===================== */

/// Step a thread until it stops running
///
/// Each pass:
/// 1. Executes the block at the stack top
/// 2. Pops a reporter that just delivered its value to its parent
/// 3. Moves to the next block if the block did not enter a branch
/// 4. In warp mode, resumes a yield right away until the warp time is up
pub(crate) fn step_thread(ctx: &mut ExecContext<'_>, thread: &mut Thread) -> Result<(), BlockFault> {
    if thread.is_warp_mode() {
        thread.ensure_warp_timer(ctx.timers.now());
    }

    while thread.status() == ThreadStatus::Running {
        let Some(current) = thread.peek_stack().cloned() else {
            thread.set_status(ThreadStatus::Done);
            break;
        };
        let depth = thread.stack_depth();
        let reporting = thread.is_reporting();

        execute(ctx, thread)?;

        if thread.status() == ThreadStatus::Running {
            if reporting {
                // Value is cached in the parent frame; the parent runs next
                if thread.is_reporting() {
                    thread.push_reported_value(Value::Null);
                }
                thread.pop_stack();
                continue;
            }

            if thread.stack_depth() == depth && thread.peek_stack() == Some(&current) {
                go_to_next_block(ctx.blocks, thread);
            }
        }

        if thread.status() == ThreadStatus::Yielded && keeps_warping(ctx, thread) {
            thread.set_status(ThreadStatus::Running);
        }
    }

    thread.clear_warp_timer();
    if thread.stack_depth() == 0 {
        thread.set_status(ThreadStatus::Done);
    }
    Ok(())
}

/// A warp-mode yield within the warp time, not waiting on a timer or result
fn keeps_warping(ctx: &ExecContext<'_>, thread: &Thread) -> bool {
    thread.is_warp_mode()
        && !thread.is_blocked(ctx.timers)
        && thread
            .warp_elapsed(ctx.timers.now())
            .is_some_and(|elapsed| elapsed <= WARP_TIME)
}

/// Evaluate an edge-activated hat's predicate
///
/// The script only continues when the predicate turns true after having
/// been false; otherwise the thread is retired. The last value per script
/// is kept in `edge_values`.
pub(crate) fn step_edge_hat(
    ctx: &mut ExecContext<'_>,
    thread: &mut Thread,
    edge_values: &mut HashMap<BlockId, bool>,
) -> Result<(), BlockFault> {
    let top = thread.top_block().to_string();
    let value = execute(ctx, thread)?;

    if thread.status() != ThreadStatus::Running {
        return Ok(());
    }

    let now = value.map(|v| v.to_bool()).unwrap_or(false);
    let before = edge_values.insert(top.clone(), now).unwrap_or(false);

    if now && !before {
        trace!(script = %top, "edge hat triggered");
        go_to_next_block(ctx.blocks, thread);
    } else {
        thread.retire();
    }
    Ok(())
}

/* ===================== Navigation ===================== */

/// Continue with the next sibling, or unwrap when the sequence ends
pub(crate) fn go_to_next_block(blocks: &BlockContainer, thread: &mut Thread) {
    let Some(current) = thread.peek_stack().cloned() else {
        return;
    };
    match blocks.next_block(&current) {
        Some(next) => thread.reuse_stack_for_next_block(next.clone()),
        None => unwrap_stack(blocks, thread),
    }
}

/// Leave a finished sequence
///
/// Pops until a loop frame (yield, the loop runs again next tick) or a
/// block with a next sibling is exposed. An empty stack finishes the thread.
fn unwrap_stack(blocks: &BlockContainer, thread: &mut Thread) {
    loop {
        thread.pop_stack();

        let Some(parent) = thread.peek_stack().cloned() else {
            thread.set_status(ThreadStatus::Done);
            return;
        };

        if thread.peek_stack_frame().is_some_and(|f| f.is_loop) {
            thread.yield_thread();
            return;
        }

        if let Some(next) = blocks.next_block(&parent) {
            thread.reuse_stack_for_next_block(next.clone());
            return;
        }
    }
}
