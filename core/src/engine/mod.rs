//! Block script engine
//!
//! Scripts are linked blocks (see [`blocks`]). A [`Scheduler`] runs each
//! triggered script as a [`Thread`]: an explicit stack of block ids with one
//! [`StackFrame`] per entry, so any script can stop between two blocks and
//! resume on a later tick. Delays go through the [`TimerRegistry`], which
//! only resolves timers when the scheduler asks during a tick.
//!
//! ## Module Organization
//! - `thread`, `frame`: execution state
//! - `timers`, `clock`: execution-synced delays
//! - `scheduler`, `sequencer`, `execute`: the tick loop and block stepping
//! - `util`, `primitives`, `stdlib`: what block implementations see
//! - `driver`: async ticking on a tokio interval

pub mod blocks;
pub mod clock;
pub mod driver;
pub mod errors;
pub mod frame;
pub mod primitives;
pub mod scheduler;
pub mod stdlib;
pub mod thread;
pub mod timers;
pub mod util;
pub mod value;
pub mod variables;

mod execute;
mod sequencer;

pub use blocks::{Block, BlockContainer, BlockId, Input};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use driver::{run, RunSettings, RunSummary, StopReason};
pub use errors::{BundleError, PrimitiveError};
pub use frame::{PromiseState, StackFrame};
pub use primitives::{Args, HatInfo, PrimitiveRegistry, PrimitiveResult, Reported};
pub use scheduler::{Scheduler, ThreadFault, TickSummary};
pub use thread::{Thread, ThreadId, ThreadStatus};
pub use timers::{TimerCallback, TimerHandle, TimerRegistry};
pub use util::{BlockUtility, SchedulerRequest};
pub use value::Value;
pub use variables::Variables;

#[cfg(test)]
mod tests;
