//! Looks blocks. There is no stage, so speech goes to the log.

use tracing::info;

use crate::engine::primitives::{arg, Args, PrimitiveRegistry, PrimitiveResult, Reported};
use crate::engine::util::BlockUtility;

pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register("looks_say", say);
}

pub fn say(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let message = arg(args, "MESSAGE");
    info!(script = %util.top_block(), %message, "say");
    Ok(Reported::Nothing)
}
